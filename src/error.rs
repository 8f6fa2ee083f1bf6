//! Error types for atl11-prep.
//!
//! Every fallible operation in the crate reports one [`Atl11Error`]. Errors
//! from external collaborators (object store, HTTP, netCDF) are passed
//! through with their original message; nothing here retries or recovers.

use thiserror::Error;

/// Result type alias for atl11-prep operations.
pub type Result<T> = std::result::Result<T, Atl11Error>;

/// Errors that can occur in atl11-prep.
#[derive(Debug, Error)]
pub enum Atl11Error {
    /// Credentials are missing, expired, or were refused.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A remote or local object does not exist.
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    /// A requested group does not exist in the container.
    #[error("Group not found: {group}")]
    GroupNotFound { group: String },

    /// The container could not be parsed as expected.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object store error.
    #[error("Storage error: {0}")]
    Storage(#[source] object_store::Error),

    /// HTTP error from the credential or discovery endpoints.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to read or write a netCDF file.
    #[error("NetCDF error: {0}")]
    NetCDF(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Atl11Error {
    /// Create an Authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create a GroupNotFound error.
    pub fn group_not_found(group: impl Into<String>) -> Self {
        Self::GroupNotFound {
            group: group.into(),
        }
    }

    /// Create a MalformedContainer error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether this error means "the thing you asked for is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. } | Self::GroupNotFound { .. })
    }
}

impl From<object_store::Error> for Atl11Error {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::PathNotFound { path },
            object_store::Error::PermissionDenied { path, source }
            | object_store::Error::Unauthenticated { path, source } => {
                Self::Authentication(format!("access to {} refused: {}", path, source))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<netcdf::Error> for Atl11Error {
    fn from(err: netcdf::Error) -> Self {
        Self::NetCDF(err.to_string())
    }
}
