//! Remote object access.
//!
//! Objects are reached through `object_store`. S3 objects are streamed into a
//! spool file once; local files are used in place. Either way the resulting
//! [`RemoteObject`] can be reopened any number of times, and every reopen
//! starts at byte zero.

use crate::config::DEFAULT_REGION;
use crate::credentials::S3Credentials;
use crate::data::{ContainerReader, Dataset, GroupSource, PhonyDims};
use crate::error::{Atl11Error, Result};
use chrono::Utc;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Location of an object to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectUrl {
    /// `s3://bucket/key`
    S3 {
        /// Bucket name.
        bucket: String,
        /// Object key within the bucket.
        key: String,
    },
    /// A path on the local filesystem.
    Local(PathBuf),
}

impl ObjectUrl {
    /// Parse `s3://bucket/key`, `file:///path`, or a bare path.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Atl11Error::invalid_argument("empty object URL"));
        }

        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| Atl11Error::invalid_argument(format!("missing key in {}", raw)))?;
            let key = key.trim_start_matches('/');
            if bucket.is_empty() || key.is_empty() {
                return Err(Atl11Error::invalid_argument(format!(
                    "bucket and key required in {}",
                    raw
                )));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(path)));
        }

        if raw.contains("://") {
            return Err(Atl11Error::invalid_argument(format!(
                "unsupported URL scheme: {}",
                raw
            )));
        }

        Ok(Self::Local(PathBuf::from(raw)))
    }

    /// Final path component, used to name spool files.
    pub fn file_name(&self) -> Option<String> {
        match self {
            ObjectUrl::S3 { key, .. } => key.rsplit('/').next().map(str::to_string),
            ObjectUrl::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
        }
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectUrl::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
            ObjectUrl::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Object store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenerConfig {
    /// AWS region of the bucket.
    pub region: String,
    /// Endpoint override for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Allow plain HTTP (for a local MinIO, say).
    pub allow_http: bool,
    /// Directory for spool files; the system temp dir when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            allow_http: false,
            spool_dir: None,
        }
    }
}

#[derive(Debug)]
enum Backing {
    Spooled(NamedTempFile),
    Local(PathBuf),
}

/// A scoped handle on one object's bytes.
///
/// Dropping the handle removes any spool file.
#[derive(Debug)]
pub struct RemoteObject {
    url: ObjectUrl,
    backing: Backing,
    size: u64,
    phony_dims: PhonyDims,
}

impl RemoteObject {
    /// Wrap a local container file without copying it.
    pub fn from_local(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Atl11Error::path_not_found(path.display().to_string())
                }
                _ => Atl11Error::Io(e),
            })?
            .len();
        Ok(Self {
            url: ObjectUrl::Local(path.clone()),
            backing: Backing::Local(path),
            size,
            phony_dims: PhonyDims::default(),
        })
    }

    /// Set how unlabeled dimensions are treated when groups are read.
    pub fn with_phony_dims(mut self, phony_dims: PhonyDims) -> Self {
        self.phony_dims = phony_dims;
        self
    }

    /// Where the object came from.
    pub fn url(&self) -> &ObjectUrl {
        &self.url
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Local path holding the object's bytes.
    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Spooled(file) => file.path(),
            Backing::Local(path) => path,
        }
    }

    /// Open an independent reader positioned at the start of the object.
    pub fn reopen(&self) -> Result<ContainerReader> {
        ContainerReader::open(self.path()).map(|reader| reader.with_phony_dims(self.phony_dims))
    }
}

impl GroupSource for RemoteObject {
    fn open_group(&self, group: Option<&str>) -> Result<Dataset> {
        self.reopen()?.read_dataset(group)
    }

    fn group_names(&self) -> Result<Vec<String>> {
        self.reopen()?.group_names()
    }
}

/// Opens objects named by [`ObjectUrl`]s.
#[derive(Debug, Clone, Default)]
pub struct RemoteFileOpener {
    config: OpenerConfig,
}

impl RemoteFileOpener {
    /// Create an opener.
    pub fn new(config: OpenerConfig) -> Self {
        Self { config }
    }

    /// Open `url`. S3 objects require unexpired credentials.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn open(
        &self,
        url: &ObjectUrl,
        credentials: Option<&S3Credentials>,
    ) -> Result<RemoteObject> {
        match url {
            ObjectUrl::S3 { bucket, key } => {
                let credentials = credentials.ok_or_else(|| {
                    Atl11Error::authentication(format!("no S3 credentials supplied for {}", url))
                })?;
                credentials.ensure_valid_at(Utc::now())?;
                let store = self.s3_store(bucket, credentials)?;
                self.spool(&store, url, &ObjectPath::from(key.as_str()))
                    .await
            }
            ObjectUrl::Local(path) => self.open_local(path).await,
        }
    }

    fn s3_store(&self, bucket: &str, credentials: &S3Credentials) -> Result<impl ObjectStore> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_access_key_id(&credentials.access_key_id)
            .with_secret_access_key(&credentials.secret_access_key);

        if let Some(token) = &credentials.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if self.config.allow_http {
            builder = builder.with_allow_http(true);
        }

        Ok(builder.build()?)
    }

    async fn open_local(&self, path: &Path) -> Result<RemoteObject> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let location = ObjectPath::from_filesystem_path(&absolute)
            .map_err(|_| Atl11Error::path_not_found(path.display().to_string()))?;

        let meta = LocalFileSystem::new().head(&location).await?;
        debug!(size = meta.size, "Opened local object");

        Ok(RemoteObject {
            url: ObjectUrl::Local(path.to_path_buf()),
            backing: Backing::Local(absolute),
            size: meta.size as u64,
            phony_dims: PhonyDims::default(),
        })
    }

    async fn spool(
        &self,
        store: &dyn ObjectStore,
        url: &ObjectUrl,
        location: &ObjectPath,
    ) -> Result<RemoteObject> {
        let result = store.get(location).await?;

        let suffix = url.file_name().unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("atl11-").suffix(&suffix);
        let mut spool = match &self.config.spool_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let mut size = 0u64;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.try_next().await? {
            spool.write_all(&chunk)?;
            size += chunk.len() as u64;
        }
        spool.flush()?;

        info!(size, spool = %spool.path().display(), "Fetched remote object");

        Ok(RemoteObject {
            url: url.clone(),
            backing: Backing::Spooled(spool),
            size,
            phony_dims: PhonyDims::default(),
        })
    }
}
