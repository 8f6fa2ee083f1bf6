//! Temporary S3 credentials.
//!
//! Credentials are an explicit value handed to the remote opener. They carry
//! their own expiry so callers can check them before use instead of relying
//! on whatever happens to be in the process environment.

use crate::error::{Atl11Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, info, instrument};

/// Lifetime of NSIDC temporary credentials.
pub const DEFAULT_LIFETIME_MINUTES: i64 = 60;

/// A short-lived S3 credential bundle.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: Option<String>,
    /// Instant after which the credentials are no longer accepted.
    #[serde(rename = "expiration", deserialize_with = "deserialize_expiration")]
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl S3Credentials {
    /// Create a credential bundle.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expires_at,
        }
    }

    /// Parse the JSON document returned by a DAAC `s3credentials` endpoint.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether the credentials have expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Fail with [`Atl11Error::Authentication`] unless usable at `now`.
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> Result<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(Atl11Error::authentication("incomplete S3 credentials"));
        }
        if self.is_expired_at(now) {
            return Err(Atl11Error::authentication(format!(
                "S3 credentials expired at {}",
                self.expires_at
            )));
        }
        Ok(())
    }

    /// Time left before expiry, negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Parse an expiry timestamp as written by the NSIDC endpoint
/// (`2023-05-15 12:34:56+00:00`) or as RFC 3339.
pub fn parse_expiration(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| Atl11Error::invalid_argument(format!("bad expiration '{}': {}", value, e)))
}

fn deserialize_expiration<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_expiration(&raw).map_err(serde::de::Error::custom)
}

/// Source of S3 credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Produce a fresh credential bundle.
    async fn credentials(&self) -> Result<S3Credentials>;
}

/// Manually entered credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: S3Credentials,
}

impl StaticCredentials {
    /// Wrap values copied from the `s3credentials` page. Without an explicit
    /// expiry the bundle is assumed to live for [`DEFAULT_LIFETIME_MINUTES`].
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let expires_at =
            expires_at.unwrap_or_else(|| Utc::now() + Duration::minutes(DEFAULT_LIFETIME_MINUTES));
        Self {
            credentials: S3Credentials::new(
                access_key_id,
                secret_access_key,
                session_token,
                expires_at,
            ),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<S3Credentials> {
        self.credentials.ensure_valid_at(Utc::now())?;
        Ok(self.credentials.clone())
    }
}

/// How to authenticate against Earthdata Login.
#[derive(Clone)]
pub enum EarthdataAuth {
    /// A user token generated on the Earthdata Login profile page.
    Token(String),
    /// Username and password, exchanged for a token.
    Login {
        /// Earthdata Login username.
        username: String,
        /// Earthdata Login password.
        password: String,
    },
}

impl fmt::Debug for EarthdataAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EarthdataAuth::Token(_) => f.write_str("Token(<redacted>)"),
            EarthdataAuth::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Credentials fetched from a DAAC endpoint after Earthdata Login.
#[derive(Debug, Clone)]
pub struct EarthdataCredentials {
    client: reqwest::Client,
    auth: EarthdataAuth,
    token_url: String,
    s3_credentials_url: String,
}

impl EarthdataCredentials {
    /// Create a provider for the given endpoints.
    pub fn new(
        auth: EarthdataAuth,
        token_url: impl Into<String>,
        s3_credentials_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth,
            token_url: token_url.into(),
            s3_credentials_url: s3_credentials_url.into(),
        }
    }

    #[instrument(skip(self))]
    async fn bearer_token(&self) -> Result<String> {
        match &self.auth {
            EarthdataAuth::Token(token) => Ok(token.clone()),
            EarthdataAuth::Login { username, password } => {
                debug!(url = %self.token_url, "Requesting Earthdata token");
                let response = self
                    .client
                    .post(&self.token_url)
                    .basic_auth(username, Some(password))
                    .send()
                    .await?;
                let response = check_auth_status(response)?;
                let token: TokenResponse = response.json().await?;
                Ok(token.access_token)
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for EarthdataCredentials {
    #[instrument(skip(self), fields(url = %self.s3_credentials_url))]
    async fn credentials(&self) -> Result<S3Credentials> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(&self.s3_credentials_url)
            .bearer_auth(token)
            .send()
            .await?;
        let response = check_auth_status(response)?;
        let body = response.text().await?;
        let credentials = S3Credentials::from_json(&body)?;
        info!(expires_at = %credentials.expires_at, "Obtained temporary S3 credentials");
        Ok(credentials)
    }
}

fn check_auth_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Atl11Error::authentication(format!(
            "{} returned {}",
            response.url(),
            status
        )));
    }
    Ok(response.error_for_status()?)
}
