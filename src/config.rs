//! Runtime configuration.
//!
//! Defaults describe the ATL11 Antarctic use case: the three pair tracks, the
//! NSIDC cloud bucket region, and the Earthdata endpoints used to obtain
//! temporary S3 credentials.

use crate::discovery::GranuleQuery;
use crate::error::{Atl11Error, Result};
use crate::remote::OpenerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pair-track groups present in every ATL11 granule.
pub const PAIR_TRACKS: [&str; 3] = ["pt1", "pt2", "pt3"];

/// Dimension shared by the per-track variables of ATL11.
pub const REFERENCE_POINT_DIM: &str = "ref_pt";

/// Region hosting the NSIDC cumulus buckets.
pub const DEFAULT_REGION: &str = "us-west-2";

/// NASA CMR granule search endpoint.
pub const CMR_GRANULE_SEARCH_URL: &str = "https://cmr.earthdata.nasa.gov/search/granules.umm_json";

/// NSIDC temporary S3 credential endpoint.
pub const NSIDC_S3_CREDENTIALS_URL: &str = "https://data.nsidc.earthdatacloud.nasa.gov/s3credentials";

/// Earthdata Login token endpoint.
pub const EARTHDATA_TOKEN_URL: &str = "https://urs.earthdata.nasa.gov/api/users/find_or_create_token";

/// Top-level configuration.
///
/// Loaded from a JSON file; every field may be left out and keeps its
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Granule discovery query.
    pub query: GranuleQuery,
    /// Groups merged when no explicit list is given.
    pub pair_tracks: Vec<String>,
    /// Object store connection settings.
    pub opener: OpenerConfig,
    /// CMR search endpoint.
    pub cmr_url: String,
    /// DAAC endpoint handing out temporary S3 credentials.
    pub s3_credentials_url: String,
    /// Earthdata Login token endpoint.
    pub earthdata_token_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query: GranuleQuery::default(),
            pair_tracks: PAIR_TRACKS.iter().map(|s| s.to_string()).collect(),
            opener: OpenerConfig::default(),
            cmr_url: CMR_GRANULE_SEARCH_URL.to_string(),
            s3_credentials_url: NSIDC_S3_CREDENTIALS_URL.to_string(),
            earthdata_token_url: EARTHDATA_TOKEN_URL.to_string(),
        }
    }
}

impl Config {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Atl11Error::path_not_found(path.display().to_string()),
            _ => Atl11Error::Io(e),
        })?;
        Self::from_json(&text)
    }
}

/// Which groups of a granule to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelection {
    /// An explicit, ordered list of group names.
    Fixed(Vec<String>),
    /// Enumerate groups from the container and keep those whose name starts
    /// with the given prefix followed only by digits.
    Discover { prefix: String },
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self::Fixed(PAIR_TRACKS.iter().map(|s| s.to_string()).collect())
    }
}

impl TrackSelection {
    /// Discovery of `pt<N>` groups.
    pub fn discover_pair_tracks() -> Self {
        Self::Discover {
            prefix: "pt".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selection_is_the_three_pair_tracks() {
        assert_eq!(
            TrackSelection::default(),
            TrackSelection::Fixed(vec!["pt1".into(), "pt2".into(), "pt3".into()])
        );
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = Config::from_json(
            r#"{
                "pair_tracks": ["pt2"],
                "opener": {"endpoint": "http://localhost:9000", "allow_http": true},
                "query": {"version": "006", "temporal": {"start": "2020-01-01", "end": "2020-12-31"}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.pair_tracks, vec!["pt2"]);
        assert_eq!(config.opener.region, DEFAULT_REGION);
        assert_eq!(config.opener.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.opener.allow_http);
        assert_eq!(config.query.short_name, "ATL11");
        assert_eq!(config.query.version.as_deref(), Some("006"));
        assert_eq!(config.query.temporal.to_cmr(), "2020-01-01T00:00:00Z,2020-12-31T23:59:59Z");
        assert_eq!(config.cmr_url, CMR_GRANULE_SEARCH_URL);
    }

    #[test]
    fn config_file_errors() {
        let err = Config::from_file(Path::new("/nonexistent/atl11.json")).unwrap_err();
        assert!(err.is_not_found());

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{\"pair_tracks\": 3}").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(Atl11Error::Json(_))
        ));
    }

    #[test]
    fn default_config_targets_nsidc() {
        let config = Config::default();
        assert_eq!(config.opener.region, DEFAULT_REGION);
        assert_eq!(config.query.short_name, "ATL11");
        assert_eq!(config.pair_tracks.len(), 3);
    }
}
