//! Granule discovery through NASA's Common Metadata Repository (CMR).
//!
//! Given a product, a bounding box and a date range, CMR returns the granules
//! covering them. We keep each granule's S3 (direct access) and HTTPS URLs.

use crate::config::CMR_GRANULE_SEARCH_URL;
use crate::error::{Atl11Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Granules requested per CMR page.
pub const PAGE_SIZE: usize = 2000;

const SEARCH_AFTER_HEADER: &str = "CMR-Search-After";

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude.
    pub west: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Northern latitude.
    pub north: f64,
}

impl BoundingBox {
    /// Antarctica, south of 60°S, clipped at the Web Mercator latitude limit.
    pub const ANTARCTICA: BoundingBox = BoundingBox {
        west: -180.0,
        south: -85.0511287,
        east: 180.0,
        north: -60.0,
    };

    /// Create a validated box. Boxes crossing the antimeridian are not supported.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        if !(lon_ok(west) && lon_ok(east)) {
            return Err(Atl11Error::invalid_argument(format!(
                "longitudes must lie in [-180, 180], got {} and {}",
                west, east
            )));
        }
        if !(lat_ok(south) && lat_ok(north)) {
            return Err(Atl11Error::invalid_argument(format!(
                "latitudes must lie in [-90, 90], got {} and {}",
                south, north
            )));
        }
        if west > east || south > north {
            return Err(Atl11Error::invalid_argument(format!(
                "bounding box corners out of order: W{} S{} E{} N{}",
                west, south, east, north
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }
}

impl FromStr for BoundingBox {
    type Err = Atl11Error;

    /// Parse `W,S,E,N`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Atl11Error::invalid_argument(format!("bad bounding box '{}': {}", s, e)))?;
        match parts.as_slice() {
            [west, south, east, north] => Self::new(*west, *south, *east, *north),
            _ => Err(Atl11Error::invalid_argument(format!(
                "bounding box needs 4 values W,S,E,N, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; `start` must not be after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Atl11Error::invalid_argument(format!(
                "date range starts after it ends: {} > {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// CMR `temporal` parameter covering whole days.
    pub fn to_cmr(&self) -> String {
        format!(
            "{}T00:00:00Z,{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl Default for DateRange {
    /// The ICESat-2 record up to 2023-05-15.
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2018, 9, 15).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 5, 15).unwrap_or_default(),
        }
    }
}

/// What to search for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GranuleQuery {
    /// Product short name.
    pub short_name: String,
    /// Product version, any when unset.
    pub version: Option<String>,
    /// Spatial filter.
    pub bounding_box: BoundingBox,
    /// Temporal filter.
    pub temporal: DateRange,
    /// CMR provider (`NSIDC_CPRD` holds the cloud copies), any when unset.
    pub provider: Option<String>,
    /// Stop after this many granules.
    pub limit: Option<usize>,
}

impl Default for GranuleQuery {
    fn default() -> Self {
        Self {
            short_name: "ATL11".to_string(),
            version: None,
            bounding_box: BoundingBox::ANTARCTICA,
            temporal: DateRange::default(),
            provider: None,
            limit: None,
        }
    }
}

impl GranuleQuery {
    /// Query string parameters for one page.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("short_name", self.short_name.clone()),
            ("bounding_box", self.bounding_box.to_string()),
            ("temporal", self.temporal.to_cmr()),
            ("page_size", self.page_size().to_string()),
            ("sort_key", "start_date".to_string()),
        ];
        if let Some(version) = &self.version {
            params.push(("version", version.clone()));
        }
        if let Some(provider) = &self.provider {
            params.push(("provider", provider.clone()));
        }
        params
    }

    fn page_size(&self) -> usize {
        self.limit.map_or(PAGE_SIZE, |limit| limit.clamp(1, PAGE_SIZE))
    }
}

/// One granule returned by CMR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Granule {
    /// Granule UR, usually the file name.
    pub id: String,
    /// CMR concept id.
    pub concept_id: String,
    /// Direct-access S3 URLs.
    pub s3_urls: Vec<String>,
    /// HTTPS download URLs.
    pub https_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UmmResponse {
    #[serde(default)]
    items: Vec<UmmItem>,
}

#[derive(Debug, Deserialize)]
struct UmmItem {
    meta: UmmMeta,
    umm: UmmGranule,
}

#[derive(Debug, Deserialize)]
struct UmmMeta {
    #[serde(rename = "concept-id")]
    concept_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UmmGranule {
    #[serde(rename = "GranuleUR")]
    granule_ur: String,
    #[serde(default)]
    related_urls: Vec<RelatedUrl>,
}

#[derive(Debug, Deserialize)]
struct RelatedUrl {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "Type", default)]
    kind: String,
}

impl From<UmmItem> for Granule {
    fn from(item: UmmItem) -> Self {
        let mut s3_urls = Vec::new();
        let mut https_urls = Vec::new();
        for related in item.umm.related_urls {
            if related.url.starts_with("s3://") {
                s3_urls.push(related.url);
            } else if related.kind == "GET DATA" && related.url.starts_with("https://") {
                https_urls.push(related.url);
            }
        }
        Self {
            id: item.umm.granule_ur,
            concept_id: item.meta.concept_id,
            s3_urls,
            https_urls,
        }
    }
}

/// Parse one page of a UMM-JSON granule search response.
pub fn parse_page(body: &str) -> Result<Vec<Granule>> {
    let response: UmmResponse = serde_json::from_str(body)?;
    Ok(response.items.into_iter().map(Granule::from).collect())
}

/// Token for the next page, or `None` once paging is done: the limit is
/// reached, the page came back short, or CMR sent no continuation header.
fn next_search_after(
    query: &GranuleQuery,
    collected: usize,
    page_len: usize,
    next: Option<String>,
) -> Option<String> {
    if query.limit.is_some_and(|limit| collected >= limit) {
        return None;
    }
    if page_len < query.page_size() {
        return None;
    }
    next
}

/// CMR granule search client.
#[derive(Debug, Clone)]
pub struct CmrClient {
    client: reqwest::Client,
    url: String,
}

impl Default for CmrClient {
    fn default() -> Self {
        Self::new(CMR_GRANULE_SEARCH_URL)
    }
}

impl CmrClient {
    /// Client for the given search endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// All granules matching `query`, following CMR's search-after paging.
    #[instrument(skip(self), fields(short_name = %query.short_name))]
    pub async fn search(&self, query: &GranuleQuery) -> Result<Vec<Granule>> {
        let params = query.to_params();
        let mut granules = Vec::new();
        let mut search_after: Option<String> = None;

        loop {
            let mut request = self.client.get(&self.url).query(&params);
            if let Some(token) = &search_after {
                request = request.header(SEARCH_AFTER_HEADER, token);
            }

            let response = request.send().await?.error_for_status()?;
            let next = response
                .headers()
                .get(SEARCH_AFTER_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let page = parse_page(&response.text().await?)?;
            let page_len = page.len();
            debug!(page_len, "Fetched CMR page");
            granules.extend(page);

            match next_search_after(query, granules.len(), page_len, next) {
                Some(token) => search_after = Some(token),
                None => break,
            }
        }

        if let Some(limit) = query.limit {
            granules.truncate(limit);
        }
        info!(count = granules.len(), "Found granules");
        Ok(granules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "hits": 2,
        "took": 31,
        "items": [
            {
                "meta": {"concept-id": "G2553395374-NSIDC_CPRD", "provider-id": "NSIDC_CPRD"},
                "umm": {
                    "GranuleUR": "ATL11_005411_0315_005_03.h5",
                    "RelatedUrls": [
                        {"URL": "https://data.nsidc.earthdatacloud.nasa.gov/nsidc-cumulus-prod-protected/ATLAS/ATL11/005/2019/09/30/ATL11_005411_0315_005_03.h5", "Type": "GET DATA"},
                        {"URL": "s3://nsidc-cumulus-prod-protected/ATLAS/ATL11/005/2019/09/30/ATL11_005411_0315_005_03.h5", "Type": "GET DATA VIA DIRECT ACCESS"},
                        {"URL": "https://nsidc.org/data/data-access-tool/ATL11/versions/5", "Type": "GET SERVICE"}
                    ]
                }
            },
            {
                "meta": {"concept-id": "G2553395375-NSIDC_CPRD"},
                "umm": {"GranuleUR": "ATL11_005511_0315_005_03.h5"}
            }
        ]
    }"#;

    #[test]
    fn parses_umm_json_page() {
        let granules = parse_page(PAGE).unwrap();
        assert_eq!(granules.len(), 2);
        assert_eq!(granules[0].id, "ATL11_005411_0315_005_03.h5");
        assert_eq!(granules[0].concept_id, "G2553395374-NSIDC_CPRD");
        assert_eq!(
            granules[0].s3_urls,
            vec!["s3://nsidc-cumulus-prod-protected/ATLAS/ATL11/005/2019/09/30/ATL11_005411_0315_005_03.h5"]
        );
        assert_eq!(granules[0].https_urls.len(), 1);
        assert!(granules[1].s3_urls.is_empty());
    }

    #[test]
    fn default_query_covers_antarctica() {
        let params = GranuleQuery::default().to_params();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("short_name").as_deref(), Some("ATL11"));
        assert_eq!(
            get("bounding_box").as_deref(),
            Some("-180,-85.0511287,180,-60")
        );
        assert_eq!(
            get("temporal").as_deref(),
            Some("2018-09-15T00:00:00Z,2023-05-15T23:59:59Z")
        );
        assert_eq!(get("page_size").as_deref(), Some("2000"));
        assert!(get("version").is_none());
    }

    #[test]
    fn limit_shrinks_page_size() {
        let query = GranuleQuery {
            limit: Some(10),
            version: Some("006".into()),
            ..Default::default()
        };
        let params = query.to_params();
        assert!(params.contains(&("page_size", "10".to_string())));
        assert!(params.contains(&("version", "006".to_string())));
    }

    #[test]
    fn paging_continues_only_on_full_pages_with_a_token() {
        let query = GranuleQuery::default();
        let token = || Some("[\"atl11\",1569801600000]".to_string());

        assert_eq!(
            next_search_after(&query, PAGE_SIZE, PAGE_SIZE, token()),
            token()
        );
        assert_eq!(next_search_after(&query, PAGE_SIZE, PAGE_SIZE, None), None);
        assert_eq!(next_search_after(&query, 3 * PAGE_SIZE - 5, PAGE_SIZE - 5, token()), None);
    }

    #[test]
    fn paging_stops_once_the_limit_is_met() {
        let query = GranuleQuery {
            limit: Some(3),
            ..Default::default()
        };
        assert_eq!(next_search_after(&query, 2, 3, Some("t".into())), Some("t".into()));
        assert_eq!(next_search_after(&query, 3, 3, Some("t".into())), None);
        assert_eq!(next_search_after(&query, 6, 3, Some("t".into())), None);
    }

    #[test]
    fn bounding_box_parsing_and_validation() {
        let bbox: BoundingBox = "-180, -85.0511287, 180, -60".parse().unwrap();
        assert_eq!(bbox, BoundingBox::ANTARCTICA);

        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
        assert!(BoundingBox::new(-190.0, 0.0, 0.0, 10.0).is_err());
        assert!(BoundingBox::new(0.0, -60.0, 10.0, -85.0).is_err());
    }

    #[test]
    fn date_range_must_be_ordered() {
        let a = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert!(DateRange::new(a, b).is_ok());
        assert!(DateRange::new(b, a).is_err());
    }
}
