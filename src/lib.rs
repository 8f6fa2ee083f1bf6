//! atl11-prep - ICESat-2/ATL11 granules from the cloud into one merged tree.
//!
//! ATL11 land-ice-height files keep their data in one HDF5 group per pair
//! track (`pt1`, `pt2`, `pt3`). This crate finds granules, fetches them from
//! the NSIDC object store, and loads each pair track as a labeled-array
//! dataset keyed by its group name.
//!
//! # Features
//!
//! - Granule discovery through NASA CMR
//! - Temporary S3 credentials with explicit expiry
//! - Remote and local container access through `object_store`
//! - Per-group loading with a fresh reader for every group
//! - Flattening of all tracks along `ref_pt`
//! - netCDF-4 output
//!
//! # Example
//!
//! ```ignore
//! use atl11_prep::data::MergedTree;
//! use atl11_prep::merge::merge_groups;
//! use atl11_prep::remote::{ObjectUrl, RemoteFileOpener};
//!
//! let url = ObjectUrl::parse("s3://nsidc-cumulus-prod-protected/ATLAS/ATL11/.../ATL11_005411_0315_005_03.h5")?;
//! let object = RemoteFileOpener::default().open(&url, Some(&credentials)).await?;
//! let tree: MergedTree = merge_groups(&object, &["pt1", "pt2", "pt3"])?;
//! println!("{}", tree);
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod data;
pub mod discovery;
pub mod error;
pub mod merge;
pub mod remote;
pub mod writer;

pub use error::{Atl11Error, Result};
