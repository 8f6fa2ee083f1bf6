//! Data reading and representation.
//!
//! This module handles reading HDF5 / netCDF-4 containers into labeled-array
//! datasets and keeping several of them together as a tree.

mod dataset;
mod reader;
mod tree;

pub use dataset::{AttrValue, DataArray, Dataset};
pub use reader::{ContainerReader, GroupSource, PhonyDims};
pub use tree::{MergedTree, PAIR_TRACK_VAR};
