//! Persisting trees and datasets to local netCDF-4 files.

use crate::data::{AttrValue, Dataset, MergedTree};
use crate::error::{Atl11Error, Result};
use netcdf::AttributeValue;
use std::path::Path;
use tracing::{info, instrument};

/// Write every tree entry, nested groups included, as a group of a new
/// netCDF-4 file.
#[instrument(skip(tree), fields(groups = tree.len()))]
pub fn write_tree(tree: &MergedTree, path: &Path) -> Result<()> {
    let mut file = netcdf::create(path)?;
    for (name, dataset) in tree.iter() {
        let mut group = file.add_group(name)?;
        write_group(&mut group, dataset)?;
    }
    info!(path = %path.display(), "Wrote merged tree");
    Ok(())
}

/// Write one dataset at the root of a new netCDF-4 file.
#[instrument(skip(dataset), fields(dataset = %dataset.name))]
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut file = netcdf::create(path)?;
    let mut root = file
        .root_mut()
        .ok_or_else(|| Atl11Error::NetCDF("created file has no root group".to_string()))?;
    write_group(&mut root, dataset)?;
    info!(path = %path.display(), "Wrote dataset");
    Ok(())
}

fn write_group(group: &mut netcdf::GroupMut<'_>, dataset: &Dataset) -> Result<()> {
    for (key, value) in &dataset.attrs {
        group.add_attribute(key, to_netcdf(value))?;
    }

    for (name, &len) in &dataset.dims {
        group.add_dimension(name, len)?;
    }

    for array in dataset.coords.values().chain(dataset.data_vars.values()) {
        let dims: Vec<&str> = array.dims.iter().map(String::as_str).collect();
        let mut var = group.add_variable::<f64>(&array.name, &dims)?;
        for (key, value) in &array.attrs {
            var.put_attribute(key, to_netcdf(value))?;
        }
        var.put_values(&array.values(), ..)?;
    }

    for (name, child) in &dataset.children {
        let mut subgroup = group.add_group(name)?;
        write_group(&mut subgroup, child)?;
    }

    Ok(())
}

fn to_netcdf(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Text(v) => AttributeValue::Str(v.clone()),
        AttrValue::Texts(v) => AttributeValue::Strs(v.clone()),
        AttrValue::Int(v) => AttributeValue::Longlong(*v),
        AttrValue::Ints(v) => AttributeValue::Longlongs(v.clone()),
        AttrValue::Float(v) => AttributeValue::Double(*v),
        AttrValue::Floats(v) => AttributeValue::Doubles(v.clone()),
    }
}
