//! Keyed collection of per-group datasets.

use super::{AttrValue, DataArray, Dataset};
use crate::error::{Atl11Error, Result};
use indexmap::IndexMap;
use ndarray::{concatenate, ArrayView, Axis, IxDyn};
use std::fmt;
use tracing::debug;

/// Name of the variable tagging each flattened row with its track.
pub const PAIR_TRACK_VAR: &str = "pair_track";

/// Datasets keyed by group name, in insertion order.
///
/// Siblings are independent: nothing checks that they share coordinates.
#[derive(Debug, Clone, Default)]
pub struct MergedTree {
    children: IndexMap<String, Dataset>,
}

impl MergedTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dataset, returning any dataset previously stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) -> Option<Dataset> {
        self.children.insert(name.into(), dataset)
    }

    /// Dataset stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.children.get(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Keys in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Same keys in the same order with structurally equal datasets.
    pub fn structurally_eq(&self, other: &MergedTree) -> bool {
        self.len() == other.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.structurally_eq(b))
    }

    /// Concatenate every track along `dim` into one dataset.
    ///
    /// A variable is kept when its leading dimension is `dim` in every track
    /// and its remaining dimensions and lengths agree across tracks. A
    /// `pair_track` variable records the 1-based track index of each row.
    /// Nested groups present in every track are flattened the same way;
    /// those without a non-empty `dim` are left out.
    pub fn flatten(&self, dim: &str) -> Result<Dataset> {
        if self.is_empty() {
            return Err(Atl11Error::invalid_argument("cannot flatten an empty tree"));
        }

        let tracks: Vec<&Dataset> = self.children.values().collect();
        let mut flat = flatten_tracks(&tracks, dim, "flattened")?;
        flat.attrs.insert(
            "pair_tracks".to_string(),
            AttrValue::Texts(self.children.keys().cloned().collect()),
        );
        Ok(flat)
    }
}

fn flatten_tracks(tracks: &[&Dataset], dim: &str, name: &str) -> Result<Dataset> {
    let lengths: Vec<usize> = tracks
        .iter()
        .map(|ds| ds.dim_len(dim).unwrap_or(0))
        .collect();
    if lengths.iter().all(|&len| len == 0) {
        return Err(Atl11Error::invalid_argument(format!(
            "no track of {} has a non-empty {} dimension",
            name, dim
        )));
    }

    let mut flat = Dataset::new(name);
    let track_index: Vec<f64> = lengths
        .iter()
        .enumerate()
        .flat_map(|(i, &len)| std::iter::repeat((i + 1) as f64).take(len))
        .collect();
    flat.add_data_var(
        DataArray::from_vec(PAIR_TRACK_VAR, dim, track_index)
            .with_attr("long_name", "1-based index into pair_tracks"),
    )?;

    let first = tracks[0];
    for (var, template) in first.coords.iter().chain(first.data_vars.iter()) {
        if var == PAIR_TRACK_VAR {
            continue;
        }
        let Some(array) = concat_variable(tracks, var, template, dim)? else {
            debug!(group = name, variable = %var, "Not concatenable across tracks");
            continue;
        };
        if first.coords.contains_key(var) {
            flat.add_coord(array)?;
        } else {
            flat.add_data_var(array)?;
        }
    }

    for child in first.children.keys() {
        let Some(nested) = tracks
            .iter()
            .map(|track| track.children.get(child))
            .collect::<Option<Vec<&Dataset>>>()
        else {
            debug!(group = %child, "Nested group missing from a track");
            continue;
        };
        match flatten_tracks(&nested, dim, &format!("{}/{}", name, child)) {
            Ok(dataset) => flat.add_child(child.clone(), dataset),
            Err(Atl11Error::InvalidArgument(reason)) => debug!(group = %child, %reason, "Skipping"),
            Err(e) => return Err(e),
        }
    }

    Ok(flat)
}

fn concat_variable(
    tracks: &[&Dataset],
    name: &str,
    template: &DataArray,
    dim: &str,
) -> Result<Option<DataArray>> {
    if template.dims.first().map(String::as_str) != Some(dim) {
        return Ok(None);
    }

    let mut views: Vec<ArrayView<'_, f64, IxDyn>> = Vec::with_capacity(tracks.len());
    for dataset in tracks {
        let Some(array) = dataset.get(name) else {
            return Ok(None);
        };
        if array.dims != template.dims || array.shape()[1..] != template.shape()[1..] {
            return Ok(None);
        }
        views.push(array.data.view());
    }

    let data = concatenate(Axis(0), &views)
        .map_err(|e| Atl11Error::malformed(format!("cannot concatenate {}: {}", name, e)))?;

    let mut array = DataArray::new(name, template.dims.clone(), data)?;
    array.attrs = template.attrs.clone();
    array.dtype = template.dtype.clone();
    Ok(Some(array))
}

impl fmt::Display for MergedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<MergedTree> ({} groups)", self.len())?;
        let count = self.children.len();
        for (i, (name, dataset)) in self.children.iter().enumerate() {
            format_group(f, name, dataset, "", i + 1 == count)?;
        }
        Ok(())
    }
}

fn format_group(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    dataset: &Dataset,
    prefix: &str,
    is_last: bool,
) -> fmt::Result {
    let connector = if is_last { "└── " } else { "├── " };
    let dims: Vec<String> = dataset
        .dims
        .iter()
        .map(|(d, len)| format!("{}={}", d, len))
        .collect();
    writeln!(f, "{}{}{} ({})", prefix, connector, name, dims.join(", "))?;

    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
    let vars = dataset.variable_names();
    let total = vars.len() + dataset.children.len();
    for (j, var) in vars.iter().enumerate() {
        let branch = if j + 1 == total { "└── " } else { "├── " };
        let array = dataset.get(var).map(|a| a.dims.join(", ")).unwrap_or_default();
        writeln!(f, "{}{}{} ({})", child_prefix, branch, var, array)?;
    }
    for (k, (child_name, child)) in dataset.children.iter().enumerate() {
        let last = vars.len() + k + 1 == total;
        format_group(f, child_name, child, &child_prefix, last)?;
    }
    Ok(())
}
