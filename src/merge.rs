//! Group merging.
//!
//! Opens each requested group of one container as its own dataset and keys
//! the results by group name. Every group is read through a fresh reader, so
//! no read position is shared between groups.

use crate::config::TrackSelection;
use crate::data::{GroupSource, MergedTree};
use crate::error::{Atl11Error, Result};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Merge the named groups of `source`, in the given order.
///
/// Any failure aborts the merge; a partial tree is never returned.
#[instrument(skip_all, fields(groups = names.len()))]
pub fn merge_groups<S, N>(source: &S, names: &[N]) -> Result<MergedTree>
where
    S: GroupSource + ?Sized,
    N: AsRef<str>,
{
    let mut seen = HashSet::new();
    for name in names {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(Atl11Error::invalid_argument("empty group name"));
        }
        if !seen.insert(name) {
            return Err(Atl11Error::invalid_argument(format!(
                "group {} requested more than once",
                name
            )));
        }
    }

    let mut tree = MergedTree::new();
    for name in names {
        let name = name.as_ref();
        debug!(group = name, "Opening group");
        let dataset = source.open_group(Some(name))?;
        tree.insert(name, dataset);
    }

    info!(groups = ?tree.names(), "Merged groups");
    Ok(tree)
}

/// Top-level groups named `<prefix><digits>`, in container order.
pub fn discover_groups<S>(source: &S, prefix: &str) -> Result<Vec<String>>
where
    S: GroupSource + ?Sized,
{
    let names: Vec<String> = source
        .group_names()?
        .into_iter()
        .filter(|name| matches_prefix(name, prefix))
        .collect();
    debug!(prefix, found = ?names, "Discovered groups");
    Ok(names)
}

fn matches_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Discover `<prefix><digits>` groups and merge them.
pub fn merge_discovered<S>(source: &S, prefix: &str) -> Result<MergedTree>
where
    S: GroupSource + ?Sized,
{
    let names = discover_groups(source, prefix)?;
    if names.is_empty() {
        return Err(Atl11Error::group_not_found(format!("{}*", prefix)));
    }
    merge_groups(source, &names)
}

/// Merge according to a [`TrackSelection`].
pub fn merge_selection<S>(source: &S, selection: &TrackSelection) -> Result<MergedTree>
where
    S: GroupSource + ?Sized,
{
    match selection {
        TrackSelection::Fixed(names) => merge_groups(source, names),
        TrackSelection::Discover { prefix } => merge_discovered(source, prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataArray, Dataset};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory source that records which groups were opened.
    struct FakeSource {
        groups: Vec<(String, Vec<f64>)>,
        opened: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn new(groups: &[(&str, Vec<f64>)]) -> Self {
            Self {
                groups: groups
                    .iter()
                    .map(|(name, values)| (name.to_string(), values.clone()))
                    .collect(),
                opened: RefCell::new(Vec::new()),
            }
        }
    }

    impl GroupSource for FakeSource {
        fn open_group(&self, group: Option<&str>) -> Result<Dataset> {
            let name = group.unwrap_or("/");
            self.opened.borrow_mut().push(name.to_string());
            let lookup: HashMap<_, _> = self.groups.iter().cloned().collect();
            let values = lookup
                .get(name)
                .ok_or_else(|| Atl11Error::group_not_found(name))?;
            let mut ds = Dataset::new(name);
            ds.add_data_var(DataArray::from_vec("elevation", "ref_pt", values.clone()))?;
            Ok(ds)
        }

        fn group_names(&self) -> Result<Vec<String>> {
            Ok(self.groups.iter().map(|(name, _)| name.clone()).collect())
        }
    }

    #[test]
    fn merges_in_request_order() {
        let source = FakeSource::new(&[("A", vec![1.0]), ("B", vec![2.0]), ("C", vec![3.0])]);
        let tree = merge_groups(&source, &["C", "A", "B"]).unwrap();
        assert_eq!(tree.names(), vec!["C", "A", "B"]);
        assert_eq!(tree.get("A").unwrap().get("elevation").unwrap().values(), vec![1.0]);
    }

    #[test]
    fn missing_group_aborts_without_partial_tree() {
        let source = FakeSource::new(&[("A", vec![1.0]), ("B", vec![2.0])]);
        let err = merge_groups(&source, &["A", "B", "C"]).unwrap_err();
        match err {
            Atl11Error::GroupNotFound { group } => assert_eq!(group, "C"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*source.opened.borrow(), vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicate_names_are_rejected_before_reading() {
        let source = FakeSource::new(&[("A", vec![1.0])]);
        let err = merge_groups(&source, &["A", "A"]).unwrap_err();
        assert!(matches!(err, Atl11Error::InvalidArgument(_)));
        assert!(source.opened.borrow().is_empty());
    }

    #[test]
    fn empty_request_gives_empty_tree() {
        let source = FakeSource::new(&[("A", vec![1.0])]);
        let names: [&str; 0] = [];
        assert!(merge_groups(&source, &names).unwrap().is_empty());
    }

    #[test]
    fn discovery_keeps_numbered_groups_only() {
        let source = FakeSource::new(&[
            ("ancillary_data", vec![]),
            ("pt1", vec![1.0]),
            ("pt2", vec![2.0]),
            ("pt", vec![]),
            ("pt3", vec![3.0]),
            ("ptx", vec![]),
        ]);
        assert_eq!(discover_groups(&source, "pt").unwrap(), vec!["pt1", "pt2", "pt3"]);

        let tree = merge_selection(&source, &TrackSelection::discover_pair_tracks()).unwrap();
        assert_eq!(tree.names(), vec!["pt1", "pt2", "pt3"]);
    }

    #[test]
    fn discovery_with_no_match_is_not_found() {
        let source = FakeSource::new(&[("gt1l", vec![1.0])]);
        let err = merge_discovered(&source, "pt").unwrap_err();
        assert!(err.is_not_found());
    }
}
