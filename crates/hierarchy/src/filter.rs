use foundation::FeatureId;

use crate::feature::{Feature, FeatureCollection};

/// Features of `collection` whose parent link equals `parent`, in source order.
///
/// With no parent the whole collection is returned. The result borrows from
/// the collection and is always a subset of it; an empty result is a valid
/// "no children" state, not an error.
pub fn filter_by_parent<'a>(
    collection: &'a FeatureCollection,
    parent: Option<&FeatureId>,
) -> Vec<&'a Feature> {
    match parent {
        None => collection.iter().collect(),
        Some(parent) => collection
            .iter()
            .filter(|f| f.parent.as_ref() == Some(parent))
            .collect(),
    }
}

/// Same selection as [`filter_by_parent`], as positions into the collection.
pub fn matching_indices(collection: &FeatureCollection, parent: Option<&FeatureId>) -> Vec<usize> {
    collection
        .iter()
        .enumerate()
        .filter(|(_, f)| match parent {
            None => true,
            Some(parent) => f.parent.as_ref() == Some(parent),
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Features of `children` whose parent id does not resolve in `parents`.
///
/// Orphans are unreachable through [`filter_by_parent`] from any visible
/// parent; callers report them for data quality, they are never an error.
pub fn find_orphans<'a>(
    children: &'a FeatureCollection,
    parents: &FeatureCollection,
) -> Vec<&'a Feature> {
    children
        .iter()
        .filter(|f| match &f.parent {
            Some(parent) => !parents.contains(parent),
            None => true,
        })
        .collect()
}
