use std::path::{Path, PathBuf};

use fnv::FnvHashSet;

/// Reduces changed paths to a minimal ancestor cover.
///
/// Duplicates collapse, and any path with an ancestor in the set is dropped.
/// The result is ordered shallowest first, then by path.
pub fn coalesce_event_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    if paths.len() <= 1 {
        return paths;
    }

    let mut candidates = paths;
    candidates.sort_unstable_by(|a, b| {
        a.components()
            .count()
            .cmp(&b.components().count())
            .then_with(|| a.cmp(b))
    });
    candidates.dedup();

    let mut covered: FnvHashSet<PathBuf> = FnvHashSet::default();
    let mut selected = Vec::with_capacity(candidates.len());
    for path in candidates {
        if is_covered(&path, &covered) {
            continue;
        }
        covered.insert(path.clone());
        selected.push(path);
    }
    selected
}

fn is_covered(path: &Path, covered: &FnvHashSet<PathBuf>) -> bool {
    path.ancestors().any(|ancestor| covered.contains(ancestor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> Vec<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn empty_and_single_inputs_pass_through() {
        assert!(coalesce_event_paths(Vec::new()).is_empty());
        assert_eq!(coalesce_event_paths(paths(&["/a/b"])), paths(&["/a/b"]));
    }

    #[test]
    fn ancestor_absorbs_descendants_in_any_order() {
        let result = coalesce_event_paths(paths(&["/w/seg/c/d", "/w/seg/e", "/w/seg"]));
        assert_eq!(result, paths(&["/w/seg"]));
    }

    #[test]
    fn siblings_and_duplicates() {
        let result = coalesce_event_paths(paths(&["/a/c", "/a/b", "/a/b", "/x/y"]));
        assert_eq!(result, paths(&["/a/b", "/a/c", "/x/y"]));
    }

    #[test]
    fn component_prefixes_are_not_ancestors() {
        let result = coalesce_event_paths(paths(&["/srv/log", "/srv/logs"]));
        assert_eq!(result.len(), 2);
    }
}
