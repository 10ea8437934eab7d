//! Branch-cut segmentation of the node tree into watch chains.
//!
//! A chain grows through directories with exactly one directory child and
//! is cut at every branch point. Each directory on a chain is registered
//! individually, but one worker serves the whole chain, so the number of
//! workers tracks the number of branch points rather than directories.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHasher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tree::{Node, NodeId, NodeTree};

/// Identifier of a chain, derived from its first and last path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn for_ends(first: &Path, last: &Path) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(first.to_string_lossy().as_bytes());
        hasher.write_u8(0xff);
        hasher.write(last.to_string_lossy().as_bytes());
        Self(hasher.finish())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SegmentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SegmentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        u64::from_str_radix(&text, 16)
            .map(SegmentId)
            .map_err(serde::de::Error::custom)
    }
}

/// An unbranching run of directory paths, ordered from top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub paths: Vec<PathBuf>,
}

impl Segment {
    /// Builds a segment from a non-empty chain.
    fn from_chain(paths: Vec<PathBuf>) -> Option<Self> {
        let id = SegmentId::for_ends(paths.first()?, paths.last()?);
        Some(Self { id, paths })
    }

    pub fn first(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    pub fn last(&self) -> Option<&Path> {
        self.paths.last().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// The full set of chains for one tree snapshot, ordered by segment id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPlan {
    segments: BTreeMap<SegmentId, Segment>,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, SegmentId, Segment> {
        self.segments.iter()
    }

    fn insert(&mut self, chain: Vec<PathBuf>) {
        if let Some(segment) = Segment::from_chain(chain) {
            self.segments.insert(segment.id, segment);
        }
    }
}

impl<'a> IntoIterator for &'a SegmentPlan {
    type Item = (&'a SegmentId, &'a Segment);
    type IntoIter = btree_map::Iter<'a, SegmentId, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Splits a tree snapshot into watch chains.
///
/// Every root directory starts a chain. Roots are visited in path order and
/// children in child-list order; child ids absent from `nodes` are ignored.
pub fn plan_segments(nodes: &FnvHashMap<NodeId, Node>) -> SegmentPlan {
    let mut roots: Vec<&Node> = nodes
        .values()
        .filter(|node| node.is_root() && node.is_dir())
        .collect();
    roots.sort_by(|a, b| a.path.cmp(&b.path));

    let mut plan = SegmentPlan::default();
    let mut pending: Vec<(&Node, Vec<PathBuf>)> = roots
        .into_iter()
        .rev()
        .map(|root| (root, vec![root.path.clone()]))
        .collect();

    while let Some((node, mut chain)) = pending.pop() {
        let dirs: Vec<&Node> = node
            .children
            .iter()
            .filter_map(|child| nodes.get(child))
            .filter(|child| child.is_dir())
            .collect();

        match dirs.as_slice() {
            [] => plan.insert(chain),
            [only] => {
                chain.push(only.path.clone());
                pending.push((*only, chain));
            }
            _ => {
                // Branch point: it ends this chain and seeds one per child
                plan.insert(chain);
                for child in dirs.iter().rev() {
                    pending.push((*child, vec![node.path.clone(), child.path.clone()]));
                }
            }
        }
    }

    plan
}

/// Holds the current plan for one tree.
pub struct SegmentPlanner {
    tree: Arc<NodeTree>,
    plan: SegmentPlan,
}

impl SegmentPlanner {
    pub fn new(tree: Arc<NodeTree>) -> Self {
        Self {
            tree,
            plan: SegmentPlan::default(),
        }
    }

    pub fn reset(&mut self) {
        self.plan = SegmentPlan::default();
    }

    /// Discards the current plan and derives a new one from a fresh snapshot.
    pub fn recompute_plan(&mut self) -> &SegmentPlan {
        self.plan = plan_segments(&self.tree.snapshot());
        &self.plan
    }

    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_dir(tree: &NodeTree, path: &str, parent: Option<&str>) {
        let parent_id = parent.map(|p| NodeId::for_path(Path::new(p)));
        let node = Node::directory(PathBuf::from(path), parent_id);
        let id = node.id;
        tree.upsert(node);
        if let Some(parent_id) = parent_id {
            let mut children = tree.get(parent_id).unwrap().children;
            children.push(id);
            tree.set_children(parent_id, children);
        }
    }

    fn add_file(tree: &NodeTree, path: &str, parent: &str) {
        let parent_id = NodeId::for_path(Path::new(parent));
        let node = Node::file(PathBuf::from(path), Some(parent_id), 0);
        let id = node.id;
        tree.upsert(node);
        let mut children = tree.get(parent_id).unwrap().children;
        children.push(id);
        tree.set_children(parent_id, children);
    }

    fn chains(plan: &SegmentPlan) -> Vec<Vec<String>> {
        let mut chains: Vec<Vec<String>> = plan
            .segments()
            .map(|segment| {
                segment
                    .paths
                    .iter()
                    .map(|path| path.to_string_lossy().into_owned())
                    .collect()
            })
            .collect();
        chains.sort();
        chains
    }

    #[test]
    fn single_chain_covers_unbranched_tree() {
        let tree = NodeTree::new();
        add_dir(&tree, "/root", None);
        add_dir(&tree, "/root/A", Some("/root"));
        add_dir(&tree, "/root/A/B", Some("/root/A"));
        add_file(&tree, "/root/A/readme.txt", "/root/A");

        let plan = plan_segments(&tree.snapshot());

        assert_eq!(chains(&plan), vec![vec!["/root", "/root/A", "/root/A/B"]]);
        let segment = plan.segments().next().unwrap();
        assert_eq!(
            segment.id,
            SegmentId::for_ends(Path::new("/root"), Path::new("/root/A/B"))
        );
        assert_eq!(segment.first(), Some(Path::new("/root")));
        assert_eq!(segment.last(), Some(Path::new("/root/A/B")));
    }

    #[test]
    fn empty_segment_has_no_ends() {
        let segment: Segment =
            serde_json::from_str(r#"{"id":"00000000000000ff","paths":[]}"#).unwrap();
        assert!(segment.is_empty());
        assert_eq!(segment.first(), None);
        assert_eq!(segment.last(), None);
    }

    #[test]
    fn branch_point_ends_and_seeds_chains() {
        let tree = NodeTree::new();
        add_dir(&tree, "/root", None);
        add_dir(&tree, "/root/A", Some("/root"));
        add_dir(&tree, "/root/B", Some("/root"));

        let plan = plan_segments(&tree.snapshot());

        assert_eq!(
            chains(&plan),
            vec![
                vec!["/root".to_string()],
                vec!["/root".to_string(), "/root/A".to_string()],
                vec!["/root".to_string(), "/root/B".to_string()],
            ]
        );
    }

    #[test]
    fn chains_link_parents_to_children() {
        let tree = NodeTree::new();
        add_dir(&tree, "/r", None);
        add_dir(&tree, "/r/a", Some("/r"));
        add_dir(&tree, "/r/a/b", Some("/r/a"));
        add_dir(&tree, "/r/a/b/x", Some("/r/a/b"));
        add_dir(&tree, "/r/a/b/y", Some("/r/a/b"));
        add_dir(&tree, "/r/a/b/y/z", Some("/r/a/b/y"));
        add_dir(&tree, "/r/c", Some("/r"));
        add_dir(&tree, "/other", None);

        let snapshot = tree.snapshot();
        let plan = plan_segments(&snapshot);

        assert_eq!(plan.len(), 6);
        for segment in plan.segments() {
            for pair in segment.paths.windows(2) {
                let child = &snapshot[&NodeId::for_path(&pair[1])];
                assert_eq!(child.parent, Some(NodeId::for_path(&pair[0])));
            }
            if segment.len() > 2 {
                for interior in &segment.paths[1..segment.len() - 1] {
                    let node = &snapshot[&NodeId::for_path(interior)];
                    let dir_children = node
                        .children
                        .iter()
                        .filter(|id| snapshot[*id].is_dir())
                        .count();
                    assert!(dir_children <= 1);
                }
            }
        }
    }

    #[test]
    fn replanning_is_deterministic() {
        let tree = Arc::new(NodeTree::new());
        add_dir(&tree, "/r", None);
        add_dir(&tree, "/r/a", Some("/r"));
        add_dir(&tree, "/r/b", Some("/r"));
        add_dir(&tree, "/r/b/c", Some("/r/b"));

        let mut planner = SegmentPlanner::new(tree);
        let first = planner.recompute_plan().clone();
        planner.reset();
        assert!(planner.plan().is_empty());
        let second = planner.recompute_plan().clone();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn missing_children_are_ignored() {
        let tree = NodeTree::new();
        add_dir(&tree, "/r", None);
        let mut snapshot = tree.snapshot();
        let root = NodeId::for_path(Path::new("/r"));
        snapshot
            .get_mut(&root)
            .unwrap()
            .children
            .push(NodeId::for_path(Path::new("/r/ghost")));

        let plan = plan_segments(&snapshot);
        assert_eq!(chains(&plan), vec![vec!["/r".to_string()]]);
    }
}
