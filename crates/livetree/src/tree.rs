//! The shared node tree.
//!
//! `NodeTree` is the single authoritative store of indexed entries. Every
//! method performs one atomic read or mutation under an internal lock;
//! callers never lock and must not assume consistency across calls.

mod node;

use std::path::Path;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::RwLock;

use crate::error::{IndexError, Result};

pub use node::{Node, NodeId, NodeKind, ScanStatus};

/// Thread-safe mapping from node id to node.
#[derive(Debug, Default)]
pub struct NodeTree {
    nodes: RwLock<FnvHashMap<NodeId, Node>>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn get_by_path(&self, path: &Path) -> Option<Node> {
        self.get(NodeId::for_path(path))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Returns a point-in-time copy of every node.
    pub fn snapshot(&self) -> FnvHashMap<NodeId, Node> {
        self.nodes.read().clone()
    }

    /// Returns all nodes without a parent, ordered by path.
    pub fn roots(&self) -> Vec<Node> {
        let mut roots: Vec<Node> = self
            .nodes
            .read()
            .values()
            .filter(|node| node.is_root())
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.path.cmp(&b.path));
        roots
    }

    /// Returns the ids of all childless nodes, ordered by path.
    pub fn leaves(&self) -> Vec<NodeId> {
        let nodes = self.nodes.read();
        let mut leaves: Vec<&Node> = nodes.values().filter(|node| node.is_leaf()).collect();
        leaves.sort_by(|a, b| a.path.cmp(&b.path));
        leaves.into_iter().map(|node| node.id).collect()
    }

    /// Number of parent hops from `id` up to its root.
    pub fn depth_of(&self, id: NodeId) -> Option<usize> {
        let nodes = self.nodes.read();
        let mut current = nodes.get(&id)?;
        let mut depth = 0;
        while let Some(parent) = current.parent {
            current = nodes.get(&parent)?;
            depth += 1;
            if depth > nodes.len() {
                return None;
            }
        }
        Some(depth)
    }

    /// Inserts a node or replaces the node with the same id.
    ///
    /// A replaced node keeps its popularity and, when the replacement carries
    /// no parent, its parent link. A directory replaced by a directory keeps
    /// its child list and scan status; one replaced by a file loses its subtree.
    ///
    /// Returns false, inserting nothing, if the node names a parent that is
    /// not in the tree.
    pub fn upsert(&self, mut node: Node) -> bool {
        let mut nodes = self.nodes.write();
        if let Some(parent) = node.parent {
            if !nodes.contains_key(&parent) {
                return false;
            }
        }
        if let Some(existing) = nodes.get(&node.id) {
            node.popularity = existing.popularity;
            if node.parent.is_none() {
                node.parent = existing.parent;
            }
            if node.is_dir() && existing.is_dir() {
                node.children = existing.children.clone();
                node.kind = existing.kind.clone();
            } else if !node.is_dir() {
                let orphaned = existing.children.clone();
                for child in orphaned {
                    remove_subtree(&mut nodes, child);
                }
            }
        }
        nodes.insert(node.id, node);
        true
    }

    /// Replaces the child list of a directory.
    ///
    /// Former children missing from `children` are removed with their subtrees.
    pub fn set_children(&self, id: NodeId, children: Vec<NodeId>) {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(&id) else {
            return;
        };
        let keep: FnvHashSet<NodeId> = children.iter().copied().collect();
        let previous = std::mem::replace(&mut node.children, children);
        for stale in previous.into_iter().filter(|child| !keep.contains(child)) {
            remove_subtree(&mut nodes, stale);
        }
    }

    pub fn set_scan_status(&self, id: NodeId, status: ScanStatus) {
        if let Some(node) = self.nodes.write().get_mut(&id) {
            node.set_scan_status(status);
        }
    }

    /// Increments the popularity of a node, returning the new value.
    pub fn increase_popularity(&self, id: NodeId) -> Result<u32> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&id).ok_or(IndexError::NodeNotFound(id))?;
        node.popularity = node.popularity.saturating_add(1);
        Ok(node.popularity)
    }

    /// Lowers every node's popularity by `amount`, floored at zero.
    pub fn decay(&self, amount: u32) {
        for node in self.nodes.write().values_mut() {
            node.popularity = node.popularity.saturating_sub(amount);
        }
    }

    /// Removes each listed node together with its subtree.
    ///
    /// A node is only removed if, at this moment, it and all of its
    /// descendants have zero popularity and it is not a root. Removed ids
    /// are unlinked from their parents. Returns every id that was removed.
    pub fn remove_cold_subtrees(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut nodes = self.nodes.write();
        let mut removed = Vec::new();
        for &id in ids {
            let Some(parent) = nodes.get(&id).and_then(|node| node.parent) else {
                continue;
            };
            if !subtree_is_cold(&nodes, id) {
                continue;
            }
            if let Some(parent_node) = nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != id);
            }
            removed.extend(remove_subtree(&mut nodes, id));
        }
        removed
    }

    /// Removes every node whose parent is no longer in the tree, together
    /// with its subtree. Returns every id that was removed.
    pub fn remove_detached(&self) -> Vec<NodeId> {
        let mut nodes = self.nodes.write();
        let mut removed = Vec::new();
        loop {
            let detached: Vec<NodeId> = nodes
                .values()
                .filter(|node| {
                    node.parent
                        .is_some_and(|parent| !nodes.contains_key(&parent))
                })
                .map(|node| node.id)
                .collect();
            if detached.is_empty() {
                return removed;
            }
            for id in detached {
                removed.extend(remove_subtree(&mut nodes, id));
            }
        }
    }
}

/// Returns true if `id` and every node below it have zero popularity.
///
/// Child ids that are missing from `nodes` are ignored.
pub(crate) fn subtree_is_cold(nodes: &FnvHashMap<NodeId, Node>, id: NodeId) -> bool {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let Some(node) = nodes.get(&current) else {
            continue;
        };
        if node.popularity > 0 {
            return false;
        }
        stack.extend(node.children.iter().copied());
    }
    true
}

/// Removes `id` and its descendants without touching the parent's child list.
fn remove_subtree(nodes: &mut FnvHashMap<NodeId, Node>, id: NodeId) -> Vec<NodeId> {
    let mut removed = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(node) = nodes.remove(&current) {
            stack.extend(node.children);
            removed.push(current);
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dir(tree: &NodeTree, path: &str, parent: Option<NodeId>) -> NodeId {
        let node = Node::directory(PathBuf::from(path), parent);
        let id = node.id;
        tree.upsert(node);
        if let Some(parent) = parent {
            let mut children = tree.get(parent).unwrap().children;
            children.push(id);
            tree.set_children(parent, children);
        }
        id
    }

    fn file(tree: &NodeTree, path: &str, parent: NodeId) -> NodeId {
        let node = Node::file(PathBuf::from(path), Some(parent), 1);
        let id = node.id;
        tree.upsert(node);
        let mut children = tree.get(parent).unwrap().children;
        children.push(id);
        tree.set_children(parent, children);
        id
    }

    #[test]
    fn upsert_preserves_popularity_parent_and_children() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let sub = dir(&tree, "/r/sub", Some(root));
        let leaf = file(&tree, "/r/sub/a.txt", sub);
        tree.increase_popularity(sub).unwrap();

        // Rescanning the subdirectory as its own scan root
        tree.upsert(Node::directory(PathBuf::from("/r/sub"), None));

        let sub_node = tree.get(sub).unwrap();
        assert_eq!(sub_node.popularity, 1);
        assert_eq!(sub_node.parent, Some(root));
        assert_eq!(sub_node.children, vec![leaf]);
    }

    #[test]
    fn set_children_drops_vanished_subtrees() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let gone = dir(&tree, "/r/gone", Some(root));
        let deep = file(&tree, "/r/gone/x.bin", gone);
        let kept = file(&tree, "/r/kept.txt", root);

        tree.set_children(root, vec![kept]);

        assert!(!tree.contains(gone));
        assert!(!tree.contains(deep));
        assert!(tree.contains(kept));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn decay_floors_at_zero() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        for _ in 0..3 {
            tree.increase_popularity(root).unwrap();
        }
        tree.decay(2);
        assert_eq!(tree.get(root).unwrap().popularity, 1);
        tree.decay(2);
        assert_eq!(tree.get(root).unwrap().popularity, 0);
        tree.decay(2);
        assert_eq!(tree.get(root).unwrap().popularity, 0);
    }

    #[test]
    fn increase_popularity_unknown_node() {
        let tree = NodeTree::new();
        let missing = NodeId::for_path(Path::new("/nowhere"));
        assert!(matches!(
            tree.increase_popularity(missing),
            Err(IndexError::NodeNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn remove_cold_subtrees_skips_hot_and_roots() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let cold = dir(&tree, "/r/cold", Some(root));
        let cold_leaf = file(&tree, "/r/cold/a", cold);
        let warm = dir(&tree, "/r/warm", Some(root));
        let hot_leaf = file(&tree, "/r/warm/b", warm);
        tree.increase_popularity(hot_leaf).unwrap();

        let removed = tree.remove_cold_subtrees(&[root, cold, warm]);

        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&cold) && removed.contains(&cold_leaf));
        assert!(tree.contains(root));
        assert!(tree.contains(warm));
        assert!(tree.contains(hot_leaf));
        assert_eq!(tree.get(root).unwrap().children, vec![warm]);
    }

    #[test]
    fn upsert_refuses_missing_parent() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let gone = dir(&tree, "/r/d", Some(root));
        tree.set_children(root, Vec::new());
        assert!(!tree.contains(gone));

        assert!(!tree.upsert(Node::file(PathBuf::from("/r/d/x"), Some(gone), 0)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn detached_nodes_are_swept_with_their_subtrees() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let d = dir(&tree, "/r/d", Some(root));
        // Inserted under d but not yet linked when d goes away
        let x = Node::directory(PathBuf::from("/r/d/x"), Some(d));
        let x_id = x.id;
        assert!(tree.upsert(x));
        let y = file(&tree, "/r/d/x/y", x_id);
        assert_eq!(tree.remove_cold_subtrees(&[d]), vec![d]);
        assert!(tree.contains(x_id));

        let mut removed = tree.remove_detached();
        removed.sort();
        let mut expected = vec![x_id, y];
        expected.sort();
        assert_eq!(removed, expected);
        assert_eq!(tree.len(), 1);
        assert!(tree.remove_detached().is_empty());
    }

    #[test]
    fn roots_leaves_and_depth() {
        let tree = NodeTree::new();
        let root = dir(&tree, "/r", None);
        let a = dir(&tree, "/r/a", Some(root));
        let f = file(&tree, "/r/a/f", a);
        let b = dir(&tree, "/r/b", Some(root));

        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.leaves(), vec![f, b]);
        assert_eq!(tree.depth_of(f), Some(2));
        assert_eq!(tree.depth_of(root), Some(0));
    }
}
