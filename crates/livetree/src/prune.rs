//! Popularity decay and cold-branch pruning.
//!
//! Each tick ages every node, then walks upward from every cold leaf to find
//! branches that are cold all the way down. Marked nodes are removed in one
//! pass, re-checked against the live tree. Nodes left behind under a parent
//! that is already gone are swept in the same tick. Any removal asks for a
//! watch rebuild since the segment plan no longer matches the tree.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fnv::{FnvHashMap, FnvHashSet};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::IndexConfig;
use crate::rebuild::RebuildTrigger;
use crate::tree::{subtree_is_cold, Node, NodeId, NodeTree};

const COLD_PRUNE: &str = "cold prune";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tree was at or below the prune threshold.
    Skipped,
    Ran { removed: usize },
}

pub struct PopularityDecayPruner {
    tree: Arc<NodeTree>,
    trigger: Arc<dyn RebuildTrigger>,
    decay_amount: u32,
    threshold: usize,
}

impl PopularityDecayPruner {
    pub fn new(tree: Arc<NodeTree>, trigger: Arc<dyn RebuildTrigger>, config: &IndexConfig) -> Self {
        Self {
            tree,
            trigger,
            decay_amount: config.decay_amount,
            threshold: config.prune_threshold,
        }
    }

    /// Runs one decay and prune pass if the tree is above the threshold.
    pub fn tick(&self) -> TickOutcome {
        let size = self.tree.len();
        if size <= self.threshold {
            log::trace!("decay tick skipped nodes={} threshold={}", size, self.threshold);
            return TickOutcome::Skipped;
        }

        let started = Instant::now();
        self.tree.decay(self.decay_amount);
        let marked = cold_candidates(&self.tree.snapshot());
        let mut removed = if marked.is_empty() {
            Vec::new()
        } else {
            self.tree.remove_cold_subtrees(&marked)
        };
        let detached = self.tree.remove_detached();
        removed.extend_from_slice(&detached);
        log::info!(
            "decay tick finished nodes={} marked={} detached={} removed={} elapsed_ms={}",
            size,
            marked.len(),
            detached.len(),
            removed.len(),
            started.elapsed().as_millis()
        );

        if !removed.is_empty() {
            self.trigger.request_rebuild(COLD_PRUNE);
        }
        TickOutcome::Ran {
            removed: removed.len(),
        }
    }

    /// Runs [`tick`](Self::tick) every `period` on the current tokio runtime.
    ///
    /// The first tick happens one period after the call. A tick runs on the
    /// blocking pool and is awaited before the next one is scheduled, so
    /// ticks never overlap; aborting the task does not interrupt a running
    /// tick.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pruner = Arc::clone(&self);
                if let Err(err) = tokio::task::spawn_blocking(move || pruner.tick()).await {
                    log::error!("decay tick failed: {}", err);
                }
            }
        })
    }
}

/// Collects every node that belongs to a uniformly cold branch.
///
/// A walk starts at each zero-popularity leaf. While the candidate has a
/// parent whose whole child set is cold all the way down, the entire set is
/// marked and the walk moves to the parent if the parent itself is cold.
/// Otherwise only the candidate is marked. Each parent is evaluated once.
pub(crate) fn cold_candidates(nodes: &FnvHashMap<NodeId, Node>) -> Vec<NodeId> {
    let mut leaves: Vec<&Node> = nodes
        .values()
        .filter(|node| node.is_leaf() && node.popularity == 0)
        .collect();
    leaves.sort_by(|a, b| a.path.cmp(&b.path));

    let mut marked: FnvHashSet<NodeId> = FnvHashSet::default();
    // parent id -> whether its whole child set was cold
    let mut resolved: FnvHashMap<NodeId, bool> = FnvHashMap::default();

    for leaf in leaves {
        let mut candidate = leaf.id;
        loop {
            let Some(parent_id) = nodes.get(&candidate).and_then(|node| node.parent) else {
                break;
            };
            let Some(parent) = nodes.get(&parent_id) else {
                break;
            };
            if let Some(&all_cold) = resolved.get(&parent_id) {
                if !all_cold {
                    marked.insert(candidate);
                }
                break;
            }

            let all_cold = parent
                .children
                .iter()
                .all(|child| subtree_is_cold(nodes, *child));
            resolved.insert(parent_id, all_cold);

            if !all_cold {
                marked.insert(candidate);
                break;
            }
            marked.extend(parent.children.iter().copied());
            if parent.popularity > 0 {
                break;
            }
            candidate = parent_id;
        }
    }

    let mut marked: Vec<&Node> = marked.iter().filter_map(|id| nodes.get(id)).collect();
    marked.sort_by(|a, b| a.path.cmp(&b.path));
    marked.into_iter().map(|node| node.id).collect()
}
