//! The `LiveIndex` facade.
//!
//! Wires a node tree, a rebuild coordinator, a scanner and a pruner together
//! and exposes the operations an API layer calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnv::FnvHashMap;
use tokio::task::JoinHandle;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::prune::{PopularityDecayPruner, TickOutcome};
use crate::rebuild::RebuildCoordinator;
use crate::scanner::{volume_roots, DirectoryScanner, ScanBatch};
use crate::segment::SegmentPlan;
use crate::tree::{Node, NodeId, NodeTree};

pub struct LiveIndex {
    config: IndexConfig,
    tree: Arc<NodeTree>,
    coordinator: Arc<RebuildCoordinator>,
    scanner: DirectoryScanner,
    pruner: Arc<PopularityDecayPruner>,
}

impl LiveIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let tree = Arc::new(NodeTree::new());
        let coordinator = RebuildCoordinator::new(tree.clone(), &config);
        let scanner = DirectoryScanner::new(tree.clone(), coordinator.clone(), &config);
        let pruner = Arc::new(PopularityDecayPruner::new(
            tree.clone(),
            coordinator.clone(),
            &config,
        ));
        log::info!(
            "live index created depth={} visibility={:?} prune_threshold={}",
            config.scan_depth,
            config.visibility,
            config.prune_threshold
        );
        Ok(Self {
            config,
            tree,
            coordinator,
            scanner,
            pruner,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Scans `path` to the configured depth and returns the resulting tree.
    pub fn initial_scan(&self, path: impl AsRef<Path>) -> Result<FnvHashMap<NodeId, Node>> {
        self.scanner.initial_scan(path)?;
        Ok(self.tree.snapshot())
    }

    /// Lists each root one level deep and returns the resulting tree.
    pub fn scan_dir_list<I, P>(&self, roots: I) -> FnvHashMap<NodeId, Node>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.scanner.scan_dir_list(roots);
        self.tree.snapshot()
    }

    /// Lists every volume root of this machine.
    pub fn scan_volume_roots(&self) -> ScanBatch {
        self.scanner.scan_dir_list(volume_roots())
    }

    pub fn increase_popularity(&self, id: NodeId) -> Result<u32> {
        self.tree.increase_popularity(id)
    }

    /// Snapshot of the whole tree.
    pub fn tree(&self) -> FnvHashMap<NodeId, Node> {
        self.tree.snapshot()
    }

    pub fn node_tree(&self) -> &Arc<NodeTree> {
        &self.tree
    }

    pub fn tick(&self) -> TickOutcome {
        self.pruner.tick()
    }

    /// Starts the periodic decay timer. Must be called inside a tokio runtime.
    pub fn start_decay_timer(&self) -> JoinHandle<()> {
        self.pruner.clone().spawn_periodic(self.config.decay_interval())
    }

    pub fn segment_plan(&self) -> SegmentPlan {
        self.coordinator.segment_plan()
    }

    pub fn take_changed_paths(&self) -> Vec<PathBuf> {
        self.coordinator.take_changed_paths()
    }

    pub fn coordinator(&self) -> &Arc<RebuildCoordinator> {
        &self.coordinator
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}
