//! Live, self-pruning in-memory index of a file system.
//!
//! This crate keeps a node tree of scanned directories and files fresh:
//! - Bounded recursive scanning into a shared `NodeTree`
//! - Branch-cut segmentation of the tree into watchable chains
//! - One watch worker per chain, rebuilt through a debounced coordinator
//! - Popularity decay and cold-branch pruning to bound the tree size

pub mod config;
pub mod error;
pub mod manager;
pub mod prune;
pub mod rebuild;
pub mod scanner;
pub mod segment;
pub mod tree;
pub mod watcher;

// Re-export main types
pub use config::{IndexConfig, ScanDepth, Visibility};
pub use error::{IndexError, Result};
pub use manager::LiveIndex;
pub use prune::{PopularityDecayPruner, TickOutcome};
pub use rebuild::{RebuildCoordinator, RebuildTrigger};
pub use scanner::{volume_roots, DirectoryScanner, ScanBatch, ScanSummary};
pub use segment::{plan_segments, Segment, SegmentId, SegmentPlan, SegmentPlanner};
pub use tree::{Node, NodeId, NodeKind, NodeTree, ScanStatus};
pub use watcher::{
    coalesce_event_paths, ChangeReport, ChangeReporter, WatchWorker, WatchWorkerPool, WorkerExit,
    WorkerState,
};
