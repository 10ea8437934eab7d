//! Per-segment file system watching.
//!
//! This module handles the watch side of the index:
//! - One worker thread per segment, holding a notify watcher
//! - A pool keyed by segment id, started and stopped as a unit
//! - Coalescing of changed paths reported by the workers

mod paths;
mod pool;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use crate::segment::SegmentId;

pub use paths::coalesce_event_paths;
pub use pool::WatchWorkerPool;
pub use worker::{WatchWorker, WorkerExit, WorkerState};

/// One poll cycle's worth of changes seen by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub segment: SegmentId,
    /// Changed paths, coalesced. Empty when the backend only signalled that
    /// something changed.
    pub paths: Vec<PathBuf>,
}

/// Callback a worker invokes once per poll cycle with events.
pub type ChangeReporter = Arc<dyn Fn(ChangeReport) + Send + Sync>;
