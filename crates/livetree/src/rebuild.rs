//! Debounced, serialized rebuilds of the watch topology.
//!
//! Scans, prunes and worker reports all funnel into
//! [`RebuildTrigger::request_rebuild`]. A request inside the debounce window
//! is dropped, not queued. An accepted request runs on its own thread so the
//! caller never blocks, and the stop/replan/restart sequence holds a single
//! lock for its whole duration.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::segment::{SegmentPlan, SegmentPlanner};
use crate::tree::NodeTree;
use crate::watcher::{coalesce_event_paths, ChangeReport, ChangeReporter, WatchWorkerPool};

/// Entry point for anything that changed the tree's topology.
pub trait RebuildTrigger: Send + Sync {
    /// Returns true if a rebuild was scheduled, false if it was dropped.
    fn request_rebuild(&self, source: &str) -> bool;
}

struct RebuildState {
    planner: SegmentPlanner,
    pool: WatchWorkerPool,
}

pub struct RebuildCoordinator {
    this: Weak<RebuildCoordinator>,
    debounce: Duration,
    poll_timeout: Duration,
    last_rebuild: Mutex<Option<Instant>>,
    state: Mutex<RebuildState>,
    dispatched: Mutex<Option<JoinHandle<()>>>,
    pending_changes: Mutex<Vec<PathBuf>>,
    completed: AtomicUsize,
    shut_down: AtomicBool,
    #[cfg(test)]
    fail_next_rebuild: AtomicBool,
}

impl RebuildCoordinator {
    pub fn new(tree: Arc<NodeTree>, config: &IndexConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            debounce: config.rebuild_debounce(),
            poll_timeout: config.watch_poll_timeout(),
            last_rebuild: Mutex::new(None),
            state: Mutex::new(RebuildState {
                planner: SegmentPlanner::new(tree),
                pool: WatchWorkerPool::new(),
            }),
            dispatched: Mutex::new(None),
            pending_changes: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            #[cfg(test)]
            fail_next_rebuild: AtomicBool::new(false),
        })
    }

    /// Number of rebuild sequences that ran to completion.
    pub fn completed_rebuilds(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Drains the paths reported by workers since the last call, coalesced.
    pub fn take_changed_paths(&self) -> Vec<PathBuf> {
        let pending = std::mem::take(&mut *self.pending_changes.lock());
        coalesce_event_paths(pending)
    }

    pub fn segment_plan(&self) -> SegmentPlan {
        self.state.lock().planner.plan().clone()
    }

    pub fn active_workers(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Blocks until the most recently dispatched rebuild has finished.
    pub fn wait_for_rebuild(&self) {
        let handle = self.dispatched.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Refuses further requests, waits for a running rebuild and stops every
    /// worker.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.wait_for_rebuild();
        let mut state = self.state.lock();
        let abnormal = state.pool.stop_all();
        state.planner.reset();
        log::info!("rebuild coordinator shut down abnormal_exits={}", abnormal);
    }

    fn reporter(&self) -> ChangeReporter {
        let coordinator = self.this.clone();
        Arc::new(move |report: ChangeReport| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.record_change(report);
            }
        })
    }

    fn record_change(&self, report: ChangeReport) {
        log::debug!(
            "change reported segment={} paths={}",
            report.segment,
            report.paths.len()
        );
        self.pending_changes.lock().extend(report.paths);
        self.request_rebuild("watch event");
    }

    fn rebuild(&self, source: &str) {
        let started = Instant::now();
        let mut guard = self.state.lock();
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        let reporter = self.reporter();
        let poll_timeout = self.poll_timeout;
        let state = &mut *guard;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let abnormal = state.pool.stop_all();
            state.planner.reset();
            let plan = state.planner.recompute_plan();
            let workers = state.pool.start(plan, &reporter, poll_timeout);
            #[cfg(test)]
            self.fail_if_requested(workers);
            (plan.len(), workers, abnormal)
        }));

        match outcome {
            Ok((segments, workers, abnormal)) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                log::info!(
                    "rebuild finished source={} segments={} workers={} abnormal_exits={} elapsed_ms={}",
                    source,
                    segments,
                    workers,
                    abnormal,
                    started.elapsed().as_millis()
                );
            }
            Err(panic_info) => {
                log::error!(
                    "rebuild panicked source={}: {}",
                    source,
                    panic_message(panic_info.as_ref())
                );
                // Workers left over from a half-finished sequence stop on drop
                state.pool = WatchWorkerPool::new();
                state.planner.reset();
            }
        }
    }
}

#[cfg(test)]
impl RebuildCoordinator {
    fn fail_if_requested(&self, workers: usize) {
        if self.fail_next_rebuild.swap(false, Ordering::AcqRel) {
            panic!("rebuild failed after starting {workers} workers");
        }
    }
}

impl RebuildTrigger for RebuildCoordinator {
    fn request_rebuild(&self, source: &str) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut last = self.last_rebuild.lock();
            let now = Instant::now();
            if let Some(previous) = *last {
                let since = now.saturating_duration_since(previous);
                if since < self.debounce {
                    log::trace!(
                        "rebuild request dropped source={} since_last_ms={}",
                        source,
                        since.as_millis()
                    );
                    return false;
                }
            }
            *last = Some(now);
        }

        let Some(this) = self.this.upgrade() else {
            return false;
        };
        let owned_source = source.to_string();
        let spawned = thread::Builder::new()
            .name("livetree-rebuild".to_string())
            .spawn(move || this.rebuild(&owned_source));
        match spawned {
            Ok(handle) => {
                log::debug!("rebuild scheduled source={}", source);
                *self.dispatched.lock() = Some(handle);
                true
            }
            Err(err) => {
                log::error!("rebuild dispatch failed source={} error={}", source, err);
                false
            }
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(message) = panic_info.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic_info.downcast_ref::<String>() {
        message.clone()
    } else {
        "rebuild thread panicked".to_string()
    }
}
