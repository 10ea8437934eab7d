//! A single segment's watch worker.
//!
//! The notify callback only forwards events through a crossbeam channel.
//! The worker thread is the sole consumer: it blocks for at most one poll
//! timeout, drains whatever is queued and reports once per cycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::paths::coalesce_event_paths;
use super::{ChangeReport, ChangeReporter};
use crate::error::{IndexError, Result};
use crate::segment::{Segment, SegmentId};

static NEXT_WORKER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
}

/// How a worker's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop flag was set before the event source closed.
    Stopped,
    /// The event source closed without a stop request.
    Abnormal,
}

pub struct WatchWorker {
    segment: SegmentId,
    registered: Vec<PathBuf>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<WorkerExit>>,
}

impl WatchWorker {
    /// Registers every directory of `segment` and starts the worker thread.
    ///
    /// Directories that fail to register are logged and left out; the
    /// worker still runs for the ones that did.
    pub fn spawn(
        segment: &Segment,
        reporter: ChangeReporter,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| {
            let _ = event_tx.send(event);
        })
        .map_err(|error| {
            IndexError::WatcherUnavailable(format!("segment {}: {error}", segment.id))
        })?;

        let mut registered = Vec::with_capacity(segment.len());
        for path in &segment.paths {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => registered.push(path.clone()),
                Err(source) => {
                    let err = IndexError::WatchRegistration {
                        path: path.clone(),
                        source,
                    };
                    log::warn!("watch registration failed segment={}: {}", segment.id, err);
                }
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let id = segment.id;
        let thread_stop = Arc::clone(&stop);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!(
                "livetree-watch-{}",
                NEXT_WORKER.fetch_add(1, Ordering::Relaxed)
            ))
            .spawn(move || {
                let exit = run(id, &event_rx, &reporter, &thread_stop, poll_timeout);
                thread_running.store(false, Ordering::Release);
                match exit {
                    WorkerExit::Stopped => log::info!("watch worker stopped segment={}", id),
                    WorkerExit::Abnormal => {
                        log::error!("watch worker terminated abnormally segment={}", id)
                    }
                }
                exit
            })?;

        log::info!(
            "watch worker started segment={} dirs={} registered={}",
            id,
            segment.len(),
            registered.len()
        );

        Ok(Self {
            segment: id,
            registered,
            stop,
            running,
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }

    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Directories that hold an active registration.
    pub fn registered(&self) -> &[PathBuf] {
        &self.registered
    }

    pub fn state(&self) -> WorkerState {
        if self.running.load(Ordering::Acquire) {
            WorkerState::Running
        } else {
            WorkerState::Stopped
        }
    }

    /// Sets the stop flag and closes the OS handle without waiting.
    pub fn signal_stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Dropping the watcher closes the channel and wakes a blocked worker
        self.watcher.take();
    }

    /// Waits for the worker thread to exit.
    pub fn join(&mut self) -> WorkerExit {
        match self.handle.take() {
            // A worker can end up dropping itself through its own reporter
            Some(handle) if handle.thread().id() == thread::current().id() => WorkerExit::Stopped,
            Some(handle) => handle.join().unwrap_or(WorkerExit::Abnormal),
            None => WorkerExit::Stopped,
        }
    }

    pub fn stop(&mut self) -> WorkerExit {
        self.signal_stop();
        self.join()
    }
}

impl Drop for WatchWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run(
    segment: SegmentId,
    events: &Receiver<notify::Result<Event>>,
    reporter: &ChangeReporter,
    stop: &AtomicBool,
    poll_timeout: Duration,
) -> WorkerExit {
    loop {
        if stop.load(Ordering::Acquire) {
            return WorkerExit::Stopped;
        }
        match events.recv_timeout(poll_timeout) {
            Ok(first) => {
                let mut paths = Vec::new();
                let mut changed = collect(segment, first, &mut paths);
                for event in events.try_iter() {
                    changed |= collect(segment, event, &mut paths);
                }
                if changed && !stop.load(Ordering::Acquire) {
                    reporter(ChangeReport {
                        segment,
                        paths: coalesce_event_paths(paths),
                    });
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return if stop.load(Ordering::Acquire) {
                    WorkerExit::Stopped
                } else {
                    WorkerExit::Abnormal
                };
            }
        }
    }
}

/// Folds one event into `paths`; returns true if it counts as a change.
fn collect(segment: SegmentId, event: notify::Result<Event>, paths: &mut Vec<PathBuf>) -> bool {
    match event {
        Ok(event) if matches!(event.kind, EventKind::Access(_)) => false,
        Ok(event) => {
            paths.extend(event.paths);
            true
        }
        Err(error) => {
            log::warn!("watch event error segment={}: {}", segment, error);
            false
        }
    }
}
