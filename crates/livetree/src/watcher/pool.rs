use std::time::Duration;

use fnv::FnvHashMap;

use super::worker::{WatchWorker, WorkerExit};
use super::ChangeReporter;
use crate::segment::{SegmentId, SegmentPlan};

/// Live workers keyed by the segment they watch.
#[derive(Default)]
pub struct WatchWorkerPool {
    workers: FnvHashMap<SegmentId, WatchWorker>,
}

impl WatchWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts one worker per segment in `plan` and returns how many started.
    pub fn start(
        &mut self,
        plan: &SegmentPlan,
        reporter: &ChangeReporter,
        poll_timeout: Duration,
    ) -> usize {
        let mut started = 0;
        for segment in plan.segments() {
            match WatchWorker::spawn(segment, reporter.clone(), poll_timeout) {
                Ok(worker) => {
                    if let Some(mut previous) = self.workers.insert(segment.id, worker) {
                        previous.stop();
                    }
                    started += 1;
                }
                Err(err) => {
                    log::warn!(
                        "watch worker failed to start segment={} error={}",
                        segment.id,
                        err
                    );
                }
            }
        }
        started
    }

    /// Signals every worker, waits for all of them and empties the pool.
    ///
    /// Returns the number of workers that exited abnormally.
    pub fn stop_all(&mut self) -> usize {
        for worker in self.workers.values_mut() {
            worker.signal_stop();
        }
        self.workers
            .drain()
            .map(|(_, mut worker)| worker.join())
            .filter(|exit| *exit == WorkerExit::Abnormal)
            .count()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, id: SegmentId) -> Option<&WatchWorker> {
        self.workers.get(&id)
    }

    /// Segment ids with a live worker, sorted.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::plan_segments;
    use crate::tree::{Node, NodeTree};
    use crate::watcher::{ChangeReport, WorkerState};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn starts_one_worker_per_segment_and_stops_all() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::create_dir(root.join("b")).unwrap();

        let tree = NodeTree::new();
        let root_node = Node::directory(root.clone(), None);
        let root_id = root_node.id;
        tree.upsert(root_node);
        let a = Node::directory(root.join("a"), Some(root_id));
        let b = Node::directory(root.join("b"), Some(root_id));
        let children = vec![a.id, b.id];
        tree.upsert(a);
        tree.upsert(b);
        tree.set_children(root_id, children);

        let plan = plan_segments(&tree.snapshot());
        let reporter: ChangeReporter = Arc::new(|_report: ChangeReport| {});
        let mut pool = WatchWorkerPool::new();

        assert_eq!(pool.start(&plan, &reporter, Duration::from_millis(50)), 3);
        assert_eq!(pool.len(), 3);
        for id in pool.segment_ids() {
            assert!(plan.get(id).is_some());
            assert_eq!(pool.get(id).unwrap().state(), WorkerState::Running);
        }

        assert_eq!(pool.stop_all(), 0);
        assert!(pool.is_empty());
    }
}
