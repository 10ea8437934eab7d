//! Bounded recursive scanning into the shared node tree.
//!
//! The walk follows the same shape as a full index walk:
//! - Entries are read with `symlink_metadata`, so links are never followed
//! - Children are sorted by name before they are linked into the parent
//! - Subdirectories are walked in parallel with rayon
//!
//! Scan status is derived bottom-up once a directory's children are known.

mod roots;
mod visibility;

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{IndexConfig, ScanDepth, Visibility};
use crate::error::{canonicalize_existing_path, IndexError, Result};
use crate::rebuild::RebuildTrigger;
use crate::tree::{Node, NodeId, NodeTree, ScanStatus};

pub use roots::volume_roots;

const INITIAL_SCAN: &str = "initial scan";
const DIR_LIST_SCAN: &str = "dir list scan";

/// Counts for one scanned root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub root: NodeId,
    pub directories: usize,
    pub files: usize,
    /// Entries that could not be read and were left out.
    pub skipped: usize,
}

/// Outcome of [`DirectoryScanner::scan_dir_list`].
#[derive(Debug, Default)]
pub struct ScanBatch {
    pub scanned: Vec<ScanSummary>,
    pub failed: Vec<(PathBuf, IndexError)>,
}

#[derive(Debug, Default)]
struct WalkCounters {
    directories: AtomicUsize,
    files: AtomicUsize,
    skipped: AtomicUsize,
}

pub struct DirectoryScanner {
    tree: Arc<NodeTree>,
    trigger: Arc<dyn RebuildTrigger>,
    depth: ScanDepth,
    visibility: Visibility,
}

impl DirectoryScanner {
    pub fn new(tree: Arc<NodeTree>, trigger: Arc<dyn RebuildTrigger>, config: &IndexConfig) -> Self {
        Self {
            tree,
            trigger,
            depth: config.scan_depth,
            visibility: config.visibility,
        }
    }

    /// Scans `path` to the configured depth and requests a watch rebuild.
    pub fn initial_scan(&self, path: impl AsRef<Path>) -> Result<ScanSummary> {
        self.scan_with_depth(path, self.depth)
    }

    /// Scans `path` to an explicit depth and requests a watch rebuild.
    pub fn scan_with_depth(&self, path: impl AsRef<Path>, depth: ScanDepth) -> Result<ScanSummary> {
        let started = Instant::now();
        let summary = self.scan_root(path.as_ref(), depth)?;
        log::info!(
            "scan finished root={} depth={} dirs={} files={} skipped={} elapsed_ms={}",
            path.as_ref().display(),
            depth,
            summary.directories,
            summary.files,
            summary.skipped,
            started.elapsed().as_millis()
        );
        self.trigger.request_rebuild(INITIAL_SCAN);
        Ok(summary)
    }

    /// Lists each root without descending below it.
    ///
    /// A root that fails does not stop the others. One rebuild is requested
    /// at the end if any root was scanned.
    pub fn scan_dir_list<I, P>(&self, roots: I) -> ScanBatch
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut batch = ScanBatch::default();
        for root in roots {
            let root = root.as_ref();
            match self.scan_root(root, ScanDepth::Limited(0)) {
                Ok(summary) => batch.scanned.push(summary),
                Err(err) => {
                    log::warn!("skipping scan root path={} error={}", root.display(), err);
                    batch.failed.push((root.to_path_buf(), err));
                }
            }
        }
        log::info!(
            "dir list scan finished scanned={} failed={}",
            batch.scanned.len(),
            batch.failed.len()
        );
        if !batch.scanned.is_empty() {
            self.trigger.request_rebuild(DIR_LIST_SCAN);
        }
        batch
    }

    fn scan_root(&self, path: &Path, depth: ScanDepth) -> Result<ScanSummary> {
        let path = canonicalize_existing_path(path.to_path_buf());
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Err(IndexError::InvalidPath(path)),
        }

        let node = Node::directory(path.clone(), None);
        let root = node.id;
        self.tree.upsert(node);

        let counters = WalkCounters::default();
        counters.directories.fetch_add(1, Ordering::Relaxed);
        self.walk_dir(&path, root, 0, depth, &counters);

        Ok(ScanSummary {
            root,
            directories: counters.directories.load(Ordering::Relaxed),
            files: counters.files.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
        })
    }

    /// Enumerates one directory already present in the tree and returns its
    /// derived scan status.
    fn walk_dir(
        &self,
        dir: &Path,
        id: NodeId,
        depth: u32,
        limit: ScanDepth,
        counters: &WalkCounters,
    ) -> ScanStatus {
        if limit.reached(depth) {
            // An earlier, deeper scan already expanded this directory
            if let Some(existing) = self.tree.get(id) {
                if !existing.children.is_empty() {
                    return existing.scan_status().unwrap_or(ScanStatus::NotScanned);
                }
            }
            let status = self.boundary_status(dir);
            self.tree.set_scan_status(id, status);
            return status;
        }

        // Pruned while the scan was running
        if !self.tree.contains(id) {
            return ScanStatus::NotScanned;
        }

        let read_dir = match fs::read_dir(dir) {
            Ok(iter) => iter,
            Err(source) => {
                self.skip(dir, source, counters);
                self.tree.set_scan_status(id, ScanStatus::NotScanned);
                return ScanStatus::NotScanned;
            }
        };

        let mut entries: Vec<(PathBuf, Metadata)> = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    self.skip(dir, source, counters);
                    continue;
                }
            };
            let path = entry.path();
            match fs::symlink_metadata(&path) {
                Ok(metadata) => {
                    if visibility::admits(self.visibility, &entry.file_name(), &metadata) {
                        entries.push((path, metadata));
                    }
                }
                Err(source) => self.skip(&path, source, counters),
            }
        }
        entries.sort_unstable_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

        let children: Vec<(NodeId, Option<ScanStatus>)> = entries
            .into_par_iter()
            .filter_map(|(path, metadata)| {
                if metadata.is_dir() {
                    let node = Node::directory(path.clone(), Some(id));
                    let child = node.id;
                    if !self.tree.upsert(node) {
                        return None;
                    }
                    counters.directories.fetch_add(1, Ordering::Relaxed);
                    let status = self.walk_dir(&path, child, depth + 1, limit, counters);
                    Some((child, Some(status)))
                } else {
                    // Regular files and symlinks
                    let node = Node::file(path, Some(id), metadata.len());
                    let child = node.id;
                    if !self.tree.upsert(node) {
                        return None;
                    }
                    counters.files.fetch_add(1, Ordering::Relaxed);
                    Some((child, None))
                }
            })
            .collect();

        let fully = children
            .iter()
            .all(|(_, status)| status.map_or(true, |s| s == ScanStatus::FullyScanned));
        let status = if fully {
            ScanStatus::FullyScanned
        } else {
            ScanStatus::PartialScan
        };
        self.tree
            .set_children(id, children.into_iter().map(|(child, _)| child).collect());
        self.tree.set_scan_status(id, status);
        status
    }

    /// Status of a directory at the depth limit: partial if any visible child
    /// directory holds at least one visible entry.
    fn boundary_status(&self, dir: &Path) -> ScanStatus {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return ScanStatus::NotScanned;
        };
        let deeper = read_dir.filter_map(|entry| entry.ok()).any(|entry| {
            let path = entry.path();
            match fs::symlink_metadata(&path) {
                Ok(metadata) if metadata.is_dir() => {
                    visibility::admits(self.visibility, &entry.file_name(), &metadata)
                        && self.has_visible_entry(&path)
                }
                _ => false,
            }
        });
        if deeper {
            ScanStatus::PartialScan
        } else {
            ScanStatus::FullyScanned
        }
    }

    fn has_visible_entry(&self, dir: &Path) -> bool {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return false;
        };
        read_dir.filter_map(|entry| entry.ok()).any(|entry| {
            fs::symlink_metadata(entry.path())
                .map(|metadata| visibility::admits(self.visibility, &entry.file_name(), &metadata))
                .unwrap_or(false)
        })
    }

    fn skip(&self, path: &Path, source: std::io::Error, counters: &WalkCounters) {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        let err = IndexError::EntryUnreadable {
            path: path.to_path_buf(),
            source,
        };
        log::debug!("skipping entry: {}", err);
    }
}
