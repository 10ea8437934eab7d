//! Node types for indexed file system entries.
//!
//! Directory- and file-specific fields are carried by the kind-discriminated
//! [`NodeKind`] so mixed child sets can be iterated without downcasting.

use std::fmt;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use fnv::FnvHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable node identifier derived from the absolute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Hashes the lossy string form of `path` with FNV-1a.
    pub fn for_path(path: &Path) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(path.to_string_lossy().as_bytes());
        Self(hasher.finish())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        u64::from_str_radix(&text, 16)
            .map(NodeId)
            .map_err(serde::de::Error::custom)
    }
}

/// Completeness marker of a directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    NotScanned,
    PartialScan,
    FullyScanned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    #[serde(rename_all = "camelCase")]
    Directory { scan_status: ScanStatus },
    #[serde(rename_all = "camelCase")]
    File {
        size: u64,
        /// Extension without the leading dot, empty when there is none.
        file_type: String,
    },
}

/// One indexed file system entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    /// Entry name; files have their extension stripped.
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "parentId")]
    pub parent: Option<NodeId>,
    /// Ordered child ids, empty for files and for directories not yet expanded.
    #[serde(rename = "childIds")]
    pub children: Vec<NodeId>,
    pub popularity: u32,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// Creates a directory node that has not been scanned yet.
    pub fn directory(path: PathBuf, parent: Option<NodeId>) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            // Roots like "/" or "C:\" have no file name
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id: NodeId::for_path(&path),
            name,
            path,
            parent,
            children: Vec::new(),
            popularity: 0,
            kind: NodeKind::Directory {
                scan_status: ScanStatus::NotScanned,
            },
        }
    }

    /// Creates a file node.
    pub fn file(path: PathBuf, parent: Option<NodeId>, size: u64) -> Self {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: NodeId::for_path(&path),
            name,
            path,
            parent,
            children: Vec::new(),
            popularity: 0,
            kind: NodeKind::File { size, file_type },
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns the scan status, or `None` for files.
    pub fn scan_status(&self) -> Option<ScanStatus> {
        match self.kind {
            NodeKind::Directory { scan_status } => Some(scan_status),
            NodeKind::File { .. } => None,
        }
    }

    pub(crate) fn set_scan_status(&mut self, status: ScanStatus) {
        if let NodeKind::Directory { scan_status } = &mut self.kind {
            *scan_status = status;
        }
    }
}
