use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dor_slot::EntryKind;
use dor_types::ContentHash;

/// A directory in a file tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryNode {
    pub path: PathBuf,
    pub label: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

/// A file in a file tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNode {
    pub path: PathBuf,
    pub size: u64,
    /// Content hash from the sidecar; `None` when no record exists.
    pub hash: Option<ContentHash>,
    pub label: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

/// A tree entry: a closed union matched exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    /// Path relative to the tree root (empty for the root).
    pub fn path(&self) -> &Path {
        match self {
            Node::Directory(d) => &d.path,
            Node::File(f) => &f.path,
        }
    }

    /// Last path component, or `""` for the root.
    pub fn name(&self) -> &str {
        self.path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Node::Directory(_) => EntryKind::Directory,
            Node::File(_) => EntryKind::File,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Node::Directory(d) => d.label.as_deref(),
            Node::File(f) => f.label.as_deref(),
        }
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Directory(d) => d.modified,
            Node::File(f) => f.modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(f) => Some(f),
            Node::Directory(_) => None,
        }
    }
}
