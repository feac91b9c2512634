//! Core data model for transfer and download tasks.
//!
//! This module defines the request types handed to the manager and the
//! enumeration output produced by a running task:
//! - TransferRequest: a local copy-or-move operation
//! - DownloadRequest: a remote-fetch operation
//! - Mode, FileEntry: supporting types

use std::path::PathBuf;

use crate::conflict::ConflictHandler;

/// Describes one local copy-or-move operation.
///
/// A request is immutable once the task executing it has started; the worker
/// thread reads it through a shared reference for the task's whole lifetime.
pub struct TransferRequest {
    /// Ordered list of absolute source paths
    pub sources: Vec<PathBuf>,

    /// Absolute destination directory
    pub destination: PathBuf,

    /// Operation mode: Copy or Move
    pub mode: Mode,

    /// Optional callback invoked when a destination path already exists
    pub conflict_handler: Option<ConflictHandler>,
}

impl TransferRequest {
    pub fn new(sources: Vec<PathBuf>, destination: PathBuf, mode: Mode) -> Self {
        TransferRequest {
            sources,
            destination,
            mode,
            conflict_handler: None,
        }
    }

    pub fn with_conflict_handler(mut self, handler: ConflictHandler) -> Self {
        self.conflict_handler = Some(handler);
        self
    }
}

/// Describes one remote-fetch operation over a list of URLs.
pub struct DownloadRequest {
    /// Ordered list of URLs, fetched sequentially
    pub urls: Vec<String>,

    /// Absolute destination directory
    pub destination: PathBuf,

    /// Optional conflict callback; the second argument it receives is the
    /// temp-file hint rather than a true source path
    pub conflict_handler: Option<ConflictHandler>,
}

impl DownloadRequest {
    pub fn new(urls: Vec<String>, destination: PathBuf) -> Self {
        DownloadRequest {
            urls,
            destination,
            conflict_handler: None,
        }
    }

    pub fn with_conflict_handler(mut self, handler: ConflictHandler) -> Self {
        self.conflict_handler = Some(handler);
        self
    }
}

/// The operation mode for a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Copy files; source remains unchanged
    Copy,
    /// Move files; source deleted after a successful copy
    Move,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Move => write!(f, "Move"),
        }
    }
}

/// A top-level (source, destination) pair produced by enumeration.
///
/// Directories are walked recursively during execution; files are leaves.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Full source path
    pub source: PathBuf,

    /// Intended destination path (same basename under the destination dir)
    pub destination: PathBuf,

    /// True if this entry is a directory
    pub is_dir: bool,
}
