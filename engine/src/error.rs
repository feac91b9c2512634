//! Error types for the transfer engine.
//!
//! `EngineError` covers failures that abort a task. Tolerated failures
//! (stat errors during size estimation, source deletion after a move) are
//! logged and swallowed at the call site and never surface here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the current task.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to read from a source file or directory
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// Failed to create a destination directory
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// HTTP request or body-read failure during a download
    #[error("Request failed for {url}: {source}")]
    Network {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to construct the HTTP client
    #[error("Failed to build HTTP client: {source}")]
    ClientBuild { source: reqwest::Error },

    /// Cooperative cancellation was requested.
    ///
    /// Displays the literal `Cancelled` so the `finished` event's error
    /// string is distinguishable from genuine failures.
    #[error("Cancelled")]
    Cancelled,
}

impl EngineError {
    /// Returns true if this error is the cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
