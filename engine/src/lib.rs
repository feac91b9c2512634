//! # Ferry Engine - Asynchronous file-transfer library
//!
//! A headless engine for copying, moving, and downloading files and
//! directory trees in the background while reporting progress, resolving
//! name conflicts interactively, and supporting cooperative cancellation.
//!
//! ## Overview
//!
//! Each task runs on its own dedicated worker thread and reports through a
//! thread-safe observer. The engine features:
//! - Recursive directory merge with per-entry conflict resolution
//! - Chunked streaming through temp files with atomic finalize, so no file
//!   is ever left truncated under its final name
//! - A blocking cross-thread conflict rendezvous for interactive consumers
//! - Throttled progress events and a single terminal `finished` event
//! - Sequential HTTP downloads reusing the same conflict protocol
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ferry_engine::{
//!     ChannelObserver, Mode, TransferEvent, TransferManager, TransferRequest,
//! };
//!
//! # fn main() {
//! let manager = TransferManager::new();
//! let (observer, events) = ChannelObserver::channel();
//!
//! manager.start_transfer(
//!     TransferRequest::new(
//!         vec!["/tmp/src/a.txt".into()],
//!         "/tmp/dst".into(),
//!         Mode::Copy,
//!     ),
//!     Arc::new(observer),
//! );
//!
//! for event in events {
//!     match event {
//!         TransferEvent::Progress { done, total } => {
//!             println!("{}/{} bytes", done, total);
//!         }
//!         TransferEvent::FileProgress { path } => {
//!             println!("finished {}", path.display());
//!         }
//!         TransferEvent::Finished { success, error } => {
//!             println!("done: success={} error={:?}", success, error);
//!             break;
//!         }
//!     }
//! }
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: request types and enumeration entries
//! - **error**: the task-aborting error taxonomy
//! - **events**: observer trait, channel observer, progress throttling
//! - **conflict**: decisions, rename suggestion, blocking rendezvous
//! - **task**: local copy/move execution
//! - **download**: sequential HTTP downloads
//! - **manager**: registry of active tasks

pub mod conflict;
pub mod download;
pub mod error;
pub mod events;
pub mod manager;
pub mod model;
pub mod task;

pub use conflict::{
    conflict_channel, suggest_rename, ConflictDecision, ConflictHandler, ConflictRequest,
};
pub use download::DownloadTask;
pub use error::EngineError;
pub use events::{ChannelObserver, TransferEvent, TransferObserver};
pub use manager::{TaskControl, TransferManager};
pub use model::{DownloadRequest, FileEntry, Mode, TransferRequest};
pub use task::{TransferTask, CHUNK_SIZE};
