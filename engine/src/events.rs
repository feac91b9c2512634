//! Progress and completion events.
//!
//! Tasks report through the `TransferObserver` trait, which decouples the
//! engine from any specific consumer (CLI, GUI, tests). `ChannelObserver`
//! forwards events over a crossbeam channel so they can cross from the
//! worker thread to a consumer thread without sharing state.
//!
//! `ProgressTracker` owns a task's private byte counters and the emission
//! throttle. Progress events fire after each chunk write but at most once
//! per 200 ms, except that the emission after a file's final chunk is never
//! suppressed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Minimum wall-clock interval between throttled progress emissions.
pub const EMIT_INTERVAL: Duration = Duration::from_millis(200);

/// An event emitted by a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Byte counters: `done` is monotonically non-decreasing, `total` is the
    /// fixed pre-transfer estimate (>= 1)
    Progress { done: u64, total: u64 },

    /// A file finished and now exists at its final destination path
    FileProgress { path: PathBuf },

    /// Terminal event, emitted exactly once per task. On cancellation
    /// `error` is the literal "Cancelled".
    Finished { success: bool, error: String },
}

/// Trait for receiving events from a running task.
///
/// All methods are called from the task's worker thread. Implementations
/// must hand the data off to the consumer thread themselves (or use
/// `ChannelObserver`, which does the queued crossing for them).
pub trait TransferObserver: Send + Sync {
    /// Called after chunk writes, throttled; also called once before the
    /// first entry with `done == 0`.
    fn on_progress(&self, done: u64, total: u64);

    /// Called once per completed file with its final destination path.
    fn on_file_progress(&self, path: &Path);

    /// Called exactly once when the task reaches a terminal state.
    fn on_finished(&self, success: bool, error: &str);
}

/// A `TransferObserver` that sends events over a channel.
pub struct ChannelObserver {
    sender: Sender<TransferEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<TransferEvent>) -> Self {
        ChannelObserver { sender }
    }

    /// Create an observer together with the receiving end of its channel.
    pub fn channel() -> (Self, Receiver<TransferEvent>) {
        let (tx, rx) = unbounded();
        (ChannelObserver { sender: tx }, rx)
    }
}

impl TransferObserver for ChannelObserver {
    fn on_progress(&self, done: u64, total: u64) {
        let _ = self.sender.send(TransferEvent::Progress { done, total });
    }

    fn on_file_progress(&self, path: &Path) {
        let _ = self.sender.send(TransferEvent::FileProgress {
            path: path.to_path_buf(),
        });
    }

    fn on_finished(&self, success: bool, error: &str) {
        let _ = self.sender.send(TransferEvent::Finished {
            success,
            error: error.to_string(),
        });
    }
}

/// Task-private progress state: done/total counters plus the throttle.
///
/// `total` is fixed via `set_total` before the first emission and never
/// recomputed mid-transfer; it is floored at 1 to avoid division errors in
/// consumers.
pub(crate) struct ProgressTracker {
    observer: Arc<dyn TransferObserver>,
    done: u64,
    total: u64,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressTracker {
    pub(crate) fn new(observer: Arc<dyn TransferObserver>) -> Self {
        ProgressTracker {
            observer,
            done: 0,
            total: 1,
            interval: EMIT_INTERVAL,
            last_emit: None,
        }
    }

    #[cfg(test)]
    fn with_interval(observer: Arc<dyn TransferObserver>, interval: Duration) -> Self {
        ProgressTracker {
            observer,
            done: 0,
            total: 1,
            interval,
            last_emit: None,
        }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total.max(1);
    }

    /// Emit the initial `progress(0, total)` event.
    pub(crate) fn begin(&mut self) {
        self.emit_now();
    }

    /// Record a chunk write and emit if the throttle interval has elapsed.
    pub(crate) fn add(&mut self, bytes: u64) {
        self.done += bytes;
        let due = self
            .last_emit
            .map_or(true, |at| at.elapsed() >= self.interval);
        if due {
            self.emit_now();
        }
    }

    /// Emit unconditionally; used after a file's final chunk.
    pub(crate) fn flush(&mut self) {
        self.emit_now();
    }

    pub(crate) fn file_done(&mut self, path: &Path) {
        self.observer.on_file_progress(path);
    }

    fn emit_now(&mut self) {
        self.last_emit = Some(Instant::now());
        self.observer.on_progress(self.done, self.total);
    }
}
