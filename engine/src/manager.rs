//! Task registry.
//!
//! The manager constructs tasks, starts them, and keeps a collection of the
//! ones still running. A task deregisters itself when its terminal event
//! fires; removal is idempotent.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use uuid::Uuid;

use crate::download::DownloadTask;
use crate::events::TransferObserver;
use crate::model::{DownloadRequest, TransferRequest};
use crate::task::TransferTask;

/// Uniform control surface over running transfer and download tasks.
pub trait TaskControl: Send + Sync {
    fn id(&self) -> Uuid;
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

impl TaskControl for TransferTask {
    fn id(&self) -> Uuid {
        TransferTask::id(self)
    }
    fn cancel(&self) {
        TransferTask::cancel(self)
    }
    fn is_cancelled(&self) -> bool {
        TransferTask::is_cancelled(self)
    }
}

impl TaskControl for DownloadTask {
    fn id(&self) -> Uuid {
        DownloadTask::id(self)
    }
    fn cancel(&self) {
        DownloadTask::cancel(self)
    }
    fn is_cancelled(&self) -> bool {
        DownloadTask::is_cancelled(self)
    }
}

/// Registry of currently active tasks.
pub struct TransferManager {
    tasks: Mutex<Vec<Arc<dyn TaskControl>>>,
}

impl TransferManager {
    pub fn new() -> Arc<Self> {
        Arc::new(TransferManager {
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Construct, register, and start a copy-or-move task.
    pub fn start_transfer(
        self: &Arc<Self>,
        request: TransferRequest,
        observer: Arc<dyn TransferObserver>,
    ) -> Arc<TransferTask> {
        let id = Uuid::new_v4();
        let observer = Arc::new(DeregisterObserver {
            manager: Arc::downgrade(self),
            id,
            inner: observer,
        });
        let task = TransferTask::with_id(id, request, observer);
        self.register(task.clone());
        task.start();
        task
    }

    /// Construct, register, and start a download task.
    pub fn start_download(
        self: &Arc<Self>,
        request: DownloadRequest,
        observer: Arc<dyn TransferObserver>,
    ) -> Arc<DownloadTask> {
        let id = Uuid::new_v4();
        let observer = Arc::new(DeregisterObserver {
            manager: Arc::downgrade(self),
            id,
            inner: observer,
        });
        let task = DownloadTask::with_id(id, request, observer);
        self.register(task.clone());
        task.start();
        task
    }

    /// Snapshot of the currently active tasks, not a live view.
    pub fn active_tasks(&self) -> Vec<Arc<dyn TaskControl>> {
        self.lock_tasks().clone()
    }

    fn register(&self, task: Arc<dyn TaskControl>) {
        self.lock_tasks().push(task);
    }

    /// Remove a task from the registry. Removing an already-removed task is
    /// a no-op.
    fn remove(&self, id: Uuid) {
        self.lock_tasks().retain(|task| task.id() != id);
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn TaskControl>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer wrapper that deregisters the task on its terminal event before
/// forwarding it.
struct DeregisterObserver {
    manager: Weak<TransferManager>,
    id: Uuid,
    inner: Arc<dyn TransferObserver>,
}

impl TransferObserver for DeregisterObserver {
    fn on_progress(&self, done: u64, total: u64) {
        self.inner.on_progress(done, total);
    }

    fn on_file_progress(&self, path: &std::path::Path) {
        self.inner.on_file_progress(path);
    }

    fn on_finished(&self, success: bool, error: &str) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove(self.id);
        }
        self.inner.on_finished(success, error);
    }
}
