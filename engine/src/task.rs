//! Transfer task execution.
//!
//! A `TransferTask` executes one copy-or-move operation over a set of source
//! paths into a destination directory, on its own dedicated worker thread:
//! - Enumerate the top-level sources that still exist
//! - Estimate the total byte count once, before the first progress event
//! - Process each entry, resolving conflicts as destinations are found to
//!   already exist
//! - Stream files in fixed-size chunks through a `.part` temp file that is
//!   atomically renamed onto the final name, so no file is ever left
//!   truncated under its final name
//!
//! Cancellation is cooperative: the flag is checked at the start of each
//! top-level entry, each nested directory entry, and each chunk read. A task
//! cannot be cancelled mid-chunk-write.

use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use uuid::Uuid;
use walkdir::WalkDir;

use crate::conflict::ConflictContext;
use crate::error::EngineError;
use crate::events::{ProgressTracker, TransferObserver};
use crate::model::{FileEntry, Mode, TransferRequest};

/// Fixed unit of data read/written per I/O step (512 KiB).
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Suffix appended to a destination name while its data is in flight.
pub(crate) const PART_SUFFIX: &str = ".part";

/// One asynchronous copy-or-move operation.
pub struct TransferTask {
    id: Uuid,
    request: TransferRequest,
    observer: Arc<dyn TransferObserver>,
    cancelled: AtomicBool,
    started: AtomicBool,
}

impl TransferTask {
    pub fn new(request: TransferRequest, observer: Arc<dyn TransferObserver>) -> Arc<Self> {
        Self::with_id(Uuid::new_v4(), request, observer)
    }

    pub(crate) fn with_id(
        id: Uuid,
        request: TransferRequest,
        observer: Arc<dyn TransferObserver>,
    ) -> Arc<Self> {
        Arc::new(TransferTask {
            id,
            request,
            observer,
            cancelled: AtomicBool::new(false),
            started: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Spawn the worker thread. Calling more than once is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = Arc::clone(self);
        thread::spawn(move || task.run());
    }

    /// Request cooperative cancellation. Idempotent; safe to call at any
    /// time, including after completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(self: Arc<Self>) {
        tracing::debug!(task = %self.id, mode = %self.request.mode, "transfer task started");
        let mut worker = TransferWorker::new(&self);
        match worker.execute() {
            Ok(()) => {
                tracing::debug!(task = %self.id, "transfer task finished");
                self.observer.on_finished(true, "");
            }
            Err(e) => {
                // EngineError::Cancelled displays the literal "Cancelled",
                // which consumers branch on.
                let message = e.to_string();
                tracing::debug!(task = %self.id, error = %message, "transfer task failed");
                self.observer.on_finished(false, &message);
            }
        }
    }
}

struct TransferWorker<'a> {
    task: &'a TransferTask,
    progress: ProgressTracker,
    conflicts: ConflictContext<'a>,
}

impl<'a> TransferWorker<'a> {
    fn new(task: &'a TransferTask) -> Self {
        TransferWorker {
            task,
            progress: ProgressTracker::new(Arc::clone(&task.observer)),
            conflicts: ConflictContext::new(
                task.request.conflict_handler.clone(),
                &task.cancelled,
            ),
        }
    }

    fn execute(&mut self) -> Result<(), EngineError> {
        let entries = self.enumerate();
        self.progress.set_total(estimate_total(&entries));
        self.progress.begin();

        for entry in &entries {
            self.check_cancelled()?;

            // The top-level conflict is resolved exactly once; recursion
            // below never re-queries for this path.
            let Some(target) = self.conflicts.resolve(&entry.destination, &entry.source)? else {
                continue;
            };

            if entry.is_dir {
                self.copy_dir(&entry.source, &target, true)?;
            } else {
                self.stream_copy(&entry.source, &target)?;
            }

            if self.task.request.mode == Mode::Move {
                remove_source(&entry.source);
            }
        }
        Ok(())
    }

    /// Pair each top-level source that still exists with its intended
    /// destination path.
    fn enumerate(&self) -> Vec<FileEntry> {
        let mut entries = Vec::new();
        for source in &self.task.request.sources {
            let Ok(metadata) = fs::metadata(source) else {
                continue;
            };
            let Some(name) = source.file_name() else {
                tracing::warn!(path = %source.display(), "source has no basename, skipping");
                continue;
            };
            entries.push(FileEntry {
                source: source.clone(),
                destination: self.task.request.destination.join(name),
                is_dir: metadata.is_dir(),
            });
        }
        entries
    }

    /// Recursively merge a directory into `dest`.
    ///
    /// The root conflict is assumed already resolved when `is_root` is true.
    /// Every nested entry whose destination exists independently re-enters
    /// conflict resolution, unless overwrite apply-all is already active.
    fn copy_dir(&mut self, src: &Path, dest: &Path, is_root: bool) -> Result<(), EngineError> {
        let mut dest = dest.to_path_buf();
        if !is_root && dest.exists() {
            match self.conflicts.resolve(&dest, src)? {
                Some(target) => dest = target,
                None => return Ok(()), // skip this subtree
            }
        }

        fs::create_dir_all(&dest).map_err(|e| EngineError::CreateDir {
            path: dest.clone(),
            source: e,
        })?;

        // Enumeration errors reduce coverage but never abort the task.
        let children = match fs::read_dir(src) {
            Ok(iter) => iter.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(path = %src.display(), error = %e, "failed to list directory");
                Vec::new()
            }
        };

        for child in children {
            self.check_cancelled()?;
            let target = dest.join(child.file_name());
            let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                self.copy_dir(&child.path(), &target, false)?;
            } else {
                self.copy_file(&child.path(), &target)?;
            }
        }
        Ok(())
    }

    /// Copy a nested file, resolving a conflict first if `dest` exists.
    fn copy_file(&mut self, src: &Path, dest: &Path) -> Result<(), EngineError> {
        let Some(target) = self.conflicts.resolve(dest, src)? else {
            return Ok(());
        };
        self.stream_copy(src, &target)
    }

    /// Stream `src` into `dest` through a `.part` temp file.
    ///
    /// On any failure or cancellation mid-copy the temp file is deleted
    /// before the error propagates.
    fn stream_copy(&mut self, src: &Path, dest: &Path) -> Result<(), EngineError> {
        let temp = part_path(dest);
        let result = self.stream_copy_inner(src, dest, &temp);
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    fn stream_copy_inner(
        &mut self,
        src: &Path,
        dest: &Path,
        temp: &Path,
    ) -> Result<(), EngineError> {
        let mut reader = fs::File::open(src).map_err(|e| EngineError::Read {
            path: src.to_path_buf(),
            source: e,
        })?;
        let mut writer = fs::File::create(temp).map_err(|e| EngineError::Write {
            path: temp.to_path_buf(),
            source: e,
        })?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            self.check_cancelled()?;
            let n = reader.read(&mut buf).map_err(|e| EngineError::Read {
                path: src.to_path_buf(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).map_err(|e| EngineError::Write {
                path: temp.to_path_buf(),
                source: e,
            })?;
            self.progress.add(n as u64);
        }
        drop(writer);

        copy_metadata(src, temp);

        fs::rename(temp, dest).map_err(|e| EngineError::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;

        // The emission after a file's final chunk bypasses the throttle.
        self.progress.flush();
        self.progress.file_done(dest);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.task.cancelled.load(Ordering::SeqCst) {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sum file sizes for the fixed pre-transfer estimate.
///
/// Directories are walked recursively; symlinks are not followed. Stat
/// failures reduce the estimate's accuracy but never abort the task.
pub(crate) fn estimate_total(entries: &[FileEntry]) -> u64 {
    let mut total: u64 = 0;
    for entry in entries {
        if entry.is_dir {
            for item in WalkDir::new(&entry.source)
                .into_iter()
                .filter_map(Result::ok)
            {
                if item.file_type().is_file() {
                    if let Ok(metadata) = item.metadata() {
                        total += metadata.len();
                    }
                }
            }
        } else if let Ok(metadata) = fs::metadata(&entry.source) {
            total += metadata.len();
        }
    }
    total
}

/// Destination path with the in-flight suffix appended to its file name.
///
/// `dest` must have a final component; enumeration guarantees this for every
/// destination the workers produce.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    debug_assert!(dest.file_name().is_some(), "destination must name a file");
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// Best-effort metadata preservation: mtime and permissions.
pub(crate) fn copy_metadata(src: &Path, dest: &Path) {
    let Ok(metadata) = fs::metadata(src) else {
        return;
    };
    if let Ok(mtime) = metadata.modified() {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }
    let _ = fs::set_permissions(dest, metadata.permissions());
}

/// Delete the original source after a successful move-copy.
///
/// Failure here is tolerated silently at the task level; the copy still
/// counts as success.
fn remove_source(source: &Path) {
    let Ok(metadata) = fs::metadata(source) else {
        return;
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(source)
    } else {
        fs::remove_file(source)
    };
    if let Err(e) = result {
        tracing::warn!(path = %source.display(), error = %e, "failed to remove source after move");
    }
}
