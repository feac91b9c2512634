//! Conflict decisions, rename suggestion, and the cross-thread rendezvous.
//!
//! A conflict is a destination path that already exists at the moment a task
//! would write to it. Whenever that happens (and the task-wide overwrite
//! apply-all flag is not set), the task synchronously invokes the supplied
//! handler with (existing destination path, source path) and blocks its
//! worker thread until a `ConflictDecision` comes back.
//!
//! `conflict_channel` packages that blocking call as a request/response
//! channel pair for consumers that make decisions on another thread (for
//! example an interactive UI). The wait is unbounded by design: if the
//! decision-maker never responds, the worker blocks forever, and callers
//! must layer their own timeout policy on top. A dropped receiver degrades
//! to the default Rename decision instead of wedging the worker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::EngineError;

/// A decision for one conflicting entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Proceed at the original path, replacing whatever exists there.
    /// With `apply_all` set, every later conflict in the same task
    /// auto-resolves to Overwrite without invoking the handler again.
    Overwrite { apply_all: bool },

    /// Proceed at `new_path` if supplied, else at a fresh suggestion for
    /// the original path. A supplied target is re-validated against the
    /// live filesystem at decision time, never reused blindly.
    Rename { new_path: Option<PathBuf> },

    /// Abandon this entry (and, for a directory, its entire subtree).
    Skip,

    /// Set the task's cancellation flag and unwind immediately.
    Cancel,
}

/// Callback invoked with (existing destination path, source path).
pub type ConflictHandler = Arc<dyn Fn(&Path, &Path) -> ConflictDecision + Send + Sync>;

/// Suggest a non-existing sibling name for `path`.
///
/// Candidates are `stem (2)suffix`, `stem (3)suffix`, and so on; numbering starts
/// at 2, so the first copy of `report.txt` becomes `report (2).txt`. The
/// first candidate that does not exist on the filesystem at call time is
/// returned.
pub fn suggest_rename(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n: u32 = 2;
    loop {
        let candidate = parent.join(format!("{} ({}){}", stem, n, suffix));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// A conflict waiting for a decision, delivered over `conflict_channel`.
///
/// Dropping a request without responding releases the worker with the
/// default Rename decision.
pub struct ConflictRequest {
    /// The destination path that already exists
    pub existing: PathBuf,

    /// The source path (or temp-file hint for downloads)
    pub source: PathBuf,

    reply: Sender<ConflictDecision>,
}

impl ConflictRequest {
    /// Send the decision back to the blocked worker thread.
    pub fn respond(self, decision: ConflictDecision) {
        let _ = self.reply.send(decision);
    }
}

/// Create a conflict handler whose decisions are made on another thread.
///
/// The returned handler marshals each conflict to the `Receiver` side and
/// blocks, with no timeout, until `ConflictRequest::respond` is called.
pub fn conflict_channel() -> (ConflictHandler, Receiver<ConflictRequest>) {
    let (tx, rx) = unbounded::<ConflictRequest>();
    let handler: ConflictHandler = Arc::new(move |existing: &Path, source: &Path| {
        let (reply_tx, reply_rx) = bounded(1);
        let request = ConflictRequest {
            existing: existing.to_path_buf(),
            source: source.to_path_buf(),
            reply: reply_tx,
        };
        if tx.send(request).is_err() {
            // Decision-maker is gone; fall back to the default decision.
            return ConflictDecision::Rename { new_path: None };
        }
        reply_rx
            .recv()
            .unwrap_or(ConflictDecision::Rename { new_path: None })
    });
    (handler, rx)
}

/// Task-private conflict state: the handler plus the apply-all flag.
///
/// The apply-all flag is scoped to one task and never shared across tasks.
pub(crate) struct ConflictContext<'a> {
    handler: Option<ConflictHandler>,
    cancelled: &'a AtomicBool,
    apply_all_overwrite: bool,
}

impl<'a> ConflictContext<'a> {
    pub(crate) fn new(handler: Option<ConflictHandler>, cancelled: &'a AtomicBool) -> Self {
        ConflictContext {
            handler,
            cancelled,
            apply_all_overwrite: false,
        }
    }

    /// Resolve a potential conflict for `existing` (the intended destination).
    ///
    /// Returns `Ok(Some(path))` to proceed at `path`, `Ok(None)` to skip the
    /// entry, or `Err(Cancelled)` after setting the task's cancellation flag.
    /// When no handler was supplied the default decision is Rename.
    pub(crate) fn resolve(
        &mut self,
        existing: &Path,
        source: &Path,
    ) -> Result<Option<PathBuf>, EngineError> {
        if !existing.exists() {
            return Ok(Some(existing.to_path_buf()));
        }
        if self.apply_all_overwrite {
            return Ok(Some(existing.to_path_buf()));
        }

        let decision = match &self.handler {
            Some(handler) => handler(existing, source),
            None => ConflictDecision::Rename { new_path: None },
        };

        match decision {
            ConflictDecision::Overwrite { apply_all } => {
                if apply_all {
                    self.apply_all_overwrite = true;
                }
                Ok(Some(existing.to_path_buf()))
            }
            ConflictDecision::Rename { new_path } => {
                let target = match new_path {
                    Some(path) if !path.exists() => path,
                    Some(path) => suggest_rename(&path),
                    None => suggest_rename(existing),
                };
                Ok(Some(target))
            }
            ConflictDecision::Skip => Ok(None),
            ConflictDecision::Cancel => {
                self.cancelled.store(true, Ordering::SeqCst);
                Err(EngineError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;

    #[test]
    fn test_suggest_rename_starts_at_two() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let original = temp_dir.path().join("report.txt");
        fs::write(&original, b"data").expect("Failed to write file");

        // Numbering deliberately begins at 2, not 1.
        let suggested = suggest_rename(&original);
        assert_eq!(suggested, temp_dir.path().join("report (2).txt"));
        assert!(!suggested.exists());
    }

    #[test]
    fn test_suggest_rename_sequential_reservation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let original = temp_dir.path().join("report.txt");
        fs::write(&original, b"data").expect("Failed to write file");

        let first = suggest_rename(&original);
        fs::write(&first, b"copy").expect("Failed to reserve first suggestion");

        let second = suggest_rename(&original);
        assert_ne!(first, second);
        assert!(!second.exists());
        assert_eq!(second, temp_dir.path().join("report (3).txt"));
    }

    #[test]
    fn test_suggest_rename_without_extension() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let original = temp_dir.path().join("notes");
        fs::write(&original, b"data").expect("Failed to write file");

        let suggested = suggest_rename(&original);
        assert_eq!(suggested, temp_dir.path().join("notes (2)"));
    }

    #[test]
    fn test_resolve_passes_through_when_no_conflict() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("fresh.txt");
        let cancelled = AtomicBool::new(false);
        let mut ctx = ConflictContext::new(None, &cancelled);

        let resolved = ctx
            .resolve(&dest, Path::new("/src/fresh.txt"))
            .expect("Failed to resolve");
        assert_eq!(resolved, Some(dest));
    }

    #[test]
    fn test_resolve_defaults_to_rename_without_handler() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("taken.txt");
        fs::write(&dest, b"existing").expect("Failed to write file");
        let cancelled = AtomicBool::new(false);
        let mut ctx = ConflictContext::new(None, &cancelled);

        let resolved = ctx
            .resolve(&dest, Path::new("/src/taken.txt"))
            .expect("Failed to resolve");
        assert_eq!(resolved, Some(temp_dir.path().join("taken (2).txt")));
    }

    #[test]
    fn test_resolve_revalidates_supplied_rename_target() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("taken.txt");
        fs::write(&dest, b"existing").expect("Failed to write file");
        let stale = temp_dir.path().join("stale.txt");
        fs::write(&stale, b"also existing").expect("Failed to write file");

        let stale_for_handler = stale.clone();
        let handler: ConflictHandler = Arc::new(move |_existing, _source| {
            ConflictDecision::Rename {
                new_path: Some(stale_for_handler.clone()),
            }
        });
        let cancelled = AtomicBool::new(false);
        let mut ctx = ConflictContext::new(Some(handler), &cancelled);

        // The supplied target already exists, so a fresh suggestion is
        // derived from it instead of clobbering it.
        let resolved = ctx
            .resolve(&dest, Path::new("/src/taken.txt"))
            .expect("Failed to resolve")
            .expect("Expected a target path");
        assert_eq!(resolved, temp_dir.path().join("stale (2).txt"));
    }

    #[test]
    fn test_resolve_apply_all_overwrite_stops_asking() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let first = temp_dir.path().join("a.txt");
        let second = temp_dir.path().join("b.txt");
        fs::write(&first, b"a").expect("Failed to write file");
        fs::write(&second, b"b").expect("Failed to write file");

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let handler: ConflictHandler = Arc::new(move |_existing, _source| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            ConflictDecision::Overwrite { apply_all: true }
        });
        let cancelled = AtomicBool::new(false);
        let mut ctx = ConflictContext::new(Some(handler), &cancelled);

        let src = Path::new("/src/x");
        assert_eq!(ctx.resolve(&first, src).unwrap(), Some(first.clone()));
        assert_eq!(ctx.resolve(&second, src).unwrap(), Some(second.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolve_cancel_sets_flag_and_errors() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("a.txt");
        fs::write(&dest, b"a").expect("Failed to write file");

        let handler: ConflictHandler = Arc::new(|_existing, _source| ConflictDecision::Cancel);
        let cancelled = AtomicBool::new(false);
        let mut ctx = ConflictContext::new(Some(handler), &cancelled);

        let err = ctx
            .resolve(&dest, Path::new("/src/a.txt"))
            .expect_err("Expected cancellation");
        assert!(err.is_cancelled());
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_conflict_channel_round_trip() {
        let (handler, requests) = conflict_channel();

        let decider = thread::spawn(move || {
            let request = requests.recv().expect("Failed to receive request");
            assert_eq!(request.existing, PathBuf::from("/dst/a.txt"));
            assert_eq!(request.source, PathBuf::from("/src/a.txt"));
            request.respond(ConflictDecision::Skip);
        });

        let decision = handler(Path::new("/dst/a.txt"), Path::new("/src/a.txt"));
        assert_eq!(decision, ConflictDecision::Skip);
        decider.join().expect("Decider thread panicked");
    }

    #[test]
    fn test_conflict_channel_dropped_receiver_defaults_to_rename() {
        let (handler, requests) = conflict_channel();
        drop(requests);

        let decision = handler(Path::new("/dst/a.txt"), Path::new("/src/a.txt"));
        assert_eq!(decision, ConflictDecision::Rename { new_path: None });
    }

    #[test]
    fn test_dropped_request_releases_worker_with_default() {
        let (handler, requests) = conflict_channel();

        let decider = thread::spawn(move || {
            let request = requests.recv().expect("Failed to receive request");
            drop(request);
        });

        let decision = handler(Path::new("/dst/a.txt"), Path::new("/src/a.txt"));
        assert_eq!(decision, ConflictDecision::Rename { new_path: None });
        decider.join().expect("Decider thread panicked");
    }
}
