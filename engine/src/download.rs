//! Download task execution.
//!
//! A `DownloadTask` fetches a list of URLs sequentially into a destination
//! directory, reusing the transfer engine's progress and conflict protocol.
//! Each URL is streamed into a uuid-suffixed temp file inside the
//! destination directory; the final name is derived from the response
//! (Content-Disposition, then the URL path's basename, then a synthesized
//! fallback) and the conflict protocol runs once, at finalize time, before
//! the atomic rename.
//!
//! Network errors abort the whole task. The size estimate is best-effort:
//! a HEAD request per URL, with failures contributing 0.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use uuid::Uuid;

use crate::conflict::ConflictContext;
use crate::error::EngineError;
use crate::events::{ProgressTracker, TransferObserver};
use crate::model::DownloadRequest;
use crate::task::CHUNK_SIZE;

/// Timeout for the best-effort HEAD size probe.
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the streaming GET.
const GET_TIMEOUT: Duration = Duration::from_secs(30);

/// One asynchronous download operation over a list of URLs.
pub struct DownloadTask {
    id: Uuid,
    request: DownloadRequest,
    observer: Arc<dyn TransferObserver>,
    cancelled: AtomicBool,
    started: AtomicBool,
}

impl DownloadTask {
    pub fn new(request: DownloadRequest, observer: Arc<dyn TransferObserver>) -> Arc<Self> {
        Self::with_id(Uuid::new_v4(), request, observer)
    }

    pub(crate) fn with_id(
        id: Uuid,
        request: DownloadRequest,
        observer: Arc<dyn TransferObserver>,
    ) -> Arc<Self> {
        Arc::new(DownloadTask {
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

    /// Request cooperative cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(self: Arc<Self>) {
        tracing::debug!(task = %self.id, urls = self.request.urls.len(), "download task started");
        let result = DownloadWorker::new(&self).and_then(|mut worker| worker.execute());
        match result {
            Ok(()) => {
                tracing::debug!(task = %self.id, "download task finished");
                self.observer.on_finished(true, "");
            }
            Err(e) => {
                let message = e.to_string();
                tracing::debug!(task = %self.id, error = %message, "download task failed");
                self.observer.on_finished(false, &message);
            }
        }
    }
}

struct DownloadWorker<'a> {
    task: &'a DownloadTask,
    client: Client,
    progress: ProgressTracker,
    conflicts: ConflictContext<'a>,
}

impl<'a> DownloadWorker<'a> {
    fn new(task: &'a DownloadTask) -> Result<Self, EngineError> {
        let client = Client::builder()
            .build()
            .map_err(|e| EngineError::ClientBuild { source: e })?;
        Ok(DownloadWorker {
            task,
            client,
            progress: ProgressTracker::new(Arc::clone(&task.observer)),
            conflicts: ConflictContext::new(
                task.request.conflict_handler.clone(),
                &task.cancelled,
            ),
        })
    }

    fn execute(&mut self) -> Result<(), EngineError> {
        self.progress.set_total(self.estimate_total());
        self.progress.begin();

        for (index, url) in self.task.request.urls.iter().enumerate() {
            self.check_cancelled()?;
            self.fetch_one(url, index + 1)?;
        }
        Ok(())
    }

    /// Best-effort size estimate: one HEAD per URL; any failure contributes 0.
    fn estimate_total(&self) -> u64 {
        let mut total: u64 = 0;
        for url in &self.task.request.urls {
            let length = self
                .client
                .head(url)
                .timeout(HEAD_TIMEOUT)
                .send()
                .ok()
                .filter(|r| r.status().is_success())
                .and_then(|r| content_length(&r));
            match length {
                Some(length) => total += length,
                None => {
                    tracing::warn!(url = %url, "size probe failed, estimate will undercount");
                }
            }
        }
        total
    }

    fn fetch_one(&mut self, url: &str, ordinal: usize) -> Result<(), EngineError> {
        let response = self
            .client
            .get(url)
            .timeout(GET_TIMEOUT)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::Network {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let name = derive_filename(&response, url, ordinal);
        let temp = self
            .task
            .request
            .destination
            .join(format!(".download-{}.part", Uuid::new_v4()));

        if let Err(e) = self.fetch_into(response, url, &temp) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        // The conflict protocol runs once per URL, at finalize time; the
        // handler's second argument is the temp-file hint.
        let dest = self.task.request.destination.join(&name);
        let target = match self.conflicts.resolve(&dest, &temp) {
            Ok(Some(target)) => target,
            Ok(None) => {
                let _ = fs::remove_file(&temp);
                return Ok(());
            }
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(EngineError::Write {
                path: target,
                source: e,
            });
        }
        self.progress.file_done(&target);
        Ok(())
    }

    /// Stream the response body into `temp` in fixed-size chunks.
    fn fetch_into(
        &mut self,
        mut response: Response,
        url: &str,
        temp: &Path,
    ) -> Result<(), EngineError> {
        let mut writer = fs::File::create(temp).map_err(|e| EngineError::Write {
            path: temp.to_path_buf(),
            source: e,
        })?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            self.check_cancelled()?;
            let n = response.read(&mut buf).map_err(|e| EngineError::Network {
                url: url.to_string(),
                source: Box::new(e),
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

        // The emission after a file's final chunk bypasses the throttle.
        self.progress.flush();
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

/// Content-Length as sent by the server.
///
/// `Response::content_length` reports the decoded body size hint, which is 0
/// for HEAD responses, so the header is read directly.
fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Derive the destination filename for a response.
///
/// Priority: Content-Disposition filename, then the URL path's basename
/// (percent-decoded), then a synthesized `downloaded-file-N`.
fn derive_filename(response: &Response, url: &str, ordinal: usize) -> String {
    if let Some(value) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(name) = filename_from_disposition(value) {
            return name;
        }
    }
    if let Some(name) = filename_from_url(url) {
        return name;
    }
    format!("downloaded-file-{}", ordinal)
}

/// Extract a filename from a Content-Disposition header value.
///
/// The extended `filename*` parameter wins over the plain `filename`
/// parameter; its `utf-8''` prefix is stripped and the rest percent-decoded.
fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("filename*=") {
            let rest = rest.trim_matches('"');
            let rest = rest
                .strip_prefix("utf-8''")
                .or_else(|| rest.strip_prefix("UTF-8''"))
                .unwrap_or(rest);
            if let Ok(decoded) = urlencoding::decode(rest) {
                let name = sanitize(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        } else if let Some(rest) = part.strip_prefix("filename=") {
            let name = sanitize(rest.trim_matches('"'));
            if !name.is_empty() {
                plain = Some(name);
            }
        }
    }
    plain
}

/// Percent-decoded basename of the URL's path component.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(last).ok()?;
    let name = sanitize(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Header values may smuggle path separators; keep only the final component.
fn sanitize(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}
