//! Scripted in-memory service shared by the coordinator and lifecycle tests.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::service::{CaptionServiceOps, JobStatus, PreparedUpload, StatusReport};

#[derive(Clone)]
pub(crate) struct FakeService {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    upload_result: Mutex<Result<String, AppError>>,
    upload_delay: Mutex<Duration>,
    statuses: Mutex<VecDeque<Result<StatusReport, AppError>>>,
    status_delay: Mutex<Duration>,
    cleanup_result: Mutex<Result<(), AppError>>,
    cleanup_delay: Mutex<Duration>,
    artifact: Mutex<Vec<u8>>,
    upload_calls: AtomicUsize,
    status_calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
    cleaned: Mutex<Vec<String>>,
    uploads: Mutex<Vec<PreparedUpload>>,
}

impl FakeService {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                upload_result: Mutex::new(Ok("abc".to_string())),
                upload_delay: Mutex::new(Duration::ZERO),
                statuses: Mutex::new(VecDeque::new()),
                status_delay: Mutex::new(Duration::ZERO),
                cleanup_result: Mutex::new(Ok(())),
                cleanup_delay: Mutex::new(Duration::ZERO),
                artifact: Mutex::new(b"captioned video bytes".to_vec()),
                upload_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                cleanup_calls: AtomicUsize::new(0),
                cleaned: Mutex::new(Vec::new()),
                uploads: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn with_upload(self, result: Result<String, AppError>) -> Self {
        *self.inner.upload_result.lock().unwrap() = result;
        self
    }

    pub(crate) fn with_upload_delay(self, delay: Duration) -> Self {
        *self.inner.upload_delay.lock().unwrap() = delay;
        self
    }

    /// Scripts status responses. The last entry repeats once the rest are
    /// consumed.
    pub(crate) fn with_statuses(self, statuses: Vec<Result<StatusReport, AppError>>) -> Self {
        *self.inner.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub(crate) fn with_status_delay(self, delay: Duration) -> Self {
        *self.inner.status_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn with_cleanup_result(self, result: Result<(), AppError>) -> Self {
        *self.inner.cleanup_result.lock().unwrap() = result;
        self
    }

    pub(crate) fn with_cleanup_delay(self, delay: Duration) -> Self {
        *self.inner.cleanup_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.inner.upload_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.inner.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cleanup_calls(&self) -> usize {
        self.inner.cleanup_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cleaned_ids(&self) -> Vec<String> {
        self.inner.cleaned.lock().unwrap().clone()
    }

    pub(crate) fn uploads(&self) -> Vec<PreparedUpload> {
        self.inner.uploads.lock().unwrap().clone()
    }

    fn next_status(&self) -> Result<StatusReport, AppError> {
        let mut statuses = self.inner.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(StatusReport::new(JobStatus::Transcribing)))
        }
    }
}

/// Shorthand for a scripted successful status.
pub(crate) fn status(status: JobStatus) -> Result<StatusReport, AppError> {
    Ok(StatusReport::new(status))
}

impl CaptionServiceOps for FakeService {
    fn upload<'a>(
        &'a self,
        upload: &'a PreparedUpload,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.inner.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.uploads.lock().unwrap().push(upload.clone());
            let delay = *self.inner.upload_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.inner.upload_result.lock().unwrap().clone()
        })
    }

    fn fetch_status<'a>(
        &'a self,
        _job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StatusReport, AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.inner.status_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.inner.status_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.next_status()
        })
    }

    fn cleanup<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.inner.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.cleaned.lock().unwrap().push(job_id.to_string());
            let delay = *self.inner.cleanup_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.inner.cleanup_result.lock().unwrap().clone()
        })
    }

    fn fetch_artifact<'a>(
        &'a self,
        _download_ref: &'a str,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let bytes = self.inner.artifact.lock().unwrap().clone();
            tokio::fs::write(dest, &bytes)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            Ok(bytes.len() as u64)
        })
    }
}
