//! Upload submission.
//!
//! [`UploadCoordinator`] sends one validated candidate to the service under
//! an upload-wide timeout. A single-slot [`UploadGate`] rejects a second
//! submission while one is pending, before anything touches the network.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::error::AppError;
use crate::service::{redact_id, CaptionServiceOps, PreparedUpload};
use crate::validation::UploadCandidate;

// ─────────────────────────────────────────────────────────────────────────────
// UploadGate
// ─────────────────────────────────────────────────────────────────────────────

/// Single-slot gate allowing at most one upload in flight.
///
/// Clones share the slot.
#[derive(Clone)]
pub struct UploadGate {
    sem: Arc<Semaphore>,
}

impl UploadGate {
    pub fn new() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claims the slot without waiting. `None` when an upload is pending.
    pub fn try_acquire(&self) -> Option<UploadPermit> {
        self.sem
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| UploadPermit { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the upload slot; released on drop.
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Submits candidates to the service.
#[derive(Clone)]
pub struct UploadCoordinator<C: CaptionServiceOps> {
    service: C,
    gate: UploadGate,
    timeout: Duration,
}

impl<C: CaptionServiceOps> UploadCoordinator<C> {
    pub fn new(service: C, timeout: Duration) -> Self {
        Self {
            service,
            gate: UploadGate::new(),
            timeout,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Uploads the candidate with the given sanitized label.
    ///
    /// On success the candidate's preview is released and the job ID is
    /// returned. When the timeout elapses the in-flight request is dropped.
    ///
    /// # Errors
    ///
    /// - `AppError::UploadInProgress` - Another upload holds the gate
    /// - `AppError::Timeout` - The upload did not finish in time
    /// - Any error from the service (`Network`, `ServerRejected`, `InvalidResponse`)
    pub async fn submit(
        &self,
        candidate: &mut UploadCandidate,
        label: &str,
    ) -> Result<String, AppError> {
        let _permit = self.gate.try_acquire().ok_or_else(|| {
            warn!("[UPLOAD] Rejected: another upload is in progress");
            AppError::UploadInProgress
        })?;

        let prepared = PreparedUpload::new(&candidate.file, label);

        let job_id = match tokio::time::timeout(self.timeout, self.service.upload(&prepared)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "[UPLOAD] Timed out after {}s, request cancelled",
                    self.timeout.as_secs()
                );
                return Err(AppError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if candidate.release_preview() {
            info!("[UPLOAD] Released preview for submitted file");
        }
        info!("[UPLOAD] Accepted as job {}", redact_id(&job_id));

        Ok(job_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
