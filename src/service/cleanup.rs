//! Cleanup signalling.
//!
//! Every exit path of a job (reset, page unload, teardown, post-download)
//! funnels into the same remote effect, `POST cleanup/{job_id}`, which the
//! service treats idempotently. The dispatcher keeps no per-job state and
//! never deduplicates; it only refuses to send without an identifier.
//!
//! Two forms are offered:
//! - [`CleanupDispatcher::signal`] awaits the request (bounded by a timeout)
//!   and reports the outcome without ever failing.
//! - [`CleanupDispatcher::signal_detached`] queues the request on the
//!   runtime and returns immediately, for paths that cannot await.
//!
//! Detached requests are tracked so a host can give them a bounded window
//! to leave before the process exits ([`CleanupDispatcher::drain`]).

use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::service::{redact_id, CaptionServiceOps};

/// Result of an awaited cleanup signal. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The service acknowledged the cleanup.
    Confirmed,
    /// The request failed or timed out; the failure was logged.
    Failed(String),
    /// No identifier was given, so nothing was sent.
    Skipped,
}

/// Sends cleanup signals for finished or abandoned jobs.
#[derive(Clone)]
pub struct CleanupDispatcher<C: CaptionServiceOps> {
    service: C,
    timeout: Duration,
    tracker: TaskTracker,
}

impl<C: CaptionServiceOps> CleanupDispatcher<C> {
    pub fn new(service: C, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Sends the cleanup signal and waits for it, up to the timeout.
    ///
    /// Failures are logged at `warn` and reported in the outcome; they are
    /// never returned as errors.
    pub async fn signal(&self, job_id: &str) -> CleanupOutcome {
        send_cleanup(&self.service, self.timeout, job_id).await
    }

    /// Queues the cleanup signal without waiting.
    ///
    /// Safe to call from synchronous code, including `Drop`. Outside a Tokio
    /// runtime the signal cannot be queued and is dropped with a warning.
    pub fn signal_detached(&self, job_id: &str) {
        self.spawn_tracked(job_id, Duration::ZERO);
    }

    /// Queues the cleanup signal to be sent after `delay`.
    pub fn signal_after(&self, job_id: &str, delay: Duration) {
        self.spawn_tracked(job_id, delay);
    }

    /// Log hook for a job reaching a terminal status.
    ///
    /// The dispatcher is informed but sends nothing: the service keeps the
    /// job's storage until the user leaves the result, which goes through
    /// [`Self::signal`], [`Self::signal_detached`] or [`Self::signal_after`].
    pub fn note_finished(&self, job_id: &str) {
        info!(
            "[CLEANUP] Job {} finished; cleanup deferred until exit",
            redact_id(job_id)
        );
    }

    /// Number of queued signals that have not completed.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `timeout` for queued signals to complete.
    ///
    /// Returns `true` if all of them finished in time. New signals may be
    /// queued again afterwards.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();

        if !drained {
            warn!(
                "[CLEANUP] {} signal(s) still pending after {}ms",
                self.tracker.len(),
                timeout.as_millis()
            );
        }
        drained
    }

    fn spawn_tracked(&self, job_id: &str, delay: Duration) {
        if job_id.is_empty() {
            debug!("[CLEANUP] No job ID, nothing to signal");
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "[CLEANUP] No runtime available, dropping signal for job {}",
                    redact_id(job_id)
                );
                return;
            }
        };

        let service = self.service.clone();
        let timeout = self.timeout;
        let job_id = job_id.to_string();

        if delay.is_zero() {
            debug!("[CLEANUP] Queued signal for job {}", redact_id(&job_id));
        } else {
            info!(
                "[CLEANUP] Signal for job {} scheduled in {}ms",
                redact_id(&job_id),
                delay.as_millis()
            );
        }

        self.tracker.spawn_on(
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                send_cleanup(&service, timeout, &job_id).await;
            },
            &handle,
        );
    }
}

async fn send_cleanup<C: CaptionServiceOps>(
    service: &C,
    timeout: Duration,
    job_id: &str,
) -> CleanupOutcome {
    if job_id.is_empty() {
        debug!("[CLEANUP] No job ID, nothing to signal");
        return CleanupOutcome::Skipped;
    }

    match tokio::time::timeout(timeout, service.cleanup(job_id)).await {
        Ok(Ok(())) => {
            info!("[CLEANUP] Job {} cleaned up", redact_id(job_id));
            CleanupOutcome::Confirmed
        }
        Ok(Err(e)) => {
            warn!("[CLEANUP] Cleanup for job {} failed: {}", redact_id(job_id), e);
            CleanupOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(
                "[CLEANUP] Cleanup for job {} timed out after {}ms",
                redact_id(job_id),
                timeout.as_millis()
            );
            CleanupOutcome::Failed(format!("timed out after {}ms", timeout.as_millis()))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
