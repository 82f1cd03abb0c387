//! Status polling session.
//!
//! A [`JobStatusPoller`] owns at most one background session at a time. The
//! session issues its first status request immediately, then one per
//! interval, never more than one in flight. Results are published through a
//! `watch` channel as [`PollSnapshot`]s.
//!
//! # Session states
//!
//! `Idle -> Active -> Stopped`. A session stops itself on a terminal status
//! or when the job has expired (404). Transient errors are published but do
//! not stop it.
//!
//! # Stale results
//!
//! Every session gets a fresh generation number. A result is published only
//! while its session is still `Active` and its generation is current, so a
//! response arriving after [`JobStatusPoller::stop`] never reaches observers.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::service::{redact_id, CaptionServiceOps, StatusReport};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// State of the polling session (not of the job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingState {
    Idle,
    Active,
    Stopped,
}

/// Outcome of one status request.
#[derive(Debug, Clone)]
pub enum PollUpdate {
    Status(StatusReport),
    /// Transient failure; the session keeps polling.
    Error(AppError),
    /// The service no longer knows the job; the session has stopped.
    Expired,
}

/// Latest observable result of the poller.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub job_id: Option<String>,
    /// Session the result belongs to.
    pub generation: u64,
    /// Increases with every published result, across sessions.
    pub seq: u64,
    /// `None` until the session's first response.
    pub update: Option<PollUpdate>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SessionShared {
    state: PollingState,
    job_id: Option<String>,
    generation: u64,
    in_flight: usize,
    seq: u64,
}

type Shared = Arc<Mutex<SessionShared>>;

fn lock(shared: &Shared) -> MutexGuard<'_, SessionShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// JobStatusPoller
// ─────────────────────────────────────────────────────────────────────────────

/// Polls one job's status on a fixed interval.
pub struct JobStatusPoller<C: CaptionServiceOps> {
    service: C,
    interval: Duration,
    shared: Shared,
    updates: Arc<watch::Sender<PollSnapshot>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl<C: CaptionServiceOps> JobStatusPoller<C> {
    pub fn new(service: C, interval: Duration) -> Self {
        let (updates, _) = watch::channel(PollSnapshot::default());
        Self {
            service,
            interval,
            shared: Arc::new(Mutex::new(SessionShared {
                state: PollingState::Idle,
                job_id: None,
                generation: 0,
                in_flight: 0,
                seq: 0,
            })),
            updates: Arc::new(updates),
            cancel: None,
            task: None,
        }
    }

    /// Starts polling `job_id` and returns the session generation.
    ///
    /// Starting the job that is already being polled is a no-op. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `AppError::PollerBusy` - A session is active for a different job
    /// - `AppError::Internal` - `job_id` is empty
    /// - `AppError::Config` - The poll interval is zero
    pub fn start(&mut self, job_id: &str) -> Result<u64, AppError> {
        if job_id.is_empty() {
            return Err(AppError::Internal(
                "Cannot poll without a job ID".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(AppError::Config(
                "poll interval must be non-zero".to_string(),
            ));
        }

        let generation = {
            let mut shared = lock(&self.shared);

            if shared.state == PollingState::Active {
                return match shared.job_id.as_deref() {
                    Some(active) if active == job_id => Ok(shared.generation),
                    active => Err(AppError::PollerBusy {
                        active_job: active.unwrap_or_default().to_string(),
                    }),
                };
            }

            shared.generation += 1;
            shared.state = PollingState::Active;
            shared.job_id = Some(job_id.to_string());
            shared.in_flight = 0;

            self.updates.send_replace(PollSnapshot {
                job_id: Some(job_id.to_string()),
                generation: shared.generation,
                seq: shared.seq,
                update: None,
            });

            shared.generation
        };

        // A self-stopped session may still hold its token.
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.task = Some(tokio::spawn(run_session(
            self.service.clone(),
            self.shared.clone(),
            self.updates.clone(),
            token,
            self.interval,
            job_id.to_string(),
            generation,
        )));

        info!(
            "[POLL] Started session {} for job {} every {}ms",
            generation,
            redact_id(job_id),
            self.interval.as_millis()
        );

        Ok(generation)
    }

    /// Stops the current session. Idempotent; always legal.
    ///
    /// Any request still in flight is abandoned and its result discarded.
    pub fn stop(&mut self) {
        {
            let mut shared = lock(&self.shared);
            if shared.state == PollingState::Active {
                info!(
                    "[POLL] Stopping session {} for job {}",
                    shared.generation,
                    redact_id(shared.job_id.as_deref().unwrap_or_default())
                );
                shared.state = PollingState::Stopped;
            }
            shared.generation += 1;
            shared.in_flight = 0;
        }

        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        // The task exits on cancellation; nothing to await.
        self.task.take();
    }

    pub fn state(&self) -> PollingState {
        lock(&self.shared).state
    }

    pub fn job_id(&self) -> Option<String> {
        lock(&self.shared).job_id.clone()
    }

    /// Status requests currently awaiting a response (0 or 1).
    pub fn in_flight(&self) -> usize {
        lock(&self.shared).in_flight
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Subscribes to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.updates.subscribe()
    }

    /// Returns the most recently published snapshot.
    pub fn latest(&self) -> PollSnapshot {
        self.updates.borrow().clone()
    }
}

impl<C: CaptionServiceOps> Drop for JobStatusPoller<C> {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Task
// ─────────────────────────────────────────────────────────────────────────────

async fn run_session<C: CaptionServiceOps>(
    service: C,
    shared: Shared,
    updates: Arc<watch::Sender<PollSnapshot>>,
    cancel: CancellationToken,
    interval: Duration,
    job_id: String,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !begin_tick(&shared, generation) {
            break;
        }

        debug!("[POLL] GET /status/{}", redact_id(&job_id));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            result = service.fetch_status(&job_id) => result,
        };

        if !publish(&shared, &updates, generation, &job_id, outcome) {
            break;
        }
    }

    debug!(
        "[POLL] Session {} for job {} exited",
        generation,
        redact_id(&job_id)
    );
}

/// Marks a request in flight if the session is still current.
fn begin_tick(shared: &Shared, generation: u64) -> bool {
    let mut shared = lock(shared);
    if shared.generation != generation || shared.state != PollingState::Active {
        return false;
    }
    shared.in_flight += 1;
    true
}

/// Publishes a result. Returns whether the session should keep polling.
fn publish(
    shared: &Shared,
    updates: &watch::Sender<PollSnapshot>,
    generation: u64,
    job_id: &str,
    outcome: Result<StatusReport, AppError>,
) -> bool {
    let mut shared = lock(shared);

    if shared.generation != generation || shared.state != PollingState::Active {
        debug!(
            "[POLL] Discarding stale result for job {}",
            redact_id(job_id)
        );
        return false;
    }
    shared.in_flight = shared.in_flight.saturating_sub(1);

    let (update, stop) = match outcome {
        Ok(report) => {
            let terminal = report.status.is_terminal();
            if terminal {
                info!(
                    "[POLL] Job {} reached terminal status {}",
                    redact_id(job_id),
                    report.status
                );
            }
            (PollUpdate::Status(report), terminal)
        }
        Err(AppError::JobExpired { .. }) => {
            warn!("[POLL] Job {} expired or not found", redact_id(job_id));
            (PollUpdate::Expired, true)
        }
        Err(e) => {
            warn!(
                "[POLL] Status request for job {} failed: {}",
                redact_id(job_id),
                e
            );
            (PollUpdate::Error(e), false)
        }
    };

    shared.seq += 1;
    if stop {
        shared.state = PollingState::Stopped;
    }

    updates.send_replace(PollSnapshot {
        job_id: Some(job_id.to_string()),
        generation,
        seq: shared.seq,
        update: Some(update),
    });

    !stop
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::service::testing::{status, FakeService};
    use crate::service::JobStatus;

    const INTERVAL: Duration = Duration::from_millis(20);

    /// Waits until the poller publishes a snapshot with an update.
    async fn next_update(rx: &mut watch::Receiver<PollSnapshot>) -> PollSnapshot {
        loop {
            tokio::time::timeout(Duration::from_secs(2), rx.changed())
                .await
                .expect("Timed out waiting for poll update")
                .expect("Poller dropped");
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.update.is_some() {
                return snapshot;
            }
        }
    }

    fn status_of(snapshot: &PollSnapshot) -> Option<JobStatus> {
        match &snapshot.update {
            Some(PollUpdate::Status(report)) => Some(report.status),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_new_poller_is_idle() {
        let poller = JobStatusPoller::new(FakeService::new(), INTERVAL);
        assert_eq!(poller.state(), PollingState::Idle);
        assert_eq!(poller.in_flight(), 0);
        assert!(poller.latest().update.is_none());
    }

    #[tokio::test]
    async fn test_empty_job_id_is_rejected() {
        let service = FakeService::new();
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);

        assert!(matches!(poller.start(""), Err(AppError::Internal(_))));
        assert_eq!(poller.state(), PollingState::Idle);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(service.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let service = FakeService::new();
        let mut poller = JobStatusPoller::new(service.clone(), Duration::ZERO);

        assert!(matches!(poller.start("abc"), Err(AppError::Config(_))));
        assert_eq!(poller.state(), PollingState::Idle);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(service.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_polls_until_terminal_then_stops() {
        let service = FakeService::new().with_statuses(vec![
            status(JobStatus::Uploaded),
            status(JobStatus::Transcribing),
            status(JobStatus::Completed),
        ]);
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);
        let mut rx = poller.subscribe();

        poller.start("abc").unwrap();

        let mut seen = Vec::new();
        loop {
            let snapshot = next_update(&mut rx).await;
            let status = status_of(&snapshot).unwrap();
            seen.push(status);
            if status.is_terminal() {
                break;
            }
        }

        assert_eq!(
            seen,
            vec![
                JobStatus::Uploaded,
                JobStatus::Transcribing,
                JobStatus::Completed
            ]
        );
        assert_eq!(poller.state(), PollingState::Stopped);

        // Terminal stickiness: no further ticks.
        let calls = service.status_calls();
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(service.status_calls(), calls);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let service = FakeService::new().with_statuses(vec![status(JobStatus::Uploaded)]);
        let mut poller = JobStatusPoller::new(service.clone(), Duration::from_secs(60));
        let mut rx = poller.subscribe();

        poller.start("abc").unwrap();
        let snapshot = next_update(&mut rx).await;

        assert_eq!(status_of(&snapshot), Some(JobStatus::Uploaded));
        assert_eq!(service.status_calls(), 1);
        poller.stop();
    }

    #[tokio::test]
    async fn test_expired_stops_session() {
        let service = FakeService::new().with_statuses(vec![
            status(JobStatus::Transcribing),
            Err(AppError::JobExpired {
                job_id: "abc".into(),
            }),
        ]);
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);
        let mut rx = poller.subscribe();

        poller.start("abc").unwrap();
        next_update(&mut rx).await;
        let snapshot = next_update(&mut rx).await;

        assert!(matches!(snapshot.update, Some(PollUpdate::Expired)));
        assert_eq!(poller.state(), PollingState::Stopped);

        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(service.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_error_keeps_polling() {
        let service = FakeService::new().with_statuses(vec![
            Err(AppError::ServerRejected {
                reason: RejectReason::Status(503),
                message: None,
            }),
            Err(AppError::Network("reset".into())),
            status(JobStatus::EmbeddingSubtitles),
        ]);
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);
        let mut rx = poller.subscribe();

        poller.start("abc").unwrap();

        let first = next_update(&mut rx).await;
        assert!(matches!(first.update, Some(PollUpdate::Error(_))));
        assert_eq!(poller.state(), PollingState::Active);

        let second = next_update(&mut rx).await;
        assert!(matches!(
            second.update,
            Some(PollUpdate::Error(AppError::Network(_)))
        ));

        let third = next_update(&mut rx).await;
        assert_eq!(status_of(&third), Some(JobStatus::EmbeddingSubtitles));
        assert!(third.seq > second.seq && second.seq > first.seq);

        poller.stop();
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_result() {
        let service = FakeService::new()
            .with_statuses(vec![status(JobStatus::Completed)])
            .with_status_delay(Duration::from_millis(100));
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);

        poller.start("abc").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(poller.in_flight(), 1);

        poller.stop();
        assert_eq!(poller.state(), PollingState::Stopped);
        assert_eq!(poller.in_flight(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            poller.latest().update.is_none(),
            "Result of a tick issued before stop must not be published"
        );
        assert_eq!(service.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut poller = JobStatusPoller::new(FakeService::new(), INTERVAL);

        poller.stop();
        assert_eq!(poller.state(), PollingState::Idle);

        poller.start("abc").unwrap();
        poller.stop();
        poller.stop();
        poller.stop();
        assert_eq!(poller.state(), PollingState::Stopped);
    }

    #[tokio::test]
    async fn test_start_for_other_job_while_active_is_rejected() {
        let service = FakeService::new().with_statuses(vec![status(JobStatus::Transcribing)]);
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);

        let generation = poller.start("abc").unwrap();

        match poller.start("def") {
            Err(AppError::PollerBusy { active_job }) => assert_eq!(active_job, "abc"),
            other => panic!("Expected PollerBusy, got {:?}", other),
        }
        assert_eq!(poller.start("abc").unwrap(), generation);
        assert_eq!(poller.job_id().as_deref(), Some("abc"));

        poller.stop();
        let next = poller.start("def").unwrap();
        assert!(next > generation);
        assert_eq!(poller.job_id().as_deref(), Some("def"));
        poller.stop();
    }

    #[tokio::test]
    async fn test_never_more_than_one_request_in_flight() {
        let service = FakeService::new()
            .with_statuses(vec![status(JobStatus::Transcribing)])
            .with_status_delay(Duration::from_millis(60));
        let mut poller = JobStatusPoller::new(service.clone(), Duration::from_millis(10));

        poller.start("abc").unwrap();
        for _ in 0..20 {
            assert!(poller.in_flight() <= 1);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        poller.stop();

        // Ticks are serialized behind the 60ms response, so at most ~4 ran.
        assert!(service.status_calls() <= 5, "calls = {}", service.status_calls());
    }

    #[tokio::test]
    async fn test_restart_after_stop_ignores_old_session() {
        let service = FakeService::new()
            .with_statuses(vec![status(JobStatus::Transcribing)])
            .with_status_delay(Duration::from_millis(50));
        let mut poller = JobStatusPoller::new(service.clone(), INTERVAL);
        let mut rx = poller.subscribe();

        let old = poller.start("old").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.stop();
        let new = poller.start("new").unwrap();

        let snapshot = next_update(&mut rx).await;
        assert_eq!(snapshot.generation, new);
        assert_ne!(snapshot.generation, old);
        assert_eq!(snapshot.job_id.as_deref(), Some("new"));
        poller.stop();
    }
}
