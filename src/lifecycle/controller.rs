//! The job lifecycle state machine.
//!
//! [`LifecycleController`] is the only surface a host talks to. It owns the
//! current candidate, job and polling session, and routes every exit path
//! into the cleanup dispatcher.
//!
//! ```text
//! Idle ──select ok──▶ Validating ──submit──▶ Uploading ──ok──▶ AwaitingFirstStatus
//!   ▲                     │                      │                    │ poller start
//!   │                     └─select fails─▶ Idle  └─fails─▶ Idle        ▼
//!   │                                                              Polling ◀─┐ non-terminal
//!   │                                                                 │ ─────┘
//!   └──────────────── reset (any state) ◀──── Terminal(*) ◀──terminal/404
//! ```

use std::path::Path;

use tokio::sync::watch;
use tracing::{error, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::lifecycle::state::{Job, LifecycleState, TerminalOutcome};
use crate::service::{
    redact_id, resolve_download_url, CaptionApiClient, CaptionServiceOps, CleanupDispatcher,
    CleanupOutcome, JobStatusPoller, PollSnapshot, PollUpdate, PollingState, UploadCoordinator,
};
use crate::validation::{FileValidator, UploadCandidate, ValidatedUpload};

/// Drives one captioning job at a time from file selection to cleanup.
pub struct LifecycleController<C: CaptionServiceOps> {
    config: ClientConfig,
    service: C,
    validator: FileValidator,
    uploader: UploadCoordinator<C>,
    poller: JobStatusPoller<C>,
    cleanup: CleanupDispatcher<C>,
    updates: watch::Receiver<PollSnapshot>,

    state: LifecycleState,
    candidate: Option<UploadCandidate>,
    validated: Option<ValidatedUpload>,
    job: Option<Job>,
    /// Generation of the polling session feeding this job.
    session: Option<u64>,
    applied_seq: u64,
    current_error: Option<AppError>,
}

impl LifecycleController<CaptionApiClient> {
    /// Builds a controller talking to the configured service over HTTP.
    pub fn connect(config: ClientConfig) -> Result<Self, AppError> {
        config.validate()?;
        let client = CaptionApiClient::from_config(&config)?;
        Ok(Self::new(config, client))
    }
}

impl<C: CaptionServiceOps> LifecycleController<C> {
    pub fn new(config: ClientConfig, service: C) -> Self {
        let poller = JobStatusPoller::new(service.clone(), config.poll_interval);
        let updates = poller.subscribe();

        Self {
            validator: FileValidator::from_config(&config),
            uploader: UploadCoordinator::new(service.clone(), config.upload_timeout),
            cleanup: CleanupDispatcher::new(service.clone(), config.cleanup_timeout),
            poller,
            updates,
            service,
            config,
            state: LifecycleState::Idle,
            candidate: None,
            validated: None,
            job: None,
            session: None,
            applied_seq: 0,
            current_error: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// The single error the presentation layer should show, if any.
    pub fn current_error(&self) -> Option<&AppError> {
        self.current_error.as_ref()
    }

    pub fn candidate(&self) -> Option<&UploadCandidate> {
        self.candidate.as_ref()
    }

    pub fn validated(&self) -> Option<&ValidatedUpload> {
        self.validated.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn polling_state(&self) -> PollingState {
        self.poller.state()
    }

    /// Dispatcher shared by every cleanup trigger. Hosts use it to drain
    /// queued signals before exiting.
    pub fn cleanup(&self) -> &CleanupDispatcher<C> {
        &self.cleanup
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Validates and holds a candidate, replacing any previous one.
    ///
    /// On rejection the candidate is discarded, its preview released, and
    /// the controller returns to `Idle` with the error recorded.
    pub fn select_file(
        &mut self,
        mut candidate: UploadCandidate,
    ) -> Result<ValidatedUpload, AppError> {
        if !matches!(self.state, LifecycleState::Idle | LifecycleState::Validating) {
            candidate.release_preview();
            return Err(self.invalid("select a file"));
        }

        self.discard_candidate();

        match self
            .validator
            .validate(&candidate.file, candidate.label.as_deref())
        {
            Ok(validated) => {
                info!(
                    "[LIFECYCLE] Selected {} ({} bytes) as '{}'",
                    candidate.file.media_type, candidate.file.size, validated.label
                );
                self.candidate = Some(candidate);
                self.validated = Some(validated.clone());
                self.current_error = None;
                self.transition(LifecycleState::Validating);
                Ok(validated)
            }
            Err(e) => {
                warn!("[LIFECYCLE] File rejected: {}", e);
                candidate.release_preview();
                let err = AppError::from(e);
                self.current_error = Some(err.clone());
                self.transition(LifecycleState::Idle);
                Err(err)
            }
        }
    }

    /// Drops the selected candidate and releases its preview.
    pub fn clear_selection(&mut self) -> Result<(), AppError> {
        if !matches!(self.state, LifecycleState::Idle | LifecycleState::Validating) {
            return Err(self.invalid("clear the selection"));
        }
        self.discard_candidate();
        self.current_error = None;
        self.transition(LifecycleState::Idle);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload
    // ─────────────────────────────────────────────────────────────────────────

    /// Uploads the validated candidate and starts polling the new job.
    ///
    /// On failure the candidate is discarded and the controller returns to
    /// `Idle` with the error recorded. No cleanup is owed since no job
    /// exists.
    pub async fn submit(&mut self) -> Result<String, AppError> {
        match self.state {
            LifecycleState::Validating => {}
            LifecycleState::Uploading => return Err(AppError::UploadInProgress),
            _ => return Err(self.invalid("submit")),
        }

        // No job may be created that the poller cannot follow.
        if let Err(e) = self.config.validate() {
            warn!("[LIFECYCLE] Refusing to submit: {}", e);
            self.discard_candidate();
            self.current_error = Some(e.clone());
            self.transition(LifecycleState::Idle);
            return Err(e);
        }

        let (mut candidate, validated) = match (self.candidate.take(), self.validated.take()) {
            (Some(candidate), Some(validated)) => (candidate, validated),
            _ => {
                self.transition(LifecycleState::Idle);
                return Err(AppError::Internal(
                    "No validated file to submit".to_string(),
                ));
            }
        };

        self.current_error = None;
        self.transition(LifecycleState::Uploading);

        let result = self.uploader.submit(&mut candidate, &validated.label).await;
        drop(candidate);

        match result {
            Ok(job_id) => {
                self.job = Some(Job::new(job_id.clone()));
                self.transition(LifecycleState::AwaitingFirstStatus);
                self.start_polling(&job_id)?;
                Ok(job_id)
            }
            Err(e) => {
                warn!("[LIFECYCLE] Upload failed: {}", e);
                self.current_error = Some(e.clone());
                self.transition(LifecycleState::Idle);
                Err(e)
            }
        }
    }

    fn start_polling(&mut self, job_id: &str) -> Result<(), AppError> {
        self.poller.stop();
        match self.poller.start(job_id) {
            Ok(generation) => {
                self.session = Some(generation);
                self.transition(LifecycleState::Polling);
                Ok(())
            }
            Err(e) => {
                error!(
                    "[LIFECYCLE] Could not poll job {}: {}",
                    redact_id(job_id),
                    e
                );
                self.cleanup.signal_detached(job_id);
                self.job = None;
                self.current_error = Some(e.clone());
                self.transition(LifecycleState::Idle);
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Waits for the next status result of the current job and applies it.
    ///
    /// Cancel-safe. Returns the state after the update.
    pub async fn next_update(&mut self) -> Result<LifecycleState, AppError> {
        loop {
            if !self.state.is_tracking() {
                return Err(self.invalid("wait for a status update"));
            }

            if self.updates.changed().await.is_err() {
                return Err(AppError::Internal("Status channel closed".to_string()));
            }

            let snapshot = self.updates.borrow_and_update().clone();
            if self.apply_snapshot(snapshot) {
                return Ok(self.state);
            }
        }
    }

    /// Applies the latest published result without waiting.
    ///
    /// Returns whether anything changed.
    pub fn apply_latest(&mut self) -> bool {
        let snapshot = self.updates.borrow_and_update().clone();
        self.apply_snapshot(snapshot)
    }

    fn apply_snapshot(&mut self, snapshot: PollSnapshot) -> bool {
        if !self.state.is_tracking()
            || self.session != Some(snapshot.generation)
            || snapshot.seq <= self.applied_seq
        {
            return false;
        }
        let Some(update) = snapshot.update else {
            return false;
        };
        let Some(job) = self.job.as_mut() else {
            return false;
        };
        self.applied_seq = snapshot.seq;
        let job_id = job.id.clone();

        match update {
            PollUpdate::Status(report) => {
                job.apply(&report);
                let job_error = job.error.clone();

                match TerminalOutcome::from_status(report.status) {
                    Some(outcome) => {
                        self.current_error = match outcome {
                            TerminalOutcome::Failed => Some(AppError::JobFailed {
                                job_id: job_id.clone(),
                                message: job_error.unwrap_or_default(),
                            }),
                            _ => None,
                        };
                        self.finish(&job_id, outcome);
                    }
                    None => {
                        self.current_error = None;
                        if self.state != LifecycleState::Polling {
                            self.transition(LifecycleState::Polling);
                        }
                    }
                }
            }
            PollUpdate::Error(e) => {
                self.current_error = Some(e);
            }
            PollUpdate::Expired => {
                self.current_error = Some(AppError::JobExpired {
                    job_id: job_id.clone(),
                });
                self.finish(&job_id, TerminalOutcome::Expired);
            }
        }

        true
    }

    fn finish(&mut self, job_id: &str, outcome: TerminalOutcome) {
        self.poller.stop();
        self.session = None;
        self.cleanup.note_finished(job_id);
        self.transition(LifecycleState::Terminal(outcome));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Exits
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns to `Idle` from any state.
    ///
    /// Polling stops first; if a job exists its cleanup is awaited (bounded
    /// by the cleanup timeout). Cleanup failure never blocks the reset.
    pub async fn reset(&mut self) -> CleanupOutcome {
        self.poller.stop();
        self.session = None;
        self.discard_candidate();

        let outcome = match self.job.take() {
            Some(job) => self.cleanup.signal(&job.id).await,
            None => CleanupOutcome::Skipped,
        };

        self.current_error = None;
        self.transition(LifecycleState::Idle);
        outcome
    }

    /// The hosting surface is going away: queue cleanup without waiting.
    ///
    /// In-memory state is left untouched.
    pub fn on_page_unload(&self) {
        if let Some(job) = &self.job {
            info!(
                "[LIFECYCLE] Unloading with job {}, queueing cleanup",
                redact_id(&job.id)
            );
            self.cleanup.signal_detached(&job.id);
        }
    }

    /// Stops polling and queues cleanup for the current job. Also runs on drop.
    pub fn teardown(mut self) {
        self.release_resources();
    }

    fn release_resources(&mut self) {
        self.poller.stop();
        self.session = None;
        self.discard_candidate();
        if let Some(job) = self.job.take() {
            info!(
                "[LIFECYCLE] Teardown with job {}, queueing cleanup",
                redact_id(&job.id)
            );
            self.cleanup.signal_detached(&job.id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Download
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the artifact URL and schedules cleanup after the grace delay.
    ///
    /// Only available for a fully completed job with a download reference.
    pub fn download(&self) -> Result<Url, AppError> {
        let (job_id, download_ref) = self.downloadable()?;
        let url = resolve_download_url(&self.config.base_url, &download_ref)?;

        info!(
            "[DOWNLOAD] Job {} downloading {}",
            redact_id(&job_id),
            url.path()
        );
        self.cleanup
            .signal_after(&job_id, self.config.download_grace);

        Ok(url)
    }

    /// Fetches the artifact to `dest`, then performs [`Self::download`].
    pub async fn download_to(&mut self, dest: &Path) -> Result<u64, AppError> {
        let (_, download_ref) = self.downloadable()?;

        match self.service.fetch_artifact(&download_ref, dest).await {
            Ok(bytes) => {
                self.download()?;
                Ok(bytes)
            }
            Err(e) => {
                warn!("[DOWNLOAD] Failed: {}", e);
                self.current_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn downloadable(&self) -> Result<(String, String), AppError> {
        match (&self.state, &self.job) {
            (LifecycleState::Terminal(TerminalOutcome::Completed), Some(job)) => {
                match &job.download_ref {
                    Some(download_ref) => Ok((job.id.clone(), download_ref.clone())),
                    None => Err(self.invalid("download without a download reference")),
                }
            }
            _ => Err(self.invalid("download")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn discard_candidate(&mut self) {
        if let Some(mut candidate) = self.candidate.take() {
            candidate.release_preview();
        }
        self.validated = None;
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            info!("[LIFECYCLE] {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn invalid(&self, action: &'static str) -> AppError {
        AppError::InvalidTransition {
            state: self.state.to_string(),
            action,
        }
    }
}

impl<C: CaptionServiceOps> Drop for LifecycleController<C> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
