//! Lifecycle states and the job record owned by the controller.

use std::fmt;

use serde::Serialize;

use crate::service::{JobStatus, StatusReport};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Completed,
    /// Captions exist but could not be embedded (`completed_srt_only`).
    PartialCompleted,
    Failed,
    /// The service no longer knows the job.
    Expired,
}

impl TerminalOutcome {
    /// Maps a terminal job status onto its outcome.
    pub fn from_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed => Some(TerminalOutcome::Completed),
            JobStatus::CompletedSrtOnly => Some(TerminalOutcome::PartialCompleted),
            JobStatus::Failed => Some(TerminalOutcome::Failed),
            _ => None,
        }
    }
}

/// Controller state. `Terminal` ends the job, not the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Validating,
    Uploading,
    AwaitingFirstStatus,
    Polling,
    Terminal(TerminalOutcome),
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminal(_))
    }

    /// States in which a job identifier exists and the job is live.
    pub fn is_tracking(&self) -> bool {
        matches!(
            self,
            LifecycleState::AwaitingFirstStatus | LifecycleState::Polling
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("idle"),
            LifecycleState::Validating => f.write_str("validating"),
            LifecycleState::Uploading => f.write_str("uploading"),
            LifecycleState::AwaitingFirstStatus => f.write_str("awaiting first status"),
            LifecycleState::Polling => f.write_str("polling"),
            LifecycleState::Terminal(TerminalOutcome::Completed) => f.write_str("completed"),
            LifecycleState::Terminal(TerminalOutcome::PartialCompleted) => {
                f.write_str("partially completed")
            }
            LifecycleState::Terminal(TerminalOutcome::Failed) => f.write_str("failed"),
            LifecycleState::Terminal(TerminalOutcome::Expired) => f.write_str("expired"),
        }
    }
}

/// One captioning request, as last reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: String,
    /// `None` until the first status response.
    pub status: Option<JobStatus>,
    /// Projected from `status`, never from the wire.
    pub progress: u8,
    pub filename: Option<String>,
    /// Set only while `status` is `failed`.
    pub error: Option<String>,
    /// Set only while `status` is `completed`.
    pub download_ref: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
            progress: 0,
            filename: None,
            error: None,
            download_ref: None,
        }
    }

    /// Overwrites the job with a status report.
    pub fn apply(&mut self, report: &StatusReport) {
        self.status = Some(report.status);
        self.progress = report.status.progress();
        if report.filename.is_some() {
            self.filename = report.filename.clone();
        }
        self.error = match report.status {
            JobStatus::Failed => Some(
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "An error occurred during processing.".to_string()),
            ),
            _ => None,
        };
        self.download_ref = match report.status {
            JobStatus::Completed => report.download_url.clone(),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_projects_progress_and_ignores_wire_value() {
        let mut job = Job::new("abc");
        let mut report = StatusReport::new(JobStatus::Transcribing);
        report.progress = Some(99);

        job.apply(&report);

        assert_eq!(job.status, Some(JobStatus::Transcribing));
        assert_eq!(job.progress, 30);
    }

    #[test]
    fn test_error_only_kept_for_failed() {
        let mut job = Job::new("abc");
        let mut report = StatusReport::new(JobStatus::Transcribing);
        report.error = Some("noise".into());
        job.apply(&report);
        assert_eq!(job.error, None);

        let mut failed = StatusReport::new(JobStatus::Failed);
        failed.error = Some("ffmpeg exited with 1".into());
        job.apply(&failed);
        assert_eq!(job.error.as_deref(), Some("ffmpeg exited with 1"));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_failed_without_message_gets_default() {
        let mut job = Job::new("abc");
        job.apply(&StatusReport::new(JobStatus::Failed));
        assert!(job.error.is_some());
    }

    #[test]
    fn test_download_ref_only_kept_for_completed() {
        let mut job = Job::new("abc");

        let mut partial = StatusReport::new(JobStatus::CompletedSrtOnly);
        partial.download_url = Some("/download/abc.srt".into());
        job.apply(&partial);
        assert_eq!(job.download_ref, None);

        let mut done = StatusReport::new(JobStatus::Completed);
        done.download_url = Some("/download/abc.mp4".into());
        job.apply(&done);
        assert_eq!(job.download_ref.as_deref(), Some("/download/abc.mp4"));
    }

    #[test]
    fn test_filename_is_sticky() {
        let mut job = Job::new("abc");
        let mut first = StatusReport::new(JobStatus::Uploaded);
        first.filename = Some("demo".into());
        job.apply(&first);
        job.apply(&StatusReport::new(JobStatus::Transcribing));
        assert_eq!(job.filename.as_deref(), Some("demo"));
    }

    #[test]
    fn test_terminal_outcome_mapping() {
        assert_eq!(
            TerminalOutcome::from_status(JobStatus::Completed),
            Some(TerminalOutcome::Completed)
        );
        assert_eq!(
            TerminalOutcome::from_status(JobStatus::CompletedSrtOnly),
            Some(TerminalOutcome::PartialCompleted)
        );
        assert_eq!(
            TerminalOutcome::from_status(JobStatus::Failed),
            Some(TerminalOutcome::Failed)
        );
        assert_eq!(TerminalOutcome::from_status(JobStatus::Uploaded), None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(LifecycleState::Terminal(TerminalOutcome::Expired)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "terminal", "outcome": "expired" })
        );
        let json = serde_json::to_value(LifecycleState::Idle).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "idle" }));
    }
}
