//! Remote captioning service: wire types, the client seam and the three
//! coordinators built on it (upload, status polling, cleanup).
//!
//! The service exposes four endpoints relative to a configured base URL:
//!
//! - `POST upload` (multipart `video` + `filename`) answers `{ "job_id": .. }`
//! - `GET status/{job_id}` answers a [`StatusReport`], or 404 once expired
//! - `POST cleanup/{job_id}` frees the job's temporary storage
//! - `GET {download_url}` streams the produced artifact

pub mod cleanup;
pub mod client;
pub mod poller;
pub mod upload;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::validation::CandidateFile;

pub use cleanup::{CleanupDispatcher, CleanupOutcome};
pub use client::{CaptionApiClient, HealthReport};
pub use poller::{JobStatusPoller, PollSnapshot, PollUpdate, PollingState};
pub use upload::{UploadCoordinator, UploadGate};

// ─────────────────────────────────────────────────────────────────────────────
// Job Status
// ─────────────────────────────────────────────────────────────────────────────

/// Processing stage reported by the service.
///
/// Unrecognized values deserialize to [`JobStatus::Unknown`] so a newer
/// service never breaks polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Transcribing,
    GeneratingCaptions,
    EmbeddingSubtitles,
    Completed,
    /// Captions were generated but could not be burned into the video.
    CompletedSrtOnly,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Fixed progress projection. `failed` projects to 100.
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Uploaded => 10,
            JobStatus::Transcribing => 30,
            JobStatus::GeneratingCaptions => 60,
            JobStatus::EmbeddingSubtitles => 80,
            JobStatus::Completed | JobStatus::CompletedSrtOnly | JobStatus::Failed => 100,
            JobStatus::Unknown => 50,
        }
    }

    /// Statuses after which the service never reports anything new.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedSrtOnly | JobStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Transcribing => "transcribing",
            JobStatus::GeneratingCaptions => "generating_captions",
            JobStatus::EmbeddingSubtitles => "embedding_subtitles",
            JobStatus::Completed => "completed",
            JobStatus::CompletedSrtOnly => "completed_srt_only",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a successful `GET status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Service-side progress. Informational; the static projection wins.
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub filename: Option<String>,
    /// Present only when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// Present only when `status` is `completed`.
    #[serde(default)]
    pub download_url: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: Some(status.progress() as u32),
            filename: None,
            error: None,
            download_url: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prepared Upload
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the upload request needs, detached from the candidate's
/// preview resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
    /// Sanitized label sent as the `filename` field.
    pub label: String,
}

impl PreparedUpload {
    pub fn new(file: &CandidateFile, label: &str) -> Self {
        Self {
            path: file.path.clone(),
            file_name: file.file_name.clone(),
            media_type: file.media_type.clone(),
            size: file.size,
            label: label.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Operations against the captioning service, allowing test fakes.
pub trait CaptionServiceOps: Send + Sync + Clone + 'static {
    /// Uploads a file and returns the job identifier.
    fn upload<'a>(
        &'a self,
        upload: &'a PreparedUpload,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

    /// Fetches the job's status. A 404 is reported as `AppError::JobExpired`.
    fn fetch_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StatusReport, AppError>> + Send + 'a>>;

    /// Asks the service to free the job's temporary storage.
    fn cleanup<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Streams the produced artifact to `dest`, returning the bytes written.
    fn fetch_artifact<'a>(
        &'a self,
        download_ref: &'a str,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves a `download_url` against the base URL.
///
/// Service paths such as `/download/abc.mp4` are appended to the base path
/// rather than replacing it; absolute URLs are used as-is.
pub fn resolve_download_url(base_url: &Url, download_ref: &str) -> Result<Url, AppError> {
    base_url
        .join(download_ref.trim_start_matches('/'))
        .map_err(|e| AppError::InvalidResponse(format!("Invalid download reference: {}", e)))
}

/// Redacts a job ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_projection() {
        assert_eq!(JobStatus::Uploaded.progress(), 10);
        assert_eq!(JobStatus::Transcribing.progress(), 30);
        assert_eq!(JobStatus::GeneratingCaptions.progress(), 60);
        assert_eq!(JobStatus::EmbeddingSubtitles.progress(), 80);
        assert_eq!(JobStatus::Completed.progress(), 100);
        assert_eq!(JobStatus::CompletedSrtOnly.progress(), 100);
        assert_eq!(JobStatus::Failed.progress(), 100);
        assert_eq!(JobStatus::Unknown.progress(), 50);
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = [
            JobStatus::Uploaded,
            JobStatus::Transcribing,
            JobStatus::GeneratingCaptions,
            JobStatus::EmbeddingSubtitles,
            JobStatus::Completed,
            JobStatus::CompletedSrtOnly,
            JobStatus::Failed,
            JobStatus::Unknown,
        ]
        .into_iter()
        .filter(JobStatus::is_terminal)
        .collect();

        assert_eq!(
            terminal,
            vec![
                JobStatus::Completed,
                JobStatus::CompletedSrtOnly,
                JobStatus::Failed
            ]
        );
    }

    #[test]
    fn test_status_report_deserialization() {
        let report: StatusReport = serde_json::from_value(serde_json::json!({
            "status": "completed",
            "progress": 100,
            "filename": "demo",
            "download_url": "/download/abc.mp4"
        }))
        .unwrap();

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.download_url.as_deref(), Some("/download/abc.mp4"));
        assert_eq!(report.error, None);
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let report: StatusReport =
            serde_json::from_value(serde_json::json!({ "status": "queued" })).unwrap();
        assert_eq!(report.status, JobStatus::Unknown);
        assert_eq!(report.progress, None);
    }

    #[test]
    fn test_resolve_download_url_keeps_base_path() {
        let base = Url::parse("https://api.example.com/capvid/").unwrap();
        assert_eq!(
            resolve_download_url(&base, "/download/abc.mp4")
                .unwrap()
                .as_str(),
            "https://api.example.com/capvid/download/abc.mp4"
        );
        assert_eq!(
            resolve_download_url(&base, "https://cdn.example.com/x.mp4")
                .unwrap()
                .as_str(),
            "https://cdn.example.com/x.mp4"
        );
    }

    #[test]
    fn test_redact_id() {
        assert_eq!(redact_id("abc"), "abc");
        assert_eq!(redact_id("12345678"), "12345678");
        assert_eq!(
            redact_id("3f2a9c1e-7b44-4f0e-9d55-0d6f1a2b3c4d"),
            "3f2a9c1e..."
        );
    }
}
