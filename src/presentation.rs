//! Presentation-model projections.
//!
//! Turns controller state into the texts, steps and flags a host shows.
//! Nothing here renders; hosts decide how to draw it.

use serde::Serialize;

use crate::lifecycle::{Job, LifecycleState};
use crate::service::JobStatus;

const DEFAULT_FAILURE_MESSAGE: &str = "An error occurred during processing.";

/// Headline for the current job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub title: &'static str,
    pub message: String,
    pub progress: u8,
    /// Extra line shown under the message for partial results.
    pub note: Option<&'static str>,
}

impl StatusView {
    /// Projects a status (and, for failures, its message) onto display text.
    ///
    /// A job with no status yet is shown as generic processing.
    pub fn for_status(status: Option<JobStatus>, error: Option<&str>) -> Self {
        let (title, message, note) = match status {
            Some(JobStatus::Uploaded) => (
                "Video Uploaded",
                "Preparing to process your video...".to_string(),
                None,
            ),
            Some(JobStatus::Transcribing) => (
                "Transcribing Audio",
                "Converting speech to text using AI...".to_string(),
                None,
            ),
            Some(JobStatus::GeneratingCaptions) => (
                "Generating Subtitles",
                "Creating subtitle file from transcription...".to_string(),
                None,
            ),
            Some(JobStatus::EmbeddingSubtitles) => (
                "Adding Subtitles to Video",
                "Embedding subtitles into your video...".to_string(),
                None,
            ),
            Some(JobStatus::Completed) => (
                "Processing Complete",
                "Your video with subtitles is ready to download!".to_string(),
                None,
            ),
            Some(JobStatus::CompletedSrtOnly) => (
                "Video Processing Failed",
                "Unable to embed subtitles into video. Please try again with a different video format."
                    .to_string(),
                Some("Video processing encountered issues. Please try uploading again."),
            ),
            Some(JobStatus::Failed) => (
                "Processing Failed",
                error.unwrap_or(DEFAULT_FAILURE_MESSAGE).to_string(),
                None,
            ),
            Some(JobStatus::Unknown) | None => {
                ("Processing", "Working on your video...".to_string(), None)
            }
        };

        Self {
            title,
            message,
            progress: status.map_or(JobStatus::Unknown.progress(), |s| s.progress()),
            note,
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::for_status(job.status, job.error.as_deref())
    }
}

/// One row of the processing checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStep {
    pub label: &'static str,
    pub completed: bool,
    pub active: bool,
}

/// The five processing steps and how far `status` has got through them.
pub fn processing_steps(status: Option<JobStatus>) -> [ProcessStep; 5] {
    use JobStatus::*;

    let is = |wanted: &[JobStatus]| status.is_some_and(|s| wanted.contains(&s));

    [
        ProcessStep {
            label: "Upload",
            completed: true,
            active: false,
        },
        ProcessStep {
            label: "Transcribe Audio",
            completed: is(&[
                Transcribing,
                GeneratingCaptions,
                EmbeddingSubtitles,
                Completed,
                CompletedSrtOnly,
            ]),
            active: is(&[Transcribing]),
        },
        ProcessStep {
            label: "Generate Subtitles",
            completed: is(&[
                GeneratingCaptions,
                EmbeddingSubtitles,
                Completed,
                CompletedSrtOnly,
            ]),
            active: is(&[GeneratingCaptions]),
        },
        ProcessStep {
            label: "Embed Subtitles",
            completed: is(&[EmbeddingSubtitles, Completed]),
            active: is(&[EmbeddingSubtitles]),
        },
        ProcessStep {
            label: "Complete Processing",
            completed: is(&[Completed, CompletedSrtOnly]),
            active: false,
        },
    ]
}

/// Whether the "download video" action is shown.
pub fn offers_download(job: Option<&Job>) -> bool {
    job.is_some_and(|job| job.status == Some(JobStatus::Completed) && job.download_ref.is_some())
}

/// Whether the "process another video" action is shown.
pub fn offers_reset(state: LifecycleState) -> bool {
    state.is_terminal()
}

/// Formats a byte count the way the upload form shows it.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} bytes", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
