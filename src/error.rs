use serde::Serialize;
use thiserror::Error;

/// User-friendly error presentation for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Coarse error family, used by hosts to decide how to present and recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Local file checks; never reached the network.
    Validation,
    /// No usable response (network failure or timeout).
    Transport,
    /// The service answered, but not with what we needed.
    Service,
    /// The service no longer knows the job.
    JobExpired,
    /// The service reported a terminal processing failure.
    JobFailed,
    /// Misuse of the client itself (illegal transition, busy, config).
    Local,
}

/// Reasons a candidate file is rejected before upload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Unsupported media type: {media_type}")]
    UnsupportedType { media_type: String },

    #[error("File is {size} bytes, limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("File is empty")]
    Empty,

    #[error("Label is empty after sanitization")]
    InvalidLabel,
}

/// Server-side upload rejection reason, classified from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// HTTP 413.
    TooLarge,
    /// HTTP 507.
    StorageFull,
    /// HTTP 400.
    BadFormat,
    /// Any other non-2xx status.
    Status(u16),
}

impl RejectReason {
    pub fn from_status(code: u16) -> Self {
        match code {
            413 => RejectReason::TooLarge,
            507 => RejectReason::StorageFull,
            400 => RejectReason::BadFormat,
            other => RejectReason::Status(other),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RejectReason::TooLarge => 413,
            RejectReason::StorageFull => 507,
            RejectReason::BadFormat => 400,
            RejectReason::Status(code) => *code,
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    // ── Validation ────────────────────────────────────────────────────────────
    #[error("Invalid file: {0}")]
    Validation(#[from] ValidationError),

    // ── Transport ─────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Upload timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Service ───────────────────────────────────────────────────────────────
    #[error("Server rejected request ({}): {}", .reason.status_code(), .message.as_deref().unwrap_or("no details"))]
    ServerRejected {
        reason: RejectReason,
        message: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // ── Job ───────────────────────────────────────────────────────────────────
    #[error("Job {job_id} expired or not found")]
    JobExpired { job_id: String },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    // ── Local control ─────────────────────────────────────────────────────────
    #[error("An upload is already in progress")]
    UploadInProgress,

    #[error("Polling is already active for job {active_job}")]
    PollerBusy { active_job: String },

    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: String, action: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Maps the error onto the user-facing taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Validation(_) => ErrorCategory::Validation,
            AppError::Network(_) | AppError::Timeout { .. } => ErrorCategory::Transport,
            AppError::ServerRejected { .. } | AppError::InvalidResponse(_) => {
                ErrorCategory::Service
            }
            AppError::JobExpired { .. } => ErrorCategory::JobExpired,
            AppError::JobFailed { .. } => ErrorCategory::JobFailed,
            AppError::UploadInProgress
            | AppError::PollerBusy { .. }
            | AppError::InvalidTransition { .. }
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorCategory::Local,
        }
    }

    /// Transport and service failures may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Service
        )
    }

    /// Converts the error into a user-friendly presentation suitable for UI display.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Validation ────────────────────────────────────────────────────
            AppError::Validation(ValidationError::UnsupportedType { .. }) => ErrorPresentation {
                title: "Invalid File Type".into(),
                message: "Please upload MP4, MOV, AVI, MKV, or WebM video.".into(),
                action: Some("Choose a different file".into()),
            },

            AppError::Validation(ValidationError::TooLarge { max, .. }) => ErrorPresentation {
                title: "File Too Large".into(),
                message: format!("Maximum size is {}MB.", max / (1024 * 1024)),
                action: Some("Choose a smaller file".into()),
            },

            AppError::Validation(ValidationError::Empty) => ErrorPresentation {
                title: "Empty File".into(),
                message: "The selected file contains no data.".into(),
                action: Some("Choose a different file".into()),
            },

            AppError::Validation(ValidationError::InvalidLabel) => ErrorPresentation {
                title: "Invalid Name".into(),
                message: "The name must contain letters, digits, spaces, dashes or underscores."
                    .into(),
                action: Some("Enter a different name".into()),
            },

            // ── Transport ─────────────────────────────────────────────────────
            AppError::Network(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the captioning service. Please check your internet connection.".into(),
                action: Some("Check network and retry".into()),
            },

            AppError::Timeout { timeout_secs } => ErrorPresentation {
                title: "Upload Timed Out".into(),
                message: format!(
                    "The upload did not finish within {} minutes.",
                    (timeout_secs / 60).max(1)
                ),
                action: Some("Retry the upload".into()),
            },

            // ── Service ───────────────────────────────────────────────────────
            AppError::ServerRejected { reason, message } => {
                let fallback = match reason {
                    RejectReason::TooLarge => "The server refused the file because it is too large.".to_string(),
                    RejectReason::StorageFull => "The server is out of temporary storage. Please try again later.".to_string(),
                    RejectReason::BadFormat => "The server could not read the uploaded file.".to_string(),
                    RejectReason::Status(code) => format!("The server answered with HTTP {}.", code),
                };
                ErrorPresentation {
                    title: "Upload Rejected".into(),
                    message: message.clone().unwrap_or(fallback),
                    action: Some("Review the file and try again".into()),
                }
            }

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: "The captioning service returned a response we could not understand."
                    .into(),
                action: Some("Try again".into()),
            },

            // ── Job ───────────────────────────────────────────────────────────
            AppError::JobExpired { .. } => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Job expired or not found. Please try uploading again.".into(),
                action: Some("Start over".into()),
            },

            AppError::JobFailed { message, .. } => ErrorPresentation {
                title: "Processing Failed".into(),
                message: message.clone(),
                action: Some("Try again".into()),
            },

            // ── Local control ─────────────────────────────────────────────────
            AppError::UploadInProgress => ErrorPresentation {
                title: "Upload In Progress".into(),
                message: "Please wait for the current upload to finish.".into(),
                action: None,
            },

            AppError::PollerBusy { .. } | AppError::InvalidTransition { .. } => {
                ErrorPresentation {
                    title: "Action Unavailable".into(),
                    message: "That action is not available right now.".into(),
                    action: None,
                }
            }

            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: msg.clone(),
                action: Some("Fix the configuration and restart".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
