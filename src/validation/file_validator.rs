//! Local policy checks applied to a candidate before it may be uploaded.
//!
//! Validation is pure: it looks only at the already-probed [`CandidateFile`]
//! and the label, never at the network or the disk. Checks run in a fixed
//! order and stop at the first failure:
//!
//! 1. media type is on the allow-list
//! 2. size does not exceed the ceiling
//! 3. size is non-zero
//! 4. the sanitized label is non-empty

use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ValidationError;
use crate::validation::candidate::CandidateFile;
use crate::validation::media_type::{
    MIME_AVI, MIME_MATROSKA, MIME_MP4, MIME_QUICKTIME, MIME_WEBM,
};

/// Container formats the service accepts.
pub const ALLOWED_MEDIA_TYPES: &[&str] = &[
    MIME_MP4,
    MIME_QUICKTIME,
    MIME_AVI,
    MIME_MATROSKA,
    MIME_WEBM,
];

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedUpload {
    /// Label sent alongside the file, restricted to `[A-Za-z0-9\-_ ]`.
    pub label: String,
}

/// Validates candidate files against the configured size ceiling.
#[derive(Debug, Clone, Copy)]
pub struct FileValidator {
    max_file_size: u64,
}

impl FileValidator {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_file_size)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Validates a file and the label to send with it.
    ///
    /// When `label` is `None` the label is derived from the file name stem.
    pub fn validate(
        &self,
        file: &CandidateFile,
        label: Option<&str>,
    ) -> Result<ValidatedUpload, ValidationError> {
        if !ALLOWED_MEDIA_TYPES.contains(&file.media_type.as_str()) {
            return Err(ValidationError::UnsupportedType {
                media_type: file.media_type.clone(),
            });
        }

        if file.size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size: file.size,
                max: self.max_file_size,
            });
        }

        if file.size == 0 {
            return Err(ValidationError::Empty);
        }

        let raw = label.unwrap_or_else(|| file.stem());
        let label = sanitize_label(raw);
        if label.is_empty() {
            return Err(ValidationError::InvalidLabel);
        }

        Ok(ValidatedUpload { label })
    }
}

/// Strips every character outside `[A-Za-z0-9\-_ ]` and trims surrounding
/// spaces.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}
