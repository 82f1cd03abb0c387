//! Local validation of upload candidates.
//!
//! Detects the container type from file headers and applies the upload
//! policy (type allow-list, size ceiling, non-empty file, usable label)
//! before anything reaches the network.

pub mod candidate;
pub mod file_validator;
pub mod media_type;

pub use candidate::{CandidateFile, PreviewHandle, UploadCandidate};
pub use file_validator::{sanitize_label, FileValidator, ValidatedUpload, ALLOWED_MEDIA_TYPES};
