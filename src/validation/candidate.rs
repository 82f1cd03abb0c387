//! Upload candidates: a probed file, an optional user label, and the
//! preview resource the host allocated for it.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::AppError;
use crate::validation::media_type::{self, SNIFF_LEN};

// ─────────────────────────────────────────────────────────────────────────────
// CandidateFile
// ─────────────────────────────────────────────────────────────────────────────

/// What validation knows about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Location on disk. Empty for descriptors built without probing.
    pub path: PathBuf,
    /// Original file name, used as the multipart file name.
    pub file_name: String,
    /// MIME type detected from the header.
    pub media_type: String,
    /// Size in bytes.
    pub size: u64,
}

impl CandidateFile {
    /// Builds a descriptor from already-known facts.
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, size: u64) -> Self {
        let file_name = file_name.into();
        Self {
            path: PathBuf::from(&file_name),
            file_name,
            media_type: media_type.into(),
            size,
        }
    }

    /// Reads the file's size and header to build a descriptor.
    pub async fn probe(path: &Path) -> Result<Self, AppError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read file metadata: {}", e)))?;

        if !metadata.is_file() {
            return Err(AppError::Internal(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let size = metadata.len();
        let mut header = vec![0u8; (size as usize).min(SNIFF_LEN)];

        let mut file = File::open(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to open file: {}", e)))?;
        file.read_exact(&mut header)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read file header: {}", e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            file_name: file_name.clone(),
            media_type: media_type::detect(&file_name, &header).to_string(),
            size,
        })
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.file_name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PreviewHandle
// ─────────────────────────────────────────────────────────────────────────────

/// A host-allocated preview resource for the selected file.
///
/// The release action runs exactly once: on [`PreviewHandle::release`] or,
/// failing that, on drop.
pub struct PreviewHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PreviewHandle {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Releases the resource now.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("held", &self.release.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadCandidate
// ─────────────────────────────────────────────────────────────────────────────

/// A file selected for upload, never persisted beyond the upload attempt.
#[derive(Debug)]
pub struct UploadCandidate {
    pub file: CandidateFile,
    /// User-supplied label; the file stem is used when absent.
    pub label: Option<String>,
    preview: Option<PreviewHandle>,
}

impl UploadCandidate {
    pub fn new(file: CandidateFile) -> Self {
        Self {
            file,
            label: None,
            preview: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a preview resource, releasing any previous one.
    pub fn with_preview(mut self, preview: PreviewHandle) -> Self {
        self.release_preview();
        self.preview = Some(preview);
        self
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Releases the preview if one is still held. Returns whether anything
    /// was released.
    pub fn release_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(preview) => {
                preview.release();
                true
            }
            None => false,
        }
    }
}
