//! HTTP client for the captioning service.
//!
//! This module provides functionality to:
//! - Stream-upload a video as multipart form data without buffering it
//! - Fetch job status, mapping 404 to an expired job
//! - Signal cleanup of a job's temporary storage
//! - Stream-download the produced artifact to disk
//! - Check service health
//!
//! # Logging
//!
//! Only method, path and status code are logged. Job IDs are redacted and
//! file contents are never logged.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{AppError, RejectReason};
use crate::service::{
    redact_id, resolve_download_url, CaptionServiceOps, PreparedUpload, StatusReport,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all service requests.
const CLIENT_USER_AGENT: &str = concat!("capvid-client/", env!("CARGO_PKG_VERSION"));

/// Multipart field carrying the video bytes.
const FIELD_VIDEO: &str = "video";

/// Multipart field carrying the sanitized label.
const FIELD_LABEL: &str = "filename";

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    job_id: Option<String>,
}

/// Error body the service attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// CaptionApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the captioning service endpoints.
#[derive(Clone)]
pub struct CaptionApiClient {
    client: Arc<Client>,
    /// Service base URL, always ending in `/`.
    base_url: Url,
    /// Timeout for status, cleanup and health requests. Uploads and
    /// downloads are bounded by their callers instead.
    request_timeout: Duration,
}

impl CaptionApiClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - Service base URL
    /// * `request_timeout` - Timeout for short requests
    pub fn new(client: Arc<Client>, base_url: Url, request_timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            request_timeout,
        }
    }

    /// Builds the HTTP client and wires it to the configured service.
    pub fn from_config(config: &ClientConfig) -> Result<Self, AppError> {
        let http = build_http_client()?;
        Ok(Self::new(
            Arc::new(http),
            config.base_url.clone(),
            config.request_timeout,
        ))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Uploads the video via a streaming multipart POST.
    ///
    /// # Returns
    ///
    /// The job ID assigned by the service.
    ///
    /// # Errors
    ///
    /// - `AppError::Network` - No response was received
    /// - `AppError::ServerRejected` - Non-2xx response, classified by status
    /// - `AppError::InvalidResponse` - 2xx without a `job_id`
    pub async fn upload(&self, upload: &PreparedUpload) -> Result<String, AppError> {
        let url = self.endpoint(&["upload"])?;

        let file = File::open(&upload.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to open video file: {}", e)))?;
        let body = Body::wrap_stream(ReaderStream::new(file));

        let part = Part::stream_with_length(body, upload.size)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.media_type)
            .map_err(|e| AppError::Internal(format!("Invalid media type: {}", e)))?;
        let form = Form::new()
            .part(FIELD_VIDEO, part)
            .text(FIELD_LABEL, upload.label.clone());

        info!(
            "[UPLOAD] POST /upload ({} bytes, {})",
            upload.size, upload.media_type
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Upload failed: {}", e)))?;

        let status = response.status();
        info!("[UPLOAD] POST /upload -> {}", status.as_u16());

        if !status.is_success() {
            return Err(AppError::ServerRejected {
                reason: RejectReason::from_status(status.as_u16()),
                message: read_error_message(response).await,
            });
        }

        let body: UploadResponse = response.json().await.map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse upload response: {}", e))
        })?;

        match body.job_id {
            Some(job_id) if !job_id.trim().is_empty() => Ok(job_id),
            _ => Err(AppError::InvalidResponse(
                "Upload response did not contain a job_id".to_string(),
            )),
        }
    }

    /// Gets the current status of a job.
    ///
    /// # Errors
    ///
    /// - `AppError::JobExpired` - The service answered 404
    /// - `AppError::ServerRejected` - Any other non-2xx response
    /// - `AppError::InvalidResponse` - Unparseable body
    /// - `AppError::Network` - No response was received
    pub async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, AppError> {
        let url = self.endpoint(&["status", job_id])?;

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Status request failed: {}", e)))?;

        let status = response.status();
        info!(
            "[POLL] GET /status/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::JobExpired {
                job_id: job_id.to_string(),
            });
        }

        if !status.is_success() {
            return Err(AppError::ServerRejected {
                reason: RejectReason::Status(status.as_u16()),
                message: read_error_message(response).await,
            });
        }

        response.json().await.map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse status response: {}", e))
        })
    }

    /// Signals the service to free a job's temporary storage.
    pub async fn cleanup(&self, job_id: &str) -> Result<(), AppError> {
        let url = self.endpoint(&["cleanup", job_id])?;

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Cleanup request failed: {}", e)))?;

        let status = response.status();
        info!(
            "[CLEANUP] POST /cleanup/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(AppError::ServerRejected {
                reason: RejectReason::Status(status.as_u16()),
                message: read_error_message(response).await,
            });
        }

        Ok(())
    }

    /// Downloads the artifact behind `download_ref` to `dest`.
    ///
    /// The body is streamed into a temporary file beside `dest`, which is
    /// only moved into place once the whole body has been written.
    pub async fn fetch_artifact(&self, download_ref: &str, dest: &Path) -> Result<u64, AppError> {
        let url = resolve_download_url(&self.base_url, download_ref)?;
        let log_path = url.path().to_string();

        info!("[DOWNLOAD] GET {}", log_path);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Download failed: {}", e)))?;

        let status = response.status();
        info!("[DOWNLOAD] GET {} -> {}", log_path, status.as_u16());

        if !status.is_success() {
            return Err(AppError::ServerRejected {
                reason: RejectReason::Status(status.as_u16()),
                message: read_error_message(response).await,
            });
        }

        let parent_dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create output directory: {}", e)))?;

        let temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {}", e)))?;
        let std_file = temp_file
            .reopen()
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {}", e)))?;
        let mut async_file = File::from_std(std_file);

        let mut stream = response.bytes_stream();
        let mut total_bytes = 0u64;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                AppError::Network(format!("Error reading download stream: {}", e))
            })?;
            async_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Error writing to file: {}", e)))?;
            total_bytes += chunk.len() as u64;
        }

        async_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to flush output file: {}", e)))?;
        async_file
            .sync_all()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to sync output file: {}", e)))?;

        temp_file
            .persist(dest)
            .map_err(|e| AppError::Internal(format!("Failed to persist download: {}", e)))?;

        info!("[DOWNLOAD] {} complete: {} bytes", log_path, total_bytes);
        Ok(total_bytes)
    }

    /// Checks that the service is reachable and healthy.
    pub async fn health(&self) -> Result<HealthReport, AppError> {
        let url = self.endpoint(&[])?;

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Health check failed: {}", e)))?;

        let status = response.status();
        info!("[HEALTH] GET / -> {}", status.as_u16());

        if !status.is_success() {
            return Err(AppError::ServerRejected {
                reason: RejectReason::Status(status.as_u16()),
                message: read_error_message(response).await,
            });
        }

        response.json().await.map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse health response: {}", e))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Appends percent-encoded segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        if segments.is_empty() {
            return Ok(url);
        }
        url.path_segments_mut()
            .map_err(|_| AppError::Config("Base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl CaptionServiceOps for CaptionApiClient {
    fn upload<'a>(
        &'a self,
        upload: &'a PreparedUpload,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(CaptionApiClient::upload(self, upload))
    }

    fn fetch_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StatusReport, AppError>> + Send + 'a>> {
        Box::pin(CaptionApiClient::fetch_status(self, job_id))
    }

    fn cleanup<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(CaptionApiClient::cleanup(self, job_id))
    }

    fn fetch_artifact<'a>(
        &'a self,
        download_ref: &'a str,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>> {
        Box::pin(CaptionApiClient::fetch_artifact(self, download_ref, dest))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the optional `error` field from a non-2xx body.
async fn read_error_message(response: Response) -> Option<String> {
    response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
