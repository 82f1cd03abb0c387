//! Client configuration.
//!
//! A single explicit structure handed to the lifecycle controller at
//! construction. Defaults mirror the reference deployment; every field can be
//! overridden through environment variables (optionally from a `.env` file).

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Service host used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";

/// Interval between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upload-wide timeout (5 minutes).
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Maximum accepted file size (250 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 250 * 1024 * 1024;

/// Delay between a download action and the cleanup it triggers.
pub const DEFAULT_DOWNLOAD_GRACE: Duration = Duration::from_secs(3);

/// Per-request timeout for status, cleanup and health requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on an awaited cleanup before reset proceeds anyway.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

// Environment variable names.
const ENV_BASE_URL: &str = "CAPVID_API_BASE_URL";
const ENV_POLL_INTERVAL_MS: &str = "CAPVID_POLL_INTERVAL_MS";
const ENV_UPLOAD_TIMEOUT_SECS: &str = "CAPVID_UPLOAD_TIMEOUT_SECS";
const ENV_MAX_FILE_SIZE_BYTES: &str = "CAPVID_MAX_FILE_SIZE_BYTES";
const ENV_DOWNLOAD_GRACE_MS: &str = "CAPVID_DOWNLOAD_GRACE_MS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "CAPVID_REQUEST_TIMEOUT_SECS";
const ENV_CLEANUP_TIMEOUT_SECS: &str = "CAPVID_CLEANUP_TIMEOUT_SECS";

// ─────────────────────────────────────────────────────────────────────────────
// ClientConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for one lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Remote captioning service host.
    pub base_url: Url,
    /// Fixed interval between status requests.
    pub poll_interval: Duration,
    /// Upload-wide timeout; the request is cancelled when it elapses.
    pub upload_timeout: Duration,
    /// Size ceiling enforced by local validation.
    pub max_file_size: u64,
    /// Grace delay between download and cleanup.
    pub download_grace: Duration,
    /// Timeout applied to individual status/cleanup/health requests.
    pub request_timeout: Duration,
    /// Bound on awaited cleanup during reset.
    pub cleanup_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            download_grace: DEFAULT_DOWNLOAD_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Creates a config with defaults for everything but the base URL.
    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Loads configuration from the environment.
    ///
    /// Reads a `.env` file if present, then the `CAPVID_*` variables. Unset
    /// variables fall back to defaults; set but malformed ones are errors.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = match lookup(ENV_BASE_URL) {
            Some(raw) => parse_base_url(&raw)?,
            None => defaults.base_url,
        };

        let poll_interval = read_number(&lookup, ENV_POLL_INTERVAL_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let upload_timeout = read_number(&lookup, ENV_UPLOAD_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_timeout);
        let max_file_size =
            read_number(&lookup, ENV_MAX_FILE_SIZE_BYTES)?.unwrap_or(defaults.max_file_size);
        let download_grace = read_number(&lookup, ENV_DOWNLOAD_GRACE_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.download_grace);
        let request_timeout = read_number(&lookup, ENV_REQUEST_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let cleanup_timeout = read_number(&lookup, ENV_CLEANUP_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cleanup_timeout);

        let config = Self {
            base_url,
            poll_interval,
            upload_timeout,
            max_file_size,
            download_grace,
            request_timeout,
            cleanup_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the lifecycle cannot work with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.poll_interval.is_zero() {
            return Err(AppError::Config("poll interval must be non-zero".into()));
        }
        if self.upload_timeout.is_zero() {
            return Err(AppError::Config("upload timeout must be non-zero".into()));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config("max file size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Parses the base URL, requiring http(s) and a trailing slash so that
/// relative joins keep any path prefix.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&normalized)
        .map_err(|e| AppError::Config(format!("invalid base URL '{}': {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Config(format!(
            "unsupported base URL scheme '{}'",
            other
        ))),
    }
}

fn read_number<F>(lookup: &F, key: &str) -> Result<Option<u64>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be a whole number, got '{}'", key, raw))),
    }
}
