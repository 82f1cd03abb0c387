//! Command-line host.
//!
//! Stands in for the browser front end: it drives one
//! [`LifecycleController`](crate::lifecycle::LifecycleController) from file
//! selection to cleanup and renders progress on the terminal.

pub mod caption;
pub mod health;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{parse_base_url, ClientConfig};
use crate::error::AppError;

pub use caption::CaptionArgs;

#[derive(Parser, Debug)]
#[command(
    name = "capvid",
    version,
    about = "Add generated subtitles to a video using a Capvid service"
)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a video, wait for captioning and download the result
    Caption(CaptionArgs),
    /// Check that the service is reachable
    Health,
}

/// Flags that take precedence over the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Service base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Milliseconds between status requests
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Seconds before an upload is abandoned
    #[arg(long, global = true)]
    pub upload_timeout_secs: Option<u64>,

    /// Largest accepted video, in bytes
    #[arg(long, global = true)]
    pub max_file_size_bytes: Option<u64>,

    /// Milliseconds between a download and its cleanup
    #[arg(long, global = true)]
    pub download_grace_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Applies the flags that were given on top of `config`.
    pub fn apply(&self, mut config: ClientConfig) -> Result<ClientConfig, AppError> {
        if let Some(raw) = &self.base_url {
            config.base_url = parse_base_url(raw)?;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.upload_timeout_secs {
            config.upload_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = self.max_file_size_bytes {
            config.max_file_size = bytes;
        }
        if let Some(ms) = self.download_grace_ms {
            config.download_grace = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Resolves configuration and runs the selected command.
pub async fn run(cli: Cli) -> Result<(), AppError> {
    let config = cli.overrides.apply(ClientConfig::from_env()?)?;

    match cli.command {
        Command::Caption(args) => caption::run(config, args).await,
        Command::Health => health::run(config).await,
    }
}
