//! Client for the Capvid captioning service.
//!
//! Drives one video from file selection through upload, status polling and
//! download, and makes sure the service is told to clean up on every way
//! out. Hosts talk to [`lifecycle::LifecycleController`] only.

pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod presentation;
pub mod service;
pub mod validation;

pub use config::ClientConfig;
pub use error::{AppError, ErrorCategory, ErrorPresentation};
pub use lifecycle::{Job, LifecycleController, LifecycleState, TerminalOutcome};
