//! `capvid caption`: one video through the whole lifecycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::lifecycle::{LifecycleController, LifecycleState, TerminalOutcome};
use crate::presentation::{format_file_size, processing_steps, StatusView};
use crate::service::CaptionServiceOps;
use crate::validation::{CandidateFile, UploadCandidate};

#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Video to caption (MP4, MOV, AVI, MKV or WebM)
    pub file: PathBuf,

    /// Display label sent with the upload; defaults to the file name
    #[arg(short, long)]
    pub label: Option<String>,

    /// Where to save the captioned video; defaults to the service's file
    /// name in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Runs the caption flow until it finishes or the user interrupts it.
pub async fn run(config: ClientConfig, args: CaptionArgs) -> Result<(), AppError> {
    let drain_window = config.download_grace + config.cleanup_timeout;
    let mut controller = LifecycleController::connect(config)?;
    let cleanup = controller.cleanup().clone();
    let bar = ProgressBar::new(100);

    let result = tokio::select! {
        result = drive(&mut controller, &args, &bar) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match result {
        Some(result) => {
            // A completed download already queued a delayed cleanup; this one
            // goes out now and the delayed one repeats it harmlessly.
            let outcome = controller.reset().await;
            debug!("[LIFECYCLE] Final cleanup: {:?}", outcome);
            result
        }
        None => {
            bar.abandon_with_message("Interrupted");
            warn!("[LIFECYCLE] Interrupted, abandoning job");
            // Same path as a closed page: stop polling, queue cleanup.
            controller.teardown();
            Err(AppError::Internal("Interrupted".to_string()))
        }
    };

    cleanup.drain(drain_window).await;

    result.map(|saved| {
        println!("{}", saved.display());
    })
}

/// Selects, submits, follows and downloads one video.
///
/// Returns where the captioned video was saved.
pub async fn drive<C: CaptionServiceOps>(
    controller: &mut LifecycleController<C>,
    args: &CaptionArgs,
    bar: &ProgressBar,
) -> Result<PathBuf, AppError> {
    let file = CandidateFile::probe(&args.file).await?;
    let size = file.size;

    let mut candidate = UploadCandidate::new(file);
    if let Some(label) = &args.label {
        candidate = candidate.with_label(label.clone());
    }
    let validated = controller.select_file(candidate)?;

    bar.set_style(progress_style());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(format!(
        "Uploading '{}' ({})",
        validated.label,
        format_file_size(size)
    ));

    controller.submit().await?;
    render(controller, bar);

    while controller.state().is_tracking() {
        controller.next_update().await?;
        render(controller, bar);
    }

    match controller.state() {
        LifecycleState::Terminal(TerminalOutcome::Completed) => {
            bar.finish_with_message("Processing Complete");
            let dest = match &args.output {
                Some(path) => path.clone(),
                None => default_output(controller),
            };
            let bytes = controller.download_to(&dest).await?;
            eprintln!("Saved {} ({})", dest.display(), format_file_size(bytes));
            Ok(dest)
        }
        state => {
            let view = controller.job().map(StatusView::for_job);
            bar.abandon_with_message(
                view.as_ref()
                    .map_or_else(|| state.to_string(), |v| v.title.to_string()),
            );
            if let Some(note) = view.as_ref().and_then(|v| v.note) {
                eprintln!("{}", note);
            }
            Err(terminal_error(controller, view))
        }
    }
}

fn render<C: CaptionServiceOps>(controller: &LifecycleController<C>, bar: &ProgressBar) {
    let Some(job) = controller.job() else {
        return;
    };

    let view = StatusView::for_job(job);
    let step = processing_steps(job.status)
        .iter()
        .filter(|step| step.completed)
        .count();

    bar.set_position(u64::from(view.progress));
    match controller.current_error() {
        Some(err) if controller.state().is_tracking() => {
            bar.set_message(format!("{} (retrying: {})", view.title, err));
        }
        _ => bar.set_message(format!("[{}/5] {}", step, view.title)),
    }
}

fn terminal_error<C: CaptionServiceOps>(
    controller: &LifecycleController<C>,
    view: Option<StatusView>,
) -> AppError {
    if let Some(err) = controller.current_error() {
        return err.clone();
    }
    match (controller.job(), view) {
        (Some(job), Some(view)) => AppError::JobFailed {
            job_id: job.id.clone(),
            message: view.message,
        },
        _ => AppError::Internal(format!("Job ended as {}", controller.state())),
    }
}

fn default_output<C: CaptionServiceOps>(controller: &LifecycleController<C>) -> PathBuf {
    let name = controller
        .job()
        .and_then(|job| job.download_ref.as_deref())
        .and_then(artifact_file_name)
        .unwrap_or_else(|| "captioned.mp4".to_string());
    PathBuf::from(name)
}

/// Last path segment of a download reference, if it names a file.
fn artifact_file_name(download_ref: &str) -> Option<String> {
    let path = download_ref.split(['?', '#']).next().unwrap_or_default();
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
