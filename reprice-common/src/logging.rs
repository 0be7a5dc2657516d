//! Logging utilities for the repricing job.
//!
//! Structured logging through `tracing`, written to stderr and optionally
//! to a rotating log file.
//!
//! # Log File
//!
//! The file rolls over on a fixed schedule (weekly by default). Rolled files
//! get a timestamp suffix and are gzip-compressed; the oldest are removed
//! once more than `log_retention` exist.
//!
//! # Noise Filtering
//!
//! Noisy HTTP library modules (hyper, reqwest, h2, rustls) are pinned to
//! `warn` so the per-stage selection logs stay readable.

use std::path::Path;

use anyhow::{bail, Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate, TimeFrequency};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::ObservabilityConfig;

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the filter directive string for a base level plus exclusions.
pub fn build_directives(log_level: &str, excluded_targets: &[String]) -> String {
    let mut directives = String::from(log_level);

    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    for target in excluded_targets {
        directives.push_str(&format!(",{}=warn", target));
    }

    directives
}

fn fmt_layer<W>(log_format: &str, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    if log_format == "json" {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
    }
}

/// Map a rotation name to a file-rotate content limit.
pub fn content_limit(rotation: &str) -> Result<ContentLimit> {
    Ok(match rotation.to_lowercase().as_str() {
        "hourly" => ContentLimit::Time(TimeFrequency::Hourly),
        "daily" => ContentLimit::Time(TimeFrequency::Daily),
        "weekly" => ContentLimit::Time(TimeFrequency::Weekly),
        "monthly" => ContentLimit::Time(TimeFrequency::Monthly),
        "never" => ContentLimit::None,
        other => bail!("Unknown log rotation '{}'", other),
    })
}

/// Open the rotating log file described by `config`.
pub fn rotating_file(path: &Path, config: &ObservabilityConfig) -> Result<FileRotate<AppendTimestamp>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let file_limit = match config.log_retention {
        0 => FileLimit::Unlimited,
        n => FileLimit::MaxFiles(n),
    };
    let limit = content_limit(&config.log_rotation)?;

    // Rolled files are compressed right away; the live file never is.
    #[cfg(unix)]
    let file = FileRotate::new(
        path,
        AppendTimestamp::default(file_limit),
        limit,
        Compression::OnRotate(0),
        None,
    );
    #[cfg(not(unix))]
    let file = FileRotate::new(
        path,
        AppendTimestamp::default(file_limit),
        limit,
        Compression::OnRotate(0),
    );

    Ok(file)
}

/// Initialize logging from the observability configuration.
///
/// `RUST_LOG` overrides the configured level and exclusions. When
/// `log_file` is set, every line is also written without ANSI colors to a
/// rotating file through a background writer. The returned guard flushes
/// that writer on drop and must be held for the life of the process.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let directives = build_directives(&config.log_level, &config.excluded_targets);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(&config.log_format, std::io::stderr, true)];
    let mut guard = None;

    if let Some(path) = config.log_file_path() {
        let file = rotating_file(&path, config)?;
        let (writer, worker) = tracing_appender::non_blocking(file);
        layers.push(fmt_layer(&config.log_format, writer, false));
        guard = Some(worker);
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();

    tracing::info!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        log_file = config.log_file.as_deref().unwrap_or("-"),
        log_rotation = %config.log_rotation,
        "Logging initialized"
    );

    Ok(guard)
}

/// Generate a new run ID for correlating one job execution.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}
