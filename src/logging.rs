//! Logging setup on top of `tracing`

use crate::config::{LogRotation, LoggingOptions};
use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_appender::non_blocking::{self, NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Environment variable that wins over the configured level
pub const LOG_LEVEL_ENV: &str = "PDFSCAN_LOG_LEVEL";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Install the global tracing subscriber.
///
/// Returns early if a subscriber is already installed (tests, embedding apps).
pub fn init(options: &LoggingOptions) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| options.level.clone());
    let filter = env_filter(&level)?;

    let mut layers: Vec<BoxedLayer<FilteredRegistry>> = vec![stderr_layer(options.color)];
    if let Some(file) = file_layer(options)? {
        layers.push(file);
    }

    Registry::default()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| Error::Config(format!("Invalid log level '{level}': {e}")))
}

fn file_layer<S>(options: &LoggingOptions) -> Result<Option<BoxedLayer<S>>>
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync + 'static,
{
    let Some(path) = options.file.as_ref() else {
        return Ok(None);
    };

    let writer = file_writer(path, options.rotation)?;
    Ok(Some(
        fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_level(true)
            .boxed(),
    ))
}

fn file_writer(path: &Path, rotation: Option<LogRotation>) -> Result<NonBlocking> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!(
            "Failed to create log directory {}: {e}",
            dir.display()
        ))
    })?;

    let builder = non_blocking::NonBlockingBuilder::default().lossy(false);
    let (writer, guard) = match rotation {
        Some(rotation) => {
            let file_name = path.file_name().ok_or_else(|| {
                Error::Config(format!(
                    "Log file path '{}' must include a filename when rotation is enabled",
                    path.display()
                ))
            })?;
            let appender = match rotation {
                LogRotation::Hourly => rolling::hourly(dir, file_name),
                LogRotation::Daily => rolling::daily(dir, file_name),
            };
            builder.finish(appender)
        }
        None => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!("Failed to open log file {}: {e}", path.display()))
                })?;
            builder.finish(file)
        }
    };

    // Dropping the guard would stop the background writer.
    let _ = FILE_GUARD.set(guard);
    Ok(writer)
}

fn stderr_layer<S>(color: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync + 'static,
{
    fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(io::stderr)
        .with_ansi(color)
        .with_target(true)
        .with_level(true)
        .boxed()
}
