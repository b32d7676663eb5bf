//! Structured logging setup.
//!
//! stdout carries the JSON-line IPC protocol, so every layer writes to
//! stderr or to the rolling log file.

use std::fs;
use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn,mio=warn";

/// Initialize tracing with a compact stderr layer and, when the log
/// directory is writable, a daily-rotating file layer keeping 5 files.
///
/// Returns an error if a global subscriber is already installed.
pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let file_appender = fs::create_dir_all(log_dir)
        .map_err(anyhow::Error::from)
        .and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("voice-reveal")
                .filename_suffix("log")
                .max_log_files(5)
                .build(log_dir)
                .map_err(anyhow::Error::from)
        });

    match file_appender {
        Ok(appender) => {
            let file_layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()?;
            tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init()?;
            tracing::warn!(log_dir = %log_dir.display(), "File logging disabled: {}", e);
        }
    }

    Ok(())
}
