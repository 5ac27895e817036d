//! Process-wide tracing setup: console output always, a daily rolling file
//! when `log.dir` is usable. Each output carries its own filter.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::proxy::config::LogConfig;

const LOG_FILE_PREFIX: &str = "gateway.log";

struct LocalTimer;

impl fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().to_rfc3339())
    }
}

/// `RUST_LOG` when set and parseable, then `level`, then `info`.
fn build_filter(env_directives: Option<&str>, level: &str) -> EnvFilter {
    env_directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Create the directory if needed and check that we can write into it.
fn open_log_dir(dir: &Path) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create log dir {:?}: {}", dir, e))?;

    let marker = dir.join(".gateway_write_check");
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&marker)
        .and_then(|mut f| f.write_all(b"ok"))
        .map_err(|e| format!("log dir {:?} is not writable: {}", dir, e))?;
    let _ = fs::remove_file(marker);

    Ok(dir.to_path_buf())
}

pub fn init_logger(config: &LogConfig) {
    let _ = tracing_log::LogTracer::init();

    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let console_filter = build_filter(env_directives.as_deref(), &config.level);
    // An explicit file level is not overridden by RUST_LOG.
    let file_filter = match &config.file_level {
        Some(level) => build_filter(None, level),
        None => build_filter(env_directives.as_deref(), &config.level),
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_timer(LocalTimer)
        .with_filter(console_filter);

    let mut guard: Option<WorkerGuard> = None;
    let file_layer = match config.dir.as_deref().map(open_log_dir) {
        Some(Ok(dir)) => {
            let (writer, worker) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            guard = Some(worker);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(LocalTimer)
                    .with_filter(file_filter),
            )
        }
        Some(Err(e)) => {
            eprintln!("{}, logging to console only", e);
            None
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match guard {
        Some(guard) => {
            // Flushes on drop; the process keeps it until exit.
            std::mem::forget(guard);
            tracing::info!(level = %config.level, file_level = ?config.file_level, "logging to console and file");
        }
        None => tracing::info!(level = %config.level, "logging to console"),
    }
}
