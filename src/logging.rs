use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use anyhow::{Context, Result};
use chrono::Local;
use flate2::{write::GzEncoder, Compression};
use tracing::warn;
use tracing_appender::{
    non_blocking::{self, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR_ENV: &str = "CALLVAULT_LOG_DIR";
const LOG_PREFIX: &str = "callvault";
const MAX_RETAINED_LOGS: usize = 14;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily-rotating file under
/// `~/.callvault/logs` (or `CALLVAULT_LOG_DIR`). Rotated files from earlier
/// days are gzip-compressed and trimmed to a fixed retention window on the
/// next startup. Safe to call more than once; later calls are no-ops.
pub fn init() -> Result<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    let log_dir = resolve_log_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    housekeep(&log_dir);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| format!("failed to open log appender in {}", log_dir.display()))?;
    let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        );

    match subscriber.try_init() {
        Ok(_) => {
            let _ = FILE_GUARD.set(guard);
            install_panic_hook();
        }
        Err(_) => {
            // Subscriber already installed elsewhere; drop guard so the worker thread exits.
            drop(guard);
        }
    }

    Ok(())
}

/// Compresses every dated log file except today's, then deletes the oldest
/// compressed files past the retention limit. Failures are logged and never
/// abort startup.
fn housekeep(log_dir: &Path) {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let active_name = format!("{LOG_PREFIX}.{today}.log");

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("failed to inspect log directory {}: {err}", log_dir.display());
            return;
        }
    };

    let mut retained: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(LOG_PREFIX) && path.is_file() => name.to_string(),
            _ => continue,
        };
        if name == active_name {
            continue;
        }

        let path = if name.ends_with(".gz") {
            path
        } else {
            match compress_log(&path) {
                Ok(gz_path) => gz_path,
                Err(err) => {
                    warn!("failed to compress rotated log {}: {err}", path.display());
                    continue;
                }
            }
        };

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        retained.push((modified, path));
    }

    retained.sort_by_key(|(modified, _)| *modified);
    while retained.len() > MAX_RETAINED_LOGS {
        let (_, path) = retained.remove(0);
        if let Err(err) = fs::remove_file(&path) {
            warn!("failed to remove expired log {}: {err}", path.display());
        }
    }
}

fn compress_log(path: &Path) -> Result<PathBuf> {
    let gz_path = path.with_extension("log.gz");

    let mut input = fs::File::open(path)
        .with_context(|| format!("failed to open {} for compression", path.display()))?;
    let output = fs::File::create(&gz_path)
        .with_context(|| format!("failed to create compressed log {}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)
        .with_context(|| format!("failed to compress {}", path.display()))?;
    encoder
        .finish()
        .with_context(|| format!("failed to finish compression for {}", gz_path.display()))?;
    drop(input);
    fs::remove_file(path)
        .with_context(|| format!("failed to remove uncompressed log {}", path.display()))?;

    Ok(gz_path)
}

fn resolve_log_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
        let path = PathBuf::from(dir);
        if path.is_absolute() {
            return Ok(path);
        }
        let base =
            std::env::current_dir().context("failed to resolve current working directory")?;
        return Ok(base.join(path));
    }

    let home = dirs::home_dir().context("unable to locate user home directory")?;
    Ok(home.join(".callvault").join("logs"))
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                tracing::error!(
                    target: "panic",
                    file = location.file(),
                    line = location.line(),
                    message = %info
                );
            } else {
                tracing::error!(target: "panic", message = %info);
            }
            default_hook(info);
        }));
    });
}
