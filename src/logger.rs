//! Session logger — routes `tracing` output to a single file in the OS data
//! directory, plus warnings and errors to stderr.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\RedactFE\redactfe.log`
//!   Linux:    `~/.local/share/RedactFE/redactfe.log`
//!   macOS:    `~/Library/Application Support/RedactFE/redactfe.log`
//!
//! Verbosity follows `RUST_LOG` when set, otherwise the level passed to
//! [`init`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Initialise logging. Call once, before anything logs.
///
/// * Creates (or truncates) the log file; if that fails only stderr is used.
/// * Installs a panic hook that records the panic before running the
///   default handler.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = open_log_file().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr.with_max_level(Level::WARN));

    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_err()
    {
        // Already initialised (tests, embedding applications).
        return;
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));

    if let Some(path) = log_path() {
        tracing::info!(path = %path.display(), "session log opened");
    }
}

fn open_log_file() -> Option<File> {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Truncate any previous session's content
    let mut file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            // Can't open log file — not fatal, just skip
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return None;
        }
    };

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let _ = writeln!(file, "=== RedactFE session started (unix {}) ===", started);
    let _ = LOG_PATH.set(path);
    Some(file)
}

fn log_file_path() -> PathBuf {
    data_dir().join("RedactFE").join("redactfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort: current working directory
    PathBuf::from(".")
}
