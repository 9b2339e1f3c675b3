//! Session logger: routes all engine log output into a single file in the OS
//! data directory.
//!
//! The file is **truncated at each launch**, so it only ever holds the most
//! recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\LumaFE\lumafe.log`
//!   Linux:    `~/.local/share/LumaFE/lumafe.log`
//!   macOS:    `~/Library/Application Support/LumaFE/lumafe.log`
//!
//! Library code only emits events through the `log_info!` / `log_warn!` /
//! `log_err!` macros (thin wrappers over `tracing`). Installing a subscriber
//! is left to the binary via [`init`]; hosts embedding the library may install
//! their own instead.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

#[doc(hidden)]
pub use tracing as __tracing;

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::__tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::__tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::__tracing::error!($($arg)*)
    };
}

/// Returns the path to the current session log file, once [`init`] ran.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Initialise the session logger. Call once from `main`.
///
/// * Creates (or truncates) the log file and installs a `tracing` fmt
///   subscriber writing to it. `verbose` lowers the level to DEBUG.
/// * Installs a panic hook that mirrors the panic message into the log
///   before running the default handler.
///
/// Failure to open the file is not fatal: logging is simply skipped.
pub fn init(verbose: bool) {
    let path = data_dir().join("LumaFE").join("lumafe.log");

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    };

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let installed = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .try_init();
    if installed.is_err() {
        // Someone else owns the global subscriber.
        return;
    }
    let _ = LOG_PATH.set(path.clone());

    tracing::info!("=== LumaFE session started ===");
    tracing::info!("Log file: {}", path.display());

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
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
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
