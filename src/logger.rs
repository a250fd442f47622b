//! Session log for the CLI and the generation pipeline.
//!
//! One file per run, truncated at [`init`]:
//!   Windows:  `%APPDATA%\SlabViz\slabviz.log`
//!   Linux:    `$XDG_DATA_HOME/SlabViz/slabviz.log` (or `~/.local/share/…`)
//!   macOS:    `~/Library/Application Support/SlabViz/slabviz.log`
//!
//! Log through `log_info!` / `log_warn!` / `log_err!`. Until [`init`] has
//! opened the file, lines go nowhere unless [`set_echo`] mirrors them to
//! stderr, so library users and unit tests get silent logging for free.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
}

static SESSION: OnceLock<SessionLog> = OnceLock::new();
static ECHO: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Path of the open session log, once [`init`] succeeded.
pub fn log_path() -> Option<&'static PathBuf> {
    SESSION.get().map(|s| &s.path)
}

/// Mirror every line to stderr (CLI `--verbose`).
pub fn set_echo(enabled: bool) {
    ECHO.store(enabled, Ordering::Relaxed);
}

/// Append a raw line. I/O errors are swallowed; logging never fails a run.
pub fn write_line(line: &str) {
    if ECHO.load(Ordering::Relaxed) {
        eprintln!("{}", line);
    }
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: Level, msg: &str) {
    write_line(&format_line(clock(), level, msg));
}

fn format_line(clock: String, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock, level, msg)
}

/// Open (truncate) the session log and hook panics into it.
/// Returns the log path, or `None` if the file could not be opened.
pub fn init() -> Option<PathBuf> {
    let path = app_data_dir().join("slabviz.log");
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
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return None;
        }
    };
    let _ = SESSION.set(SessionLog {
        path: path.clone(),
        file: Mutex::new(file),
    });

    write_line(&format!(
        "=== SlabViz {} session, unix time {} ===",
        env!("CARGO_PKG_VERSION"),
        unix_secs().unwrap_or(0)
    ));

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        default_hook(info);
    }));

    Some(path)
}

/// `SlabViz` folder inside the platform data directory.
pub fn app_data_dir() -> PathBuf {
    platform_data_dir().join("SlabViz")
}

fn platform_data_dir() -> PathBuf {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty()).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    if let Some(appdata) = var("APPDATA") {
        return appdata;
    }
    #[cfg(target_os = "macos")]
    if let Some(home) = var("HOME") {
        return home.join("Library").join("Application Support");
    }

    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// UTC wall clock, HH:MM:SS.
fn clock() -> String {
    match unix_secs() {
        Some(secs) => {
            let day = secs % 86_400;
            format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
        }
        None => "--:--:--".to_string(),
    }
}
