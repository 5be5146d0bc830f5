//! Rolling file logs for the Florandei CLI and core.
//!
//! # Responsibility
//! - Start one `flexi_logger` backend per process, writing `florandei*.log`
//!   under the configured data directory.
//! - Mirror warnings to stderr so interactive users see cache and import
//!   failures without opening the log file.
//! - Record panics as a single `event=panic_captured` line.
//!
//! # Invariants
//! - Events are `key=value` metadata only: registro descriptions, tags,
//!   coordinates and photo bytes never reach a log line.
//! - A second `init_logging` call is accepted only with the same level and
//!   directory as the first.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "florandei";
const ROTATE_AT_BYTES: u64 = 4 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 3;
const PANIC_TEXT_LIMIT: usize = 120;

static ACTIVE: OnceCell<ActiveLogging> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Level and directory the running logger was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    level: &'static str,
    dir: PathBuf,
}

struct ActiveLogging {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Logging bootstrap failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidLogDir(String),
    /// Logging already runs with another level or directory.
    Conflict(String),
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidLogDir(message) => write!(f, "invalid log directory: {message}"),
            Self::Conflict(message) => write!(f, "logging already started: {message}"),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts file logging at `level` under `log_dir` (see [`crate::AppConfig::log_dir`]).
///
/// # Errors
/// - `UnsupportedLevel` for anything outside trace|debug|info|warn|error.
/// - `InvalidLogDir` for an empty or relative path, or one that cannot be created.
/// - `Conflict` when logging is already running with a different target.
/// - `Backend` when `flexi_logger` refuses to start.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let wanted = LogTarget {
        level: normalize_level(level)?,
        dir: checked_log_dir(log_dir.as_ref())?,
    };

    let active = ACTIVE.get_or_try_init(|| start_backend(&wanted))?;
    if active.target != wanted {
        return Err(LoggingError::Conflict(describe_conflict(&active.target, &wanted)));
    }
    Ok(())
}

/// Returns `(level, log_dir)` of the running logger.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.target.level, active.target.dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    let level = level.trim().to_ascii_lowercase();
    ["trace", "debug", "info", "warn", "error"]
        .into_iter()
        .find(|known| *known == level || (level == "warning" && *known == "warn"))
        .ok_or(LoggingError::UnsupportedLevel(level))
}

fn checked_log_dir(dir: &Path) -> Result<PathBuf, LoggingError> {
    if dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidLogDir("path is empty".to_string()));
    }
    if dir.is_relative() {
        return Err(LoggingError::InvalidLogDir(format!(
            "`{}` is not absolute",
            dir.display()
        )));
    }
    Ok(dir.to_path_buf())
}

fn start_backend(target: &LogTarget) -> Result<ActiveLogging, LoggingError> {
    std::fs::create_dir_all(&target.dir).map_err(|err| {
        LoggingError::InvalidLogDir(format!("cannot create `{}`: {err}", target.dir.display()))
    })?;

    let handle = Logger::try_with_str(target.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(&target.dir)
                .basename(LOG_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    hook_panics();
    info!(
        "event=logging_start module=logging status=ok version={} os={} level={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        target.level
    );

    Ok(ActiveLogging {
        target: target.clone(),
        _handle: handle,
    })
}

fn describe_conflict(active: &LogTarget, wanted: &LogTarget) -> String {
    if active.dir != wanted.dir {
        format!(
            "writing to `{}`, refusing `{}`",
            active.dir.display(),
            wanted.dir.display()
        )
    } else {
        format!("at level `{}`, refusing `{}`", active.level, wanted.level)
    }
}

fn hook_panics() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let location = panic
            .location()
            .map_or_else(|| "unknown".to_string(), |at| format!("{}:{}", at.file(), at.line()));
        let text = panic
            .payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| panic.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            one_line(&text, PANIC_TEXT_LIMIT)
        );
        chained(panic);
    }));
}

/// Flattens `text` onto one line and caps it at `limit` characters.
fn one_line(text: &str, limit: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    match flat.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_case_insensitive_and_accept_warning() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert_eq!(
            normalize_level("verbose"),
            Err(LoggingError::UnsupportedLevel("verbose".to_string()))
        );
    }

    #[test]
    fn log_dir_must_be_absolute_and_non_empty() {
        assert!(checked_log_dir(Path::new("")).is_err());
        let error = checked_log_dir(Path::new("florandei/logs")).unwrap_err();
        assert!(error.to_string().contains("not absolute"));
    }

    #[test]
    fn one_line_flattens_and_truncates_panic_text() {
        assert_eq!(one_line("ipê\namarelo", 20), "ipê amarelo");
        assert_eq!(one_line("ipê\ramarelo", 5), "ipê a...");
    }

    #[test]
    fn second_init_must_match_the_running_target() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        init_logging("info", log_dir.path()).unwrap();
        init_logging("INFO", log_dir.path()).unwrap();

        let level_error = init_logging("debug", log_dir.path()).unwrap_err();
        assert!(matches!(level_error, LoggingError::Conflict(_)));
        let dir_error = init_logging("info", other_dir.path()).unwrap_err();
        assert!(dir_error.to_string().contains("refusing"));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(dir, log_dir.path());
    }
}
