//! Rolling file logging for directory processes.
//!
//! # Responsibility
//! - Start one size-rotated log file set per process.
//! - Keep log lines metadata-only: ids, counts and durations, never resident
//!   names, contact details or CSV cell contents.
//!
//! # Invariants
//! - Starting again with identical settings is a no-op.
//! - Starting again with a different level or directory is rejected.
//! - Nothing here panics; panics elsewhere are logged in sanitized form.

use crate::config::DirectoryConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "directory";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: &'static str,
    pub log_dir: PathBuf,
}

impl LogSettings {
    /// Validates a level name and an absolute log directory.
    pub fn new(level: &str, log_dir: impl AsRef<Path>) -> Result<Self, LoggingError> {
        let level =
            parse_level(level).ok_or_else(|| LoggingError::UnknownLevel(level.trim().to_string()))?;
        let log_dir = log_dir.as_ref();
        if log_dir.as_os_str().is_empty() || !log_dir.is_absolute() {
            return Err(LoggingError::RelativeDir(log_dir.to_path_buf()));
        }
        Ok(Self {
            level,
            log_dir: log_dir.to_path_buf(),
        })
    }
}

/// Logging bootstrap failure.
#[derive(Debug)]
pub enum LoggingError {
    UnknownLevel(String),
    RelativeDir(PathBuf),
    CreateDir { path: PathBuf, source: std::io::Error },
    Backend(flexi_logger::FlexiLoggerError),
    /// Already running with other settings.
    Conflict { active: LogSettings, requested: LogSettings },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeDir(path) => {
                write!(f, "log directory must be an absolute path, got `{}`", path.display())
            }
            Self::CreateDir { path, source } => {
                write!(f, "failed to create log directory `{}`: {source}", path.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already running with level `{}` at `{}`; refusing to switch to level `{}` at `{}`",
                active.level,
                active.log_dir.display(),
                requested.level,
                requested.log_dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts file logging; see [`LogSettings::new`] for accepted inputs.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let requested = LogSettings::new(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(&requested))?;
    // A concurrent caller may have started first with other settings.
    if active.settings != requested {
        return Err(LoggingError::Conflict {
            active: active.settings.clone(),
            requested,
        });
    }
    Ok(())
}

/// Starts file logging when `config.log_dir` is set.
///
/// Returns `Ok(false)` without a log directory; `log` macros stay no-ops.
pub fn init_logging_from_config(config: &DirectoryConfig) -> Result<bool, LoggingError> {
    match config.log_dir.as_deref() {
        Some(log_dir) => init_logging(config.log_level, log_dir).map(|()| true),
        None => Ok(false),
    }
}

/// Settings of the running logger, `None` before init.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE.get().map(|active| active.settings.clone())
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Canonical level name; `warning` is accepted as `warn`.
pub fn parse_level(level: &str) -> Option<&'static str> {
    let level = level.trim().to_ascii_lowercase();
    ["trace", "debug", "info", "warn", "error"]
        .into_iter()
        .find(|known| *known == level)
        .or_else(|| (level == "warning").then_some("warn"))
}

fn start(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|source| LoggingError::CreateDir {
        path: settings.log_dir.clone(),
        source,
    })?;

    let file_spec = FileSpec::default()
        .directory(settings.log_dir.as_path())
        .basename(LOG_BASENAME);
    let handle = Logger::try_with_str(settings.level)
        .and_then(|logger| {
            logger
                .log_to_file(file_spec)
                .rotate(
                    Criterion::Size(ROTATE_AT_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .start()
        })
        .map_err(LoggingError::Backend)?;

    PANIC_HOOK.get_or_init(install_panic_hook);
    info!(
        "event=logging_init module=logging status=ok os={} debug_build={} version={} level={}",
        std::env::consts::OS,
        cfg!(debug_assertions),
        env!("CARGO_PKG_VERSION"),
        settings.level
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic module=logging status=error location={location} payload={}",
            panic_summary(info)
        );
        previous(info);
    }));
}

fn panic_summary(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    single_line(text, PANIC_PAYLOAD_LIMIT)
}

/// Payloads may carry resident data: flatten to one line and cap the length.
fn single_line(text: &str, limit: usize) -> String {
    let mut chars = text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c });
    let mut out: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, init_logging_from_config, logging_status, parse_level, single_line,
        LogSettings, LoggingError,
    };
    use crate::config::DirectoryConfig;

    #[test]
    fn parse_level_accepts_known_names() {
        assert_eq!(parse_level("INFO"), Some("info"));
        assert_eq!(parse_level(" warning "), Some("warn"));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn settings_reject_relative_directory() {
        let err = LogSettings::new("info", "logs/dev").unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDir(_)));
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        let flattened = single_line("Jane Doe\nUnit 4B\r555-0100", 8);
        assert_eq!(flattened, "Jane Doe...");
        assert_eq!(single_line("short", 8), "short");
    }

    #[test]
    fn config_without_log_dir_skips_init() {
        let config = DirectoryConfig::from_lookup(|_| None).unwrap();
        assert!(matches!(init_logging_from_config(&config), Ok(false)));
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicts() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        init_logging("info", first.path()).unwrap();
        init_logging("INFO", first.path()).unwrap();

        let err = init_logging("debug", first.path()).unwrap_err();
        assert!(matches!(err, LoggingError::Conflict { .. }));
        let err = init_logging("info", second.path()).unwrap_err();
        assert!(err.to_string().contains("refusing to switch"));

        let active = logging_status().unwrap();
        assert_eq!(active.level, "info");
        assert_eq!(active.log_dir, first.path());
    }
}
