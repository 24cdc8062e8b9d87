//! Logging setup for applications embedding the runtime.
//!
//! The runtime itself only emits `tracing` events. Embedders that do not
//! install their own subscriber can use one of the initializers here:
//! [`init_file_logging`] for daily-rotated files in an XDG data directory,
//! or [`init_stderr_logging`] for development.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for runtime logging.
///
/// # Example
///
/// ```rust
/// use agent_runtime::logging::{LogLevel, LoggingConfig};
///
/// let config = LoggingConfig::new()
///     .enable()
///     .with_app_name("chat-gateway")
///     .with_level(LogLevel::Debug);
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether file logging is enabled.
    pub enabled: bool,
    /// Log files are named `{app_name}.log` with daily rotation.
    pub app_name: String,
    /// Custom log directory. If None, uses XDG data dir + "agent-runtime/logs".
    pub log_dir: Option<PathBuf>,
    /// Log level filter.
    pub level: LogLevel,
}

impl LoggingConfig {
    /// Creates a new LoggingConfig with default values (file logging off).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns file logging on.
    #[must_use]
    pub fn enable(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Sets the application name for log file naming.
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Sets a custom log directory.
    #[must_use]
    pub fn with_log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(path.into());
        self
    }

    /// Sets the log level filter.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_name: "agent-runtime".to_string(),
            log_dir: None,
            level: LogLevel::default(),
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-chunk rule matches and frame decoding.
    Trace,
    /// Dispatch decisions and outgoing requests.
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Converts to tracing_subscriber LevelFilter.
    #[must_use]
    pub fn to_filter(self) -> tracing_subscriber::filter::LevelFilter {
        use tracing_subscriber::filter::LevelFilter;

        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

/// `RUST_LOG` directives, falling back to `level`.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.to_filter().into())
        .from_env_lossy()
}

/// Installs `layer` as the global subscriber, filtered by [`env_filter`].
fn install<L>(layer: L, level: LogLevel) -> Result<(), LoggingError>
where
    L: tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter(level))
        .try_init()
        .map_err(|e| LoggingError::already_installed(e.to_string()))
}

/// Keeps the non-blocking file writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _worker: tracing_appender::non_blocking::WorkerGuard,
}

impl fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggingGuard")
    }
}

static GLOBAL_GUARD: OnceLock<LoggingGuard> = OnceLock::new();

/// Logging setup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingError {
    /// What went wrong.
    pub kind: LoggingErrorKind,
}

/// Kinds of [`LoggingError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingErrorKind {
    /// No log directory was configured and the platform has no data directory.
    NoLogDir,
    /// The log directory could not be created.
    CreateDir {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },
    /// A global subscriber is already installed.
    AlreadyInstalled {
        /// Message from `tracing-subscriber`.
        reason: String,
    },
}

impl LoggingError {
    #[must_use]
    fn no_log_dir() -> Self {
        Self { kind: LoggingErrorKind::NoLogDir }
    }

    #[must_use]
    fn create_dir(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            kind: LoggingErrorKind::CreateDir { path, reason: reason.into() },
        }
    }

    #[must_use]
    fn already_installed(reason: impl Into<String>) -> Self {
        Self {
            kind: LoggingErrorKind::AlreadyInstalled { reason: reason.into() },
        }
    }
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LoggingErrorKind::NoLogDir => {
                f.write_str("no log directory: set `log_dir` or XDG_DATA_HOME")
            }
            LoggingErrorKind::CreateDir { path, reason } => {
                write!(f, "cannot create log directory '{}': {}", path.display(), reason)
            }
            LoggingErrorKind::AlreadyInstalled { reason } => {
                write!(f, "tracing subscriber already installed: {}", reason)
            }
        }
    }
}

impl std::error::Error for LoggingError {}

/// Directory log files are written to: `log_dir` when set, otherwise
/// `agent-runtime/logs` under the local data directory.
///
/// # Errors
///
/// Returns [`LoggingErrorKind::NoLogDir`] when neither is available.
pub fn log_dir(config: &LoggingConfig) -> Result<PathBuf, LoggingError> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_local_dir()
            .map(|dir| dir.join("agent-runtime").join("logs"))
            .ok_or_else(LoggingError::no_log_dir),
    }
}

/// Writes `{app_name}.log`, rotated daily, into [`log_dir`].
///
/// Returns `Ok(None)` when `config.enabled` is false. Otherwise the returned
/// guard must be held for as long as logging should continue.
///
/// # Errors
///
/// Fails if the directory cannot be created or a global subscriber is
/// already installed.
pub fn init_file_logging(config: &LoggingConfig) -> Result<Option<LoggingGuard>, LoggingError> {
    if !config.enabled {
        return Ok(None);
    }

    let dir = log_dir(config)?;
    std::fs::create_dir_all(&dir).map_err(|e| LoggingError::create_dir(dir.clone(), e.to_string()))?;

    let appender = tracing_appender::rolling::daily(&dir, format!("{}.log", config.app_name));
    let (writer, worker) = tracing_appender::non_blocking(appender);
    install(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true),
        config.level,
    )?;

    Ok(Some(LoggingGuard { _worker: worker }))
}

/// Like [`init_file_logging`], but parks the guard in a process-wide slot.
///
/// Returns `Ok(true)` only on the call that installed logging.
///
/// # Errors
///
/// See [`init_file_logging`].
pub fn init_and_store_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    if GLOBAL_GUARD.get().is_some() {
        return Ok(false);
    }
    let Some(guard) = init_file_logging(config)? else {
        return Ok(false);
    };
    Ok(GLOBAL_GUARD.set(guard).is_ok())
}

/// Logs to stderr at `level`; `RUST_LOG` overrides it.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_stderr_logging(level: LogLevel) -> Result<(), LoggingError> {
    install(tracing_subscriber::fmt::layer().with_writer(std::io::stderr), level)
}
