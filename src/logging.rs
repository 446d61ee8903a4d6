//! Process-wide `tracing` subscriber setup.
//!
//! The executor never installs a subscriber itself; services that want the
//! default [`TracingDiagnostics`](crate::TracingDiagnostics) output call
//! [`init`] once at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// How often a log file is rolled over.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Minutely,
    Hourly,
    #[default]
    Daily,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Logging configuration, usually deserialized from the service config.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `debug` or `info,resilient_request=warn`.
    pub level: String,
    pub format: LogFormat,
    /// When `false`, [`init`] installs nothing.
    pub enabled: bool,
    /// Include source file and line in every record.
    pub report_caller: bool,
    /// Write to this file instead of stdout. With a rotation other than
    /// `never`, the period is appended to the file name.
    pub filename: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Rotated files to keep; `0` keeps all of them.
    pub max_backups: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_owned(),
            format: LogFormat::Json,
            enabled: true,
            report_caller: false,
            filename: None,
            rotation: LogRotation::Daily,
            max_backups: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("invalid log level directive '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("log file path '{}' has no file name", path.display())]
    FileName { path: PathBuf },
    #[error("cannot open log file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs a global fmt subscriber according to `config`.
///
/// `RUST_LOG`, when set and valid, takes precedence over `config.level`.
pub fn init(config: &LogConfig) -> Result<(), LogInitError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(config)?;
    let layer = match &config.filename {
        Some(path) => fmt_layer(config, file_appender(path, config)?),
        None => fmt_layer(config, std::io::stdout),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}

fn fmt_layer<S, W>(config: &LogConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(config.report_caller)
        .with_line_number(config.report_caller);
    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

/// Rolling appender writing into the directory of `path`, named after it.
fn file_appender(path: &Path, config: &LogConfig) -> Result<RollingFileAppender, LogInitError> {
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LogInitError::FileName {
            path: path.to_path_buf(),
        })?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut builder = RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(prefix);
    if config.max_backups > 0 {
        builder = builder.max_log_files(config.max_backups);
    }
    builder.build(directory).map_err(|source| LogInitError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, LogInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|source| LogInitError::Filter {
        directive: config.level.clone(),
        source,
    })
}
