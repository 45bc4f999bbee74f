//! Append-only log file with one prefixed line per record line.
//!
//! ```text
//! [2026-10-19 9:14:03.120442] [10.0.0.7] [INFO] authenticated
//! [2026-10-19 9:14:03.120442] [10.0.0.7] [INFO]     user: alice
//! ```
//!
//! Fields other than the message are rendered as `key: value` lines indented
//! by four spaces. Blank lines are dropped. A new file is used per day
//! (`log_<YYYY-MM-DD>.log`), chosen when the logger is opened.

use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const ENV_LOG_DIR: &str = "RECOGNITION_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "RECOGNITION_LOG_LEVEL";
pub const ENV_CLIENT_ADDR: &str = "RECOGNITION_CLIENT_ADDR";

const INDENT: &str = "    ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %-H:%M:%S%.6f";

#[derive(Debug, Error)]
pub enum FileLogError {
    #[error("the log directory ({path}) could not be created: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the log file ({path}) could not be opened for writing: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File logger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogConfig {
    /// Directory holding the daily log files
    pub directory: PathBuf,
    /// Records below this level are dropped
    pub threshold: Level,
    /// Client identifier written into every line
    pub client_addr: String,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            threshold: Level::DEBUG,
            client_addr: "unidentified".to_string(),
        }
    }
}

impl FileLogConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset keys keep their default; an unknown level name keeps `DEBUG`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|d| !d.trim().is_empty()) {
            config.directory = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(|l| l.trim().parse::<Level>().ok()) {
            config.threshold = level;
        }
        if let Some(client) = lookup(ENV_CLIENT_ADDR).filter(|c| !c.trim().is_empty()) {
            config.client_addr = client;
        }
        config
    }

    pub fn with_threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_client_addr(mut self, client_addr: impl Into<String>) -> Self {
        self.client_addr = client_addr.into();
        self
    }

    /// Path of the file used for records written on `date`.
    pub fn log_file_path(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("log_{}.log", date.format("%Y-%m-%d")))
    }
}

/// Open (creating as needed) today's log file in append mode.
pub fn open_log_file(config: &FileLogConfig) -> Result<(PathBuf, File), FileLogError> {
    ensure_directory(&config.directory)?;
    let path = config.log_file_path(Local::now().date_naive());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| FileLogError::Open {
            path: path.clone(),
            source,
        })?;
    Ok((path, file))
}

fn ensure_directory(dir: &Path) -> Result<(), FileLogError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| FileLogError::Directory {
        path: dir.to_path_buf(),
        source,
    })
}

/// `tracing-subscriber` layer writing to today's log file.
pub fn file_layer<S>(config: &FileLogConfig) -> Result<impl Layer<S> + Send + Sync + 'static, FileLogError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let (_, file) = open_log_file(config)?;
    Ok(tracing_subscriber::fmt::layer()
        .event_format(LineFormat::new(config.client_addr.clone()))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(LevelFilter::from_level(config.threshold)))
}

/// Install the file logger as the global subscriber.
///
/// Returns `Ok` without installing anything if a global subscriber exists.
pub fn init_file(config: &FileLogConfig) -> Result<(), FileLogError> {
    let layer = file_layer(config)?;
    let _ = tracing_subscriber::registry().with(layer).try_init();
    Ok(())
}

/// Event formatter producing the prefixed line layout.
#[derive(Debug, Clone)]
pub struct LineFormat {
    client_addr: String,
}

impl LineFormat {
    pub fn new(client_addr: impl Into<String>) -> Self {
        Self {
            client_addr: client_addr.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let record = render_record(
            Local::now(),
            &self.client_addr,
            *event.metadata().level(),
            &fields.message,
            &fields.context,
        );
        writer.write_str(&record)
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    context: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.context.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.context.push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

/// Render one record; every output line carries the prefix.
fn render_record(
    at: DateTime<Local>,
    client_addr: &str,
    level: Level,
    message: &str,
    context: &[(String, String)],
) -> String {
    let prefix = format!("[{}] [{}] [{}] ", at.format(TIMESTAMP_FORMAT), client_addr, level);

    let mut body = message.to_string();
    if !context.is_empty() {
        let rendered: Vec<String> = context
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        body.push('\n');
        body.push_str(&indent(&rendered.join("\n")));
    }

    let mut out = String::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(out, "{prefix}{line}");
    }
    if out.is_empty() {
        let _ = writeln!(out, "{}", prefix.trim_end());
    }
    out
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("{INDENT}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
