//! # Per-run Log
//!
//! Every run writes one plain-text file, `logs/aws_wrapper_<YYYY-MM-DD-HH-MM>.log`,
//! with one record per line:
//!
//! ```text
//! 10/19/2026 14:03:11 PM INFO: Launched EC2 instance i-0123456789abcdef0
//! ```
//!
//! A [`RunLog`] owns its own `tracing` dispatcher instead of installing a
//! global subscriber. Code running inside [`RunLog::in_scope`] logs with the
//! ordinary `tracing` macros and those events land in this run's file only.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{Dispatch, Event, Level, Subscriber, info};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

const LOG_FILE_PREFIX: &str = "aws_wrapper";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S %p";

/// Formats events as `<timestamp> <LEVEL>: <message>`.
struct RunLineFormat;

impl<S, N> FormatEvent<S, N> for RunLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(
            writer,
            "{} {}: ",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub struct RunLog {
    dispatch: Dispatch,
    path: Option<PathBuf>,
    started: Instant,
}

impl RunLog {
    /// Opens a new timestamp-named log file under `dir` and starts the run clock.
    pub fn start(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let path = dir.join(log_file_name(chrono::Local::now()));
        let file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let mut log = Self::with_writer(Mutex::new(file));
        log.path = Some(path);
        Ok(log)
    }

    /// Builds a run log on an arbitrary writer (tests use an in-memory buffer).
    pub fn with_writer<W>(make_writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(make_writer)
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .event_format(RunLineFormat)
            .finish();
        Self {
            dispatch: Dispatch::new(subscriber),
            path: None,
            started: Instant::now(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` with this log as the current thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Records who ran the script, where, and with which binary.
    pub fn log_environment(&self) {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let system = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        self.in_scope(|| {
            info!("User: {}", user);
            info!("System: {}", system);
            info!(
                "Version: {} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
            info!("Executable Path: {}", exe);
        });
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log_execution_time(&self) {
        let elapsed = format_elapsed(self.elapsed());
        self.in_scope(|| info!("Script Execution Time: {}", elapsed));
    }
}

pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}_{}.log", LOG_FILE_PREFIX, now.format("%Y-%m-%d-%H-%M"))
}

/// Formats a duration as `H:M:S`, truncated to whole seconds and unpadded.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{}:{}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Splits raw remote output into log lines: tabs become two spaces, carriage
/// returns are dropped, then the text is split on `\n`.
pub fn output_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .replace('\t', "  ")
        .replace('\r', "")
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// Logs remote command output one line per record.
pub fn log_output(raw: &[u8]) {
    for line in output_lines(raw) {
        info!("{}", line);
    }
}
