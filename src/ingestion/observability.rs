use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LoadError;
use crate::types::DataFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    /// The load succeeded in a degraded way (e.g. a streaming fallback).
    Warning,
    /// The load failed.
    Error,
    /// The input could not be read at all (missing file or other I/O failure).
    Critical,
}

impl LoadSeverity {
    /// Severity of a failed load.
    pub fn for_error(e: &LoadError) -> Self {
        match e {
            LoadError::FileNotFound { .. } | LoadError::Io(_) => Self::Critical,
            _ => Self::Error,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Context about a load attempt.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// The input path.
    pub path: PathBuf,
    /// Resolved format, if detection got that far.
    pub format: Option<DataFormat>,
    /// File size in bytes, if known.
    pub file_size: Option<u64>,
    /// Whether the streaming policy chose streaming.
    pub streaming: bool,
}

/// Stats reported on a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of materialized records; `None` when a lazy stream was returned.
    pub records: Option<usize>,
    /// Whether the returned payload is a stream.
    pub streamed: bool,
}

/// Observer interface for load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LoadObserver: Send + Sync {
    /// Called when a load succeeds.
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    /// Called when a load fails.
    fn on_failure(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &LoadError) {}

    /// Called when a load failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called for conditions that do not fail the load, such as falling back to a full load.
    fn on_warning(&self, _ctx: &LoadContext, _severity: LoadSeverity, _message: &str) {}
}

/// Fans every callback out to a list of observers, in insertion order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }

    /// Add an observer; returns `self` for chaining.
    pub fn with(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn LoadObserver)) {
        self.observers.iter().for_each(|o| f(o.as_ref()));
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.each(|o| o.on_alert(ctx, severity, error));
    }

    fn on_warning(&self, ctx: &LoadContext, severity: LoadSeverity, message: &str) {
        self.each(|o| o.on_warning(ctx, severity, message));
    }
}

/// Emits load events through `tracing`.
///
/// Successes are `info`, warnings `warn` and failures `error`; alerts carry `alert = true`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        tracing::info!(
            path = %ctx.path.display(),
            format = ?ctx.format,
            records = ?stats.records,
            streamed = stats.streamed,
            "load ok"
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        tracing::error!(
            path = %ctx.path.display(),
            format = ?ctx.format,
            severity = severity.label(),
            error = %error,
            "load failed"
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        tracing::error!(
            alert = true,
            path = %ctx.path.display(),
            format = ?ctx.format,
            severity = severity.label(),
            error = %error,
            "load failed"
        );
    }

    fn on_warning(&self, ctx: &LoadContext, severity: LoadSeverity, message: &str) {
        tracing::warn!(
            path = %ctx.path.display(),
            format = ?ctx.format,
            severity = severity.label(),
            "{message}"
        );
    }
}

/// Appends one line per load event to a log file.
///
/// Line layout: `<unix secs> <event> format=<fmt> path=<path> <details>`. The file is opened on
/// the first event and kept open. Writes are best-effort; open or write failures are dropped.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    fn record(&self, event: &str, ctx: &LoadContext, details: fmt::Arguments<'_>) {
        let Ok(mut slot) = self.file.lock() else {
            return;
        };
        if slot.is_none() {
            *slot = OpenOptions::new().create(true).append(true).open(&self.path).ok();
        }
        if let Some(f) = slot.as_mut() {
            let format = ctx.format.map_or("unknown", |d| d.as_str());
            let _ = writeln!(
                f,
                "{} {event} format={format} path={} {details}",
                unix_ts(),
                ctx.path.display()
            );
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        match stats.records {
            Some(n) => self.record("ok", ctx, format_args!("records={n}")),
            None => self.record("ok", ctx, format_args!("records=stream")),
        }
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.record("fail", ctx, format_args!("severity={} err={error}", severity.label()));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.record("ALERT", ctx, format_args!("severity={} err={error}", severity.label()));
    }

    fn on_warning(&self, ctx: &LoadContext, severity: LoadSeverity, message: &str) {
        self.record("warn", ctx, format_args!("severity={} msg={message}", severity.label()));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
