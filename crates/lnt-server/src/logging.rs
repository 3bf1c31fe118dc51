// crates/lnt-server/src/logging.rs
// ============================================================================
// Module: LNT Logging
// Description: Tracing subscriber with stderr, in-memory, and rotating file output.
// Purpose: Back the application's file logging and the `/log` view.
// Dependencies: tracing, tracing-subscriber, time
// ============================================================================

//! ## Overview
//! [`start_file_logging`] installs the process-wide subscriber once. Events
//! go to stderr, to a bounded [`MemoryLog`] rendered by the `/log` page, and
//! (outside debug mode) to a size-rotating file. The file and memory outputs
//! use the `<asctime> <LEVEL>: <message> [in <path>:<line>]` layout.
//!
//! A log file that cannot be opened is reported on stderr and skipped; the
//! server keeps running without it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use lnt_config::LoggingConfig;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timestamp layout of file and memory log lines.
const ASCTIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]"
);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive does not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInstalled(String),
}

// ============================================================================
// SECTION: Installation
// ============================================================================

/// Outputs created by [`start_file_logging`].
#[derive(Debug, Clone)]
pub struct LoggingHandles {
    /// In-memory log for the `/log` view.
    pub memory: MemoryLog,
    /// Rotating file, when file logging started.
    pub file: Option<RotatingFileWriter>,
}

/// Installs the global subscriber.
///
/// File logging is skipped in debug mode or when the file cannot be opened.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn start_file_logging(
    config: &LoggingConfig,
    debug: bool,
) -> Result<LoggingHandles, LoggingError> {
    let filter =
        EnvFilter::try_new(&config.filter).map_err(|err| LoggingError::Filter(err.to_string()))?;
    let memory = MemoryLog::new(config.memory_capacity_bytes);
    let file = if debug { None } else { open_log_file(config) };
    let file_layer = file.clone().map(|writer| {
        fmt::layer().event_format(LntLogFormat).with_ansi(false).with_writer(writer)
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().event_format(LntLogFormat).with_ansi(false).with_writer(memory.clone()))
        .with(file_layer)
        .try_init()
        .map_err(|err| LoggingError::AlreadyInstalled(err.to_string()))?;
    if let Some(writer) = &file {
        tracing::info!("Started file logging.");
        let announcement = format!("Logging to : {}", writer.path().display());
        if let Err(err) = write_line(&mut io::stdout(), &announcement) {
            tracing::warn!(error = %err, "failed to announce log file on stdout");
        }
    }
    Ok(LoggingHandles {
        memory,
        file,
    })
}

/// Opens the configured log file, reporting failures on stderr.
fn open_log_file(config: &LoggingConfig) -> Option<RotatingFileWriter> {
    match RotatingFileWriter::open(&config.file, config.max_bytes, config.backup_count) {
        Ok(writer) => Some(writer),
        Err(err) => {
            let mut stderr = io::stderr();
            let _ = write_line(
                &mut stderr,
                &format!("Error making log file {} {err}", config.file.display()),
            )
            .and_then(|()| write_line(&mut stderr, "Will not log to file."));
            None
        }
    }
}

/// Writes one line to an output stream.
fn write_line(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{message}")
}

// ============================================================================
// SECTION: Line Format
// ============================================================================

/// `<asctime> <LEVEL>: <message> [in <path>:<line>]`
#[derive(Debug, Clone, Copy, Default)]
pub struct LntLogFormat;

impl<S, N> FormatEvent<S, N> for LntLogFormat
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
        let metadata = event.metadata();
        let asctime = OffsetDateTime::now_utc().format(ASCTIME_FORMAT).unwrap_or_default();
        write!(writer, "{asctime} {}: ", level_name(*metadata.level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(
            writer,
            " [in {}:{}]",
            metadata.file().unwrap_or("<unknown>"),
            metadata.line().unwrap_or(0)
        )
    }
}

/// Level label; warnings read `WARNING`.
fn level_name(level: Level) -> &'static str {
    if level == Level::WARN { "WARNING" } else { level.as_str() }
}

// ============================================================================
// SECTION: Memory Log
// ============================================================================

/// Bounded in-memory log; the oldest lines are evicted first.
///
/// # Invariants
/// - The stored lines never exceed the byte capacity.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    /// Shared line buffer.
    inner: Arc<Mutex<MemoryBuffer>>,
}

/// Lines and their total size.
#[derive(Debug)]
struct MemoryBuffer {
    /// Stored lines, oldest first.
    lines: VecDeque<String>,
    /// Sum of stored line lengths.
    bytes: usize,
    /// Maximum total size.
    capacity: usize,
}

impl MemoryLog {
    /// Creates an empty log holding at most `capacity_bytes`.
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryBuffer {
                lines: VecDeque::new(),
                bytes: 0,
                capacity: capacity_bytes,
            })),
        }
    }

    /// Appends a line, evicting old lines to make room. Lines longer than the
    /// capacity are truncated.
    pub fn push(&self, line: &str) {
        let Ok(mut buffer) = self.inner.lock() else {
            return;
        };
        let line = truncate_to_boundary(line, buffer.capacity);
        while buffer.bytes + line.len() > buffer.capacity {
            let Some(evicted) = buffer.lines.pop_front() else {
                break;
            };
            buffer.bytes -= evicted.len();
        }
        buffer.bytes += line.len();
        buffer.lines.push_back(line.to_string());
    }

    /// Returns the stored lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().map(|buffer| buffer.lines.iter().cloned().collect()).unwrap_or_default()
    }

    /// Returns the stored lines joined by newlines.
    #[must_use]
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }

    /// Returns the total size of the stored lines.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().map(|buffer| buffer.bytes).unwrap_or_default()
    }
}

/// Cuts `line` to at most `max` bytes on a char boundary.
fn truncate_to_boundary(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line.get(..end).unwrap_or_default()
}

/// One formatted event bound for a [`MemoryLog`].
#[derive(Debug)]
pub struct MemoryLogRecord {
    /// Destination log.
    log: MemoryLog,
    /// Bytes written for the event.
    buffer: Vec<u8>,
}

impl Write for MemoryLogRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryLogRecord {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buffer);
        for line in text.lines() {
            self.log.push(line);
        }
    }
}

impl<'a> MakeWriter<'a> for MemoryLog {
    type Writer = MemoryLogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        MemoryLogRecord {
            log: self.clone(),
            buffer: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Rotating File
// ============================================================================

/// Log file that rolls over by size.
///
/// When a record would take the file to `max_bytes`, `file.N` moves to
/// `file.N+1` for every backup, `file` becomes `file.1`, and the oldest
/// backup beyond `backup_count` is discarded. Rotation is off when either
/// limit is zero.
#[derive(Debug, Clone)]
pub struct RotatingFileWriter {
    /// Log file path.
    path: PathBuf,
    /// Open file and rotation state.
    inner: Arc<Mutex<RotatingFile>>,
}

/// Mutable rotation state.
#[derive(Debug)]
struct RotatingFile {
    /// Log file path.
    path: PathBuf,
    /// Rotation threshold in bytes.
    max_bytes: u64,
    /// Number of backups kept.
    backup_count: usize,
    /// Current file, opened for append.
    file: File,
    /// Current file size.
    written: u64,
}

impl RotatingFileWriter {
    /// Opens (or creates) the log file for appending.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be opened.
    pub fn open(path: &Path, max_bytes: u64, backup_count: usize) -> io::Result<Self> {
        let file = open_append(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Arc::new(Mutex::new(RotatingFile {
                path: path.to_path_buf(),
                max_bytes,
                backup_count,
                file,
                written,
            })),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, rotating first when needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from rotation or the write.
    pub fn write_record(&self, record: &[u8]) -> io::Result<()> {
        let mut file =
            self.inner.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.write_record(record)
    }
}

impl RotatingFile {
    /// Appends one record, rotating first when needed.
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let incoming = u64::try_from(record.len()).unwrap_or(u64::MAX);
        if self.should_rollover(incoming) {
            self.rotate()?;
        }
        self.file.write_all(record)?;
        self.file.flush()?;
        self.written = self.written.saturating_add(incoming);
        Ok(())
    }

    /// True when appending `incoming` bytes reaches the threshold.
    const fn should_rollover(&self, incoming: u64) -> bool {
        self.max_bytes > 0
            && self.backup_count > 0
            && self.written > 0
            && self.written.saturating_add(incoming) >= self.max_bytes
    }

    /// Shifts backups and starts a fresh file.
    fn rotate(&mut self) -> io::Result<()> {
        for index in (1..self.backup_count).rev() {
            let source = backup_path(&self.path, index);
            if source.exists() {
                let target = backup_path(&self.path, index + 1);
                if target.exists() {
                    fs::remove_file(&target)?;
                }
                fs::rename(&source, &target)?;
            }
        }
        let first = backup_path(&self.path, 1);
        if first.exists() {
            fs::remove_file(&first)?;
        }
        fs::rename(&self.path, &first)?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Opens `path` for appending, creating it when missing.
fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Path of backup number `index`.
#[must_use]
pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// One formatted event bound for a [`RotatingFileWriter`].
#[derive(Debug)]
pub struct RotatingFileRecord {
    /// Destination file.
    writer: RotatingFileWriter,
    /// Bytes written for the event.
    buffer: Vec<u8>,
}

impl Write for RotatingFileRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RotatingFileRecord {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Err(err) = self.writer.write_record(&self.buffer) {
            let _ = writeln!(io::stderr(), "log file write failed: {err}");
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileRecord;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileRecord {
            writer: self.clone(),
            buffer: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
