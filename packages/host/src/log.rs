//! The log bridge: guest diagnostics forwarded to a host sink.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Fault;
use crate::memory::GuestMemory;

/// Severity of a guest log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Unknown levels are treated as info.
    pub fn from_guest(raw: i32) -> Self {
        match raw {
            0 => LogLevel::Debug,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        })
    }
}

/// Where guest log messages end up.
pub trait LogSink {
    fn log(&mut self, level: LogLevel, message: &str);
}

/// Forwards guest messages to `tracing` under the `guest` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "guest", "{}", message),
            LogLevel::Info => tracing::info!(target: "guest", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "guest", "{}", message),
            LogLevel::Error => tracing::error!(target: "guest", "{}", message),
        }
    }
}

/// Keeps every message in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for RecordingSink {
    fn log(&mut self, level: LogLevel, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

/// Service `runtime_log(level, ptr, len)`.
///
/// The text range must lie inside guest memory. Text that is not valid
/// UTF-8 is replaced by a placeholder and reported as a warning.
pub fn forward(
    sink: &mut dyn LogSink,
    memory: &GuestMemory<'_>,
    level: i32,
    ptr: i32,
    len: i32,
) -> Result<(), Fault> {
    let bytes = memory.bytes("runtime_log", ptr, len)?;
    match std::str::from_utf8(bytes) {
        Ok(text) => sink.log(LogLevel::from_guest(level), text),
        Err(_) => sink.log(
            LogLevel::Warning,
            &format!("<invalid utf-8: {} bytes>", bytes.len()),
        ),
    }
    Ok(())
}
