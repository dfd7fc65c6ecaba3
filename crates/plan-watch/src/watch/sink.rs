use crate::config::LogLevel;
use crate::error::WatchResult;
use std::sync::{Mutex, PoisonError};
use tracing::Level;

/// One emitted plan report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// The statement text is already part of the ambient log context and
    /// should not be repeated next to this record.
    pub hide_statement: bool,
}

/// Destination of plan reports.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord) -> WatchResult<()>;
}

/// Emits records as `tracing` events under the `plan_watch` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl TracingLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingLogSink {
    fn emit(&self, record: &LogRecord) -> WatchResult<()> {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        emit_at_level!(
            record.level.tracing_level(),
            target: "plan_watch",
            severity = %record.level,
            hide_statement = record.hide_statement,
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    /// Messages of the records emitted so far.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, record: &LogRecord) -> WatchResult<()> {
        self.lock().push(record.clone());
        Ok(())
    }
}
