//! Runtime configuration for plan logging.
//!
//! [`WatchConfig`] is a plain snapshot of every knob. The hooks never hold on to
//! it: each decision point reads a fresh snapshot from a shared
//! [`ConfigHandle`], which is also the privileged channel used to change
//! knobs at runtime (by name, with validation).
//!
//! # Example
//!
//! ```rust
//! use plan_watch::config::{ConfigHandle, ExplainFormat, WatchConfig};
//! use std::time::Duration;
//!
//! let handle = ConfigHandle::new(
//!     WatchConfig::new()
//!         .with_min_duration(Duration::from_millis(250))
//!         .with_format(ExplainFormat::Json),
//! );
//!
//! handle.set("plan_watch.log_analyze", "on").unwrap();
//! assert_eq!(handle.show("plan_watch.log_min_duration").unwrap(), "250ms");
//! ```

mod knobs;


pub use knobs::{KNOBS, Knob, KnobKind, KnobUnit, SETTING_PREFIX, Setting};

use crate::error::{WatchError, WatchResult};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Output format of the rendered plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainFormat {
    /// Indented human-readable text
    #[default]
    Text,
    /// XML document
    Xml,
    /// JSON object
    Json,
    /// YAML mapping
    Yaml,
}

impl ExplainFormat {
    /// Accepted setting values.
    pub const NAMES: &'static [&'static str] = &["text", "xml", "json", "yaml"];

    /// Setting value for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            ExplainFormat::Text => "text",
            ExplainFormat::Xml => "xml",
            ExplainFormat::Json => "json",
            ExplainFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ExplainFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplainFormat {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ExplainFormat::Text),
            "xml" => Ok(ExplainFormat::Xml),
            "json" => Ok(ExplainFormat::Json),
            "yaml" => Ok(ExplainFormat::Yaml),
            _ => Err(WatchError::invalid_setting(
                "log_format",
                s,
                format!("available values: {}", Self::NAMES.join(", ")),
            )),
        }
    }
}

/// Severity of the emitted plan record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug5,
    Debug4,
    Debug3,
    #[serde(alias = "debug")]
    Debug2,
    Debug1,
    #[default]
    Log,
    Info,
    Notice,
    Warning,
}

impl LogLevel {
    /// Accepted setting values (`debug` is an alias for `debug2`).
    pub const NAMES: &'static [&'static str] = &[
        "debug5", "debug4", "debug3", "debug2", "debug1", "debug", "info", "notice", "warning",
        "log",
    ];

    /// Setting value for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug5 => "debug5",
            LogLevel::Debug4 => "debug4",
            LogLevel::Debug3 => "debug3",
            LogLevel::Debug2 => "debug2",
            LogLevel::Debug1 => "debug1",
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
        }
    }

    /// The `tracing` level records of this severity are dispatched at.
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug5 | LogLevel::Debug4 => tracing::Level::TRACE,
            LogLevel::Debug3 | LogLevel::Debug2 | LogLevel::Debug1 => tracing::Level::DEBUG,
            LogLevel::Log | LogLevel::Info | LogLevel::Notice => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug5" => Ok(LogLevel::Debug5),
            "debug4" => Ok(LogLevel::Debug4),
            "debug3" => Ok(LogLevel::Debug3),
            "debug2" | "debug" => Ok(LogLevel::Debug2),
            "debug1" => Ok(LogLevel::Debug1),
            "log" => Ok(LogLevel::Log),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" => Ok(LogLevel::Warning),
            _ => Err(WatchError::invalid_setting(
                "log_level",
                s,
                format!("available values: {}", Self::NAMES.join(", ")),
            )),
        }
    }
}

/// Snapshot of every plan-logging knob.
///
/// `log_buffers`, `log_wal`, `log_triggers` and `log_timing` only matter when
/// `log_analyze` is set; that is checked where they are used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Minimum execution time gate. `None` disables plan logging entirely.
    #[serde(deserialize_with = "deserialize_min_duration")]
    pub log_min_duration: Option<Duration>,
    /// Truncate logged parameter values to this many bytes. `None` logs them in full.
    #[serde(deserialize_with = "deserialize_parameter_max_length")]
    pub log_parameter_max_length: Option<usize>,
    /// Collect per-node runtime statistics.
    pub log_analyze: bool,
    /// Include per-node output columns.
    pub log_verbose: bool,
    /// Include buffer usage.
    pub log_buffers: bool,
    /// Include WAL usage.
    pub log_wal: bool,
    /// Include trigger statistics.
    pub log_triggers: bool,
    /// Collect timing, not just row counts.
    pub log_timing: bool,
    /// Include non-default planner settings.
    pub log_settings: bool,
    /// Plan output format.
    pub log_format: ExplainFormat,
    /// Severity of the emitted record.
    pub log_level: LogLevel,
    /// Also log statements executed inside other statements.
    pub log_nested_statements: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_min_duration: None,
            log_parameter_max_length: None,
            log_analyze: false,
            log_verbose: false,
            log_buffers: false,
            log_wal: false,
            log_triggers: false,
            log_timing: true,
            log_settings: false,
            log_format: ExplainFormat::Text,
            log_level: LogLevel::Log,
            log_nested_statements: false,
        }
    }
}

impl WatchConfig {
    /// Create a configuration with defaults (logging disabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document whose keys are the knob short names.
    pub fn from_toml_str(raw: &str) -> WatchResult<Self> {
        toml::from_str(raw).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> WatchResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            WatchError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Enable logging with the given duration gate.
    pub fn with_min_duration(mut self, threshold: Duration) -> Self {
        self.log_min_duration = Some(threshold);
        self
    }

    /// Disable logging.
    pub fn disable(mut self) -> Self {
        self.log_min_duration = None;
        self
    }

    /// Truncate logged parameter values to `max_bytes`.
    pub fn with_parameter_max_length(mut self, max_bytes: usize) -> Self {
        self.log_parameter_max_length = Some(max_bytes);
        self
    }

    pub fn with_analyze(mut self, on: bool) -> Self {
        self.log_analyze = on;
        self
    }

    pub fn with_verbose(mut self, on: bool) -> Self {
        self.log_verbose = on;
        self
    }

    pub fn with_buffers(mut self, on: bool) -> Self {
        self.log_buffers = on;
        self
    }

    pub fn with_wal(mut self, on: bool) -> Self {
        self.log_wal = on;
        self
    }

    pub fn with_triggers(mut self, on: bool) -> Self {
        self.log_triggers = on;
        self
    }

    pub fn with_timing(mut self, on: bool) -> Self {
        self.log_timing = on;
        self
    }

    pub fn with_settings(mut self, on: bool) -> Self {
        self.log_settings = on;
        self
    }

    pub fn with_format(mut self, format: ExplainFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_nested_statements(mut self, on: bool) -> Self {
        self.log_nested_statements = on;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSetting {
    Int(i64),
    Text(String),
}

impl RawSetting {
    fn into_text(self) -> String {
        match self {
            RawSetting::Int(n) => n.to_string(),
            RawSetting::Text(s) => s,
        }
    }
}

fn deserialize_min_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawSetting::deserialize(deserializer)?.into_text();
    knobs::parse_duration("log_min_duration", &raw).map_err(serde::de::Error::custom)
}

fn deserialize_parameter_max_length<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawSetting::deserialize(deserializer)?.into_text();
    knobs::parse_bytes("log_parameter_max_length", &raw).map_err(serde::de::Error::custom)
}

/// Shared, runtime-mutable configuration.
///
/// Clones share the same underlying values. Readers take a snapshot; writers
/// go through [`set`](Self::set) so every value is validated.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<WatchConfig>>,
}

impl ConfigHandle {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> WatchConfig {
        self.read().clone()
    }

    /// Replace every value at once.
    pub fn replace(&self, config: WatchConfig) {
        *self.write() = config;
    }

    /// Set one knob by name (`plan_watch.log_analyze` or `log_analyze`).
    pub fn set(&self, name: &str, value: &str) -> WatchResult<()> {
        let knob = knobs::lookup(name)?;
        knobs::apply(&mut self.write(), knob, value)
    }

    /// Restore one knob to its default.
    pub fn reset(&self, name: &str) -> WatchResult<()> {
        let knob = knobs::lookup(name)?;
        let default = knobs::show(&WatchConfig::default(), knob);
        knobs::apply(&mut self.write(), knob, &default)
    }

    /// Current value of one knob in canonical form.
    pub fn show(&self, name: &str) -> WatchResult<String> {
        let knob = knobs::lookup(name)?;
        Ok(knobs::show(&self.read(), knob))
    }

    /// Every knob with its qualified name and current value.
    pub fn show_all(&self) -> Vec<(String, String)> {
        let config = self.read();
        KNOBS
            .iter()
            .map(|knob| (knob.qualified_name(), knobs::show(&config, knob)))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, WatchConfig> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WatchConfig> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
