//! Error types for plan-watch

use thiserror::Error;

/// Result type alias for plan-watch operations
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors raised by the executor hooks, the config layer and the report path
#[derive(Debug, Error)]
pub enum WatchError {
    /// A `plan_watch.*` setting name that does not exist
    #[error("unrecognized configuration parameter \"{0}\"")]
    UnknownSetting(String),

    /// A setting value rejected by validation
    #[error("invalid value for parameter \"{name}\": \"{value}\" ({reason})")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },

    /// Config file could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The wrapped executor stage failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// The plan renderer failed
    #[error("Render error: {0}")]
    Render(String),

    /// The log sink rejected the report
    #[error("Emit error: {0}")]
    Emit(String),
}

impl WatchError {
    /// Create an invalid-setting error
    pub fn invalid_setting(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Create an emit error
    pub fn emit(message: impl Into<String>) -> Self {
        Self::Emit(message.into())
    }

    /// Check if this error came from the wrapped executor
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Check if this error was raised by settings validation
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownSetting(_) | Self::InvalidSetting { .. } | Self::Config(_)
        )
    }
}
