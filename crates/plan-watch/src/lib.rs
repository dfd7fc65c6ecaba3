//! # plan-watch
//!
//! Automatic plan logging for a query-execution engine.
//!
//! ## Features
//!
//! - **Executor hooks**: an ordered [`HookChain`] in front of the engine's own
//!   start/run/finish/end stages; hooks compose, newest first
//! - **Plan logging**: [`PlanWatch`] logs `duration: <ms> ms  plan:` plus the
//!   rendered plan for every watched statement as it ends
//! - **Runtime statistics**: optional per-node timing, row counts, buffer and
//!   WAL usage, trigger statistics
//! - **Four output formats**: text, JSON, YAML and XML
//! - **Nesting aware**: statements run from inside other statements are only
//!   logged when asked to
//! - **Runtime configuration**: validated `plan_watch.*` settings, loadable
//!   from TOML
//!
//! ## Example
//!
//! ```ignore
//! use plan_watch::{Backend, ConfigHandle, HookChain, PlanWatch, WatchConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = ConfigHandle::new(
//!     WatchConfig::new()
//!         .with_min_duration(Duration::from_millis(250))
//!         .with_analyze(true),
//! );
//!
//! let mut chain = HookChain::new(engine);
//! chain.install(PlanWatch::new(config.clone()));
//!
//! // One backend per worker thread.
//! let backend = Backend::new(Arc::new(chain));
//! backend.execute(&mut query)?;
//!
//! config.set("plan_watch.log_format", "json")?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod explain;
pub mod watch;

pub use config::{ConfigHandle, ExplainFormat, LogLevel, WatchConfig};
pub use error::{WatchError, WatchResult};
pub use executor::{
    Backend, ExecFlags, ExecutorHook, HookChain, InstrumentOptions, Instrumentation, Next,
    ParamValue, PlanNode, QueryDesc, ScanDirection, StandardExecutor, TriggerStats,
};
pub use explain::{ExplainOptions, ExplainOutput, ExplainRenderer, PlanRenderer};
pub use watch::{LogRecord, LogSink, MemoryLogSink, PlanWatch, Report, TracingLogSink};
