//! Logging execution plans of statements as they finish.
//!
//! [`PlanWatch`] is an [`ExecutorHook`]. At start it decides whether the
//! statement is watched, asks the engine for per-node instrumentation and
//! gives the statement a whole-statement accumulator. Around run and finish it
//! tracks how deeply statements are nested. At end it renders the plan and
//! emits one record through its [`LogSink`].
//!
//! ```ignore
//! use plan_watch::{Backend, ConfigHandle, HookChain, PlanWatch, WatchConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = ConfigHandle::new(WatchConfig::new().with_min_duration(Duration::ZERO));
//! let mut chain = HookChain::new(engine);
//! chain.install(PlanWatch::new(config.clone()));
//! let backend = Backend::new(Arc::new(chain));
//!
//! config.set("plan_watch.log_analyze", "on")?;
//! backend.execute(&mut query)?;
//! ```

mod policy;
mod report;
mod sink;


pub use policy::{is_enabled, negotiate_instrumentation};
pub use report::{Report, build_report, explain_options, repair_output};
pub use sink::{LogRecord, LogSink, MemoryLogSink, TracingLogSink};

use crate::config::{ConfigHandle, WatchConfig};
use crate::error::WatchResult;
use crate::explain::{ExplainRenderer, PlanRenderer};
use crate::executor::{
    ExecFlags, ExecutorHook, HookChain, InstrumentOptions, Instrumentation, Next, QueryDesc,
    ScanDirection,
};
use std::fmt;
use std::sync::Arc;

/// Executor hook that logs the plan of every watched statement.
#[derive(Clone)]
pub struct PlanWatch {
    config: ConfigHandle,
    renderer: Arc<dyn PlanRenderer>,
    sink: Arc<dyn LogSink>,
}

impl PlanWatch {
    /// Watch with the built-in renderer, logging through `tracing`.
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            renderer: Arc::new(ExplainRenderer::new()),
            sink: Arc::new(TracingLogSink::new()),
        }
    }

    pub fn with_renderer<R: PlanRenderer + 'static>(self, renderer: R) -> Self {
        self.with_renderer_arc(Arc::new(renderer))
    }

    pub fn with_renderer_arc(mut self, renderer: Arc<dyn PlanRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_sink<S: LogSink + 'static>(self, sink: S) -> Self {
        self.with_sink_arc(Arc::new(sink))
    }

    pub fn with_sink_arc(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Install into `chain` in front of the hooks already there.
    pub fn install(self, chain: &mut HookChain) -> &mut HookChain {
        chain.install(self)
    }

    fn emit(&self, config: &WatchConfig, query: &QueryDesc) -> WatchResult<()> {
        let report = build_report(config, self.renderer.as_ref(), query)?;
        self.sink.emit(&LogRecord {
            level: config.log_level,
            message: report.message(),
            hide_statement: true,
        })
    }
}

impl fmt::Debug for PlanWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanWatch")
            .field("config", &self.config.snapshot())
            .finish_non_exhaustive()
    }
}

impl ExecutorHook for PlanWatch {
    fn executor_start(
        &self,
        query: &mut QueryDesc,
        eflags: ExecFlags,
        next: Next<'_>,
    ) -> WatchResult<bool> {
        let depth = next.backend().nesting().depth();

        let config = self.config.snapshot();
        if is_enabled(&config, depth) {
            let requested = negotiate_instrumentation(&config, eflags);
            if !requested.is_empty() {
                tracing::debug!(
                    target: "plan_watch",
                    depth,
                    options = ?requested,
                    "requesting plan instrumentation"
                );
                query.instrument_options |= requested;
            }
        }

        if !next.start(query, eflags)? {
            return Ok(false);
        }

        let config = self.config.snapshot();
        if is_enabled(&config, depth) && query.totaltime.is_none() {
            tracing::debug!(target: "plan_watch", depth, "allocating statement accumulator");
            query.totaltime = Some(Instrumentation::new(InstrumentOptions::ALL));
        }
        Ok(true)
    }

    fn executor_run(
        &self,
        query: &mut QueryDesc,
        direction: ScanDirection,
        count: u64,
        next: Next<'_>,
    ) -> WatchResult<()> {
        let _nested = next.backend().nesting().enter();
        next.run(query, direction, count)
    }

    fn executor_finish(&self, query: &mut QueryDesc, next: Next<'_>) -> WatchResult<()> {
        let _nested = next.backend().nesting().enter();
        next.finish(query)
    }

    fn executor_end(&self, query: &mut QueryDesc, next: Next<'_>) -> WatchResult<()> {
        let depth = next.backend().nesting().depth();
        let config = self.config.snapshot();

        let mut reported = Ok(());
        if is_enabled(&config, depth) {
            if let Some(totaltime) = query.totaltime.as_mut() {
                totaltime.end_loop();
                reported = self.emit(&config, query);
            }
        }

        // The rest of the chain ends the statement even if the report failed.
        next.end(query)?;
        reported
    }
}
