//! The executor boundary: what a host engine hands to the hooks.
//!
//! The engine owns statement execution. This module only describes the shape
//! of a statement ([`QueryDesc`]), the per-node plan tree ([`PlanNode`]), the
//! engine's own implementation of each stage ([`StandardExecutor`]), and the
//! ordered hook chain every stage is routed through ([`HookChain`]).

mod chain;
mod instrument;
mod nesting;

pub use chain::{Backend, ExecutorHook, HookChain, Next};
pub use instrument::{BufferUsage, InstrumentOptions, Instrumentation, WalUsage};
pub use nesting::{NestingGuard, NestingTracker};

use crate::error::WatchResult;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

bitflags! {
    /// Flags passed to the start stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExecFlags: u32 {
        /// Plan is only being described, it will not run.
        const EXPLAIN_ONLY = 1 << 0;
    }
}

/// Direction of a run stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    Backward,
    NoMovement,
    #[default]
    Forward,
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Null,
    Text(String),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("NULL"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// One node of an execution plan, with optional runtime instrumentation.
#[derive(Debug, Clone, Default)]
pub struct PlanNode {
    pub node_type: String,
    pub relation_name: Option<String>,
    pub alias: Option<String>,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub plan_rows: f64,
    pub plan_width: u32,
    /// Output column expressions.
    pub output: Vec<String>,
    pub children: Vec<PlanNode>,
    /// Filled by the engine when instrumentation was requested.
    pub instrument: Option<Instrumentation>,
}

impl PlanNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Set the scanned relation.
    pub fn on(mut self, relation: impl Into<String>) -> Self {
        self.relation_name = Some(relation.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn cost(mut self, startup: f64, total: f64) -> Self {
        self.startup_cost = startup;
        self.total_cost = total;
        self
    }

    pub fn rows(mut self, rows: f64) -> Self {
        self.plan_rows = rows;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.plan_width = width;
        self
    }

    pub fn output<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn child(mut self, node: PlanNode) -> Self {
        self.children.push(node);
        self
    }

    /// Give every node of the tree a fresh accumulator for `options`.
    ///
    /// Does nothing when no instrumentation was requested.
    pub fn attach_instrumentation(&mut self, options: InstrumentOptions) {
        if options.is_empty() {
            return;
        }
        self.for_each_mut(&mut |node| node.instrument = Some(Instrumentation::new(options)));
    }

    /// Visit this node and all descendants, parents first.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut PlanNode)) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }
}

/// Runtime statistics of one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerStats {
    pub name: String,
    pub constraint_name: Option<String>,
    pub relation: Option<String>,
    pub calls: u64,
    pub time: Duration,
}

impl TriggerStats {
    pub fn new(name: impl Into<String>, calls: u64, time: Duration) -> Self {
        Self {
            name: name.into(),
            constraint_name: None,
            relation: None,
            calls,
            time,
        }
    }

    pub fn on(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn for_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint_name = Some(constraint.into());
        self
    }
}

/// Everything that belongs to one statement execution.
///
/// The statement owns its accumulators: dropping the `QueryDesc` (at the end
/// of execution or after a failure) releases them.
#[derive(Debug, Clone)]
pub struct QueryDesc {
    pub source_text: String,
    pub params: Vec<ParamValue>,
    pub plan: PlanNode,
    /// Planner settings that differ from their defaults.
    pub planner_settings: BTreeMap<String, String>,
    pub triggers: Vec<TriggerStats>,
    /// Instrumentation requested by hooks before the start stage.
    pub instrument_options: InstrumentOptions,
    /// Whole-statement accumulator, allocated by a hook that wants the total time.
    pub totaltime: Option<Instrumentation>,
}

impl QueryDesc {
    pub fn new(source_text: impl Into<String>, plan: PlanNode) -> Self {
        Self {
            source_text: source_text.into(),
            params: Vec::new(),
            plan,
            planner_settings: BTreeMap::new(),
            triggers: Vec::new(),
            instrument_options: InstrumentOptions::empty(),
            totaltime: None,
        }
    }

    pub fn with_param(mut self, value: impl Into<ParamValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.planner_settings.insert(name.into(), value.into());
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerStats) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// The engine's own implementation of each executor stage.
///
/// Reached after every installed hook has delegated. `backend` lets the engine
/// execute nested statements through the same hook chain.
pub trait StandardExecutor: Send + Sync {
    fn executor_start(
        &self,
        backend: &Backend,
        query: &mut QueryDesc,
        eflags: ExecFlags,
    ) -> WatchResult<bool>;

    fn executor_run(
        &self,
        backend: &Backend,
        query: &mut QueryDesc,
        direction: ScanDirection,
        count: u64,
    ) -> WatchResult<()>;

    fn executor_finish(&self, backend: &Backend, query: &mut QueryDesc) -> WatchResult<()>;

    fn executor_end(&self, backend: &Backend, query: &mut QueryDesc) -> WatchResult<()>;
}

/// An executor that accepts every plan and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl StandardExecutor for NoopExecutor {
    fn executor_start(&self, _: &Backend, _: &mut QueryDesc, _: ExecFlags) -> WatchResult<bool> {
        Ok(true)
    }

    fn executor_run(
        &self,
        _: &Backend,
        _: &mut QueryDesc,
        _: ScanDirection,
        _: u64,
    ) -> WatchResult<()> {
        Ok(())
    }

    fn executor_finish(&self, _: &Backend, _: &mut QueryDesc) -> WatchResult<()> {
        Ok(())
    }

    fn executor_end(&self, _: &Backend, _: &mut QueryDesc) -> WatchResult<()> {
        Ok(())
    }
}
