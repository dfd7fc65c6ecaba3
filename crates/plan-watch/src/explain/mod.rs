//! Plan rendering.
//!
//! [`PlanRenderer`] is the seam to whatever turns a plan plus statistics into
//! text. The report builder drives it section by section, always in the same
//! order: header, statement text, parameters, plan, triggers, trailer.
//! [`ExplainRenderer`] is the built-in implementation for [`PlanNode`] trees.
//!
//! [`PlanNode`]: crate::executor::PlanNode

mod output;
mod renderer;


pub use output::ExplainOutput;
pub use renderer::ExplainRenderer;

use crate::config::ExplainFormat;
use crate::error::WatchResult;
use crate::executor::{ParamValue, QueryDesc};

/// What a rendered plan includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplainOptions {
    pub format: ExplainFormat,
    /// Include runtime statistics.
    pub analyze: bool,
    pub verbose: bool,
    pub costs: bool,
    pub buffers: bool,
    pub wal: bool,
    /// Include timing in runtime statistics.
    pub timing: bool,
    pub summary: bool,
    /// Include non-default planner settings.
    pub settings: bool,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            format: ExplainFormat::Text,
            analyze: false,
            verbose: false,
            costs: true,
            buffers: false,
            wal: false,
            timing: false,
            summary: false,
            settings: false,
        }
    }
}

/// Renders one statement into an [`ExplainOutput`], section by section.
pub trait PlanRenderer: Send + Sync {
    /// Write the document header.
    fn begin_output(&self, out: &mut ExplainOutput) -> WatchResult<()> {
        out.begin_output();
        Ok(())
    }

    /// Write the statement text.
    fn query_text(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()>;

    /// Write the bound parameters, each truncated to `max_length` bytes when set.
    fn query_parameters(
        &self,
        out: &mut ExplainOutput,
        params: &[ParamValue],
        max_length: Option<usize>,
    ) -> WatchResult<()>;

    /// Write the plan tree.
    fn print_plan(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()>;

    /// Write trigger statistics.
    fn print_triggers(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()>;

    /// Write the document trailer.
    fn end_output(&self, out: &mut ExplainOutput) -> WatchResult<()> {
        out.end_output();
        Ok(())
    }
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub(crate) fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
