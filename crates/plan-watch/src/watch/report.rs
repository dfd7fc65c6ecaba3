//! Turning a finished statement into one log line.

use crate::config::{ExplainFormat, WatchConfig};
use crate::error::WatchResult;
use crate::explain::{ExplainOptions, ExplainOutput, PlanRenderer};
use crate::executor::QueryDesc;
use std::time::Duration;

/// A rendered plan and the statement's total time.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub duration: Duration,
    pub plan: String,
}

impl Report {
    pub fn duration_millis(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// The log line: `duration: <ms> ms  plan:` followed by the plan.
    pub fn message(&self) -> String {
        format!("duration: {:.3} ms  plan:\n{}", self.duration_millis(), self.plan)
    }
}

/// Rendering options for `query` under `config`.
///
/// Runtime statistics are only shown when the statement has an accumulator
/// and per-node instrumentation was requested for it; the buffers, WAL and
/// timing switches depend on that.
pub fn explain_options(config: &WatchConfig, query: &QueryDesc) -> ExplainOptions {
    let analyze = query.totaltime.is_some()
        && config.log_analyze
        && !query.instrument_options.is_empty();

    ExplainOptions {
        format: config.log_format,
        analyze,
        verbose: config.log_verbose,
        costs: true,
        buffers: analyze && config.log_buffers,
        wal: analyze && config.log_wal,
        timing: analyze && config.log_timing,
        summary: analyze,
        settings: config.log_settings,
    }
}

/// Render `query` and wrap it with its total time.
///
/// The accumulator is expected to be finalized already; a statement without
/// one reports zero.
pub fn build_report(
    config: &WatchConfig,
    renderer: &dyn PlanRenderer,
    query: &QueryDesc,
) -> WatchResult<Report> {
    let options = explain_options(config, query);
    let mut out = ExplainOutput::new(options);

    renderer.begin_output(&mut out)?;
    renderer.query_text(&mut out, query)?;
    renderer.query_parameters(&mut out, &query.params, config.log_parameter_max_length)?;
    renderer.print_plan(&mut out, query)?;
    if options.analyze && config.log_triggers {
        renderer.print_triggers(&mut out, query)?;
    }
    renderer.end_output(&mut out)?;

    Ok(Report {
        duration: query.totaltime.as_ref().map(|t| t.total).unwrap_or_default(),
        plan: repair_output(options.format, out.into_string()),
    })
}

/// Fix up rendered text for a single log line.
///
/// Drops one trailing newline. JSON output is a bracketed list of sibling
/// properties; its outer brackets become braces so it parses as one object.
pub fn repair_output(format: ExplainFormat, mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
    }
    if format != ExplainFormat::Json || (text.starts_with('{') && text.ends_with('}')) {
        return text;
    }

    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return text;
    };
    let inner = &text[first.len_utf8()..text.len() - last.len_utf8()];
    format!("{{{inner}}}")
}
