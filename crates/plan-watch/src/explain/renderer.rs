use super::{ExplainOutput, PlanRenderer, truncate_bytes};
use crate::config::ExplainFormat;
use crate::error::WatchResult;
use crate::executor::{BufferUsage, Instrumentation, ParamValue, PlanNode, QueryDesc, WalUsage};
use std::collections::BTreeMap;

/// Built-in renderer for [`PlanNode`] trees in every [`ExplainFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainRenderer;

impl ExplainRenderer {
    pub fn new() -> Self {
        Self
    }

    fn explain_node(&self, out: &mut ExplainOutput, node: &PlanNode, relationship: Option<&str>) {
        let opts = *out.options();
        let text = opts.format == ExplainFormat::Text;
        let instr = node.instrument.as_ref().map(Instrumentation::finalized);
        let executed = instr.as_ref().filter(|i| i.nloops > 0.0);
        let label = relationship.is_none().then_some("Plan");
        let save_indent = out.indent();

        if text {
            if save_indent > 0 {
                out.push_indent();
                out.push_str("->  ");
                out.set_indent(save_indent + 2);
            }
            out.push_str(&node.node_type);
            if let Some(relation) = &node.relation_name {
                out.push_str(&format!(" on {relation}"));
                if let Some(alias) = node.alias.as_ref().filter(|a| *a != relation) {
                    out.push_str(&format!(" {alias}"));
                }
            }
            if opts.costs {
                out.push_str(&format!(
                    "  (cost={:.2}..{:.2} rows={:.0} width={})",
                    node.startup_cost, node.total_cost, node.plan_rows, node.plan_width
                ));
            }
            if opts.analyze {
                match executed {
                    Some(i) => {
                        let (startup_ms, total_ms, rows) = per_loop(i);
                        if opts.timing && i.has_timer() {
                            out.push_str(&format!(" (actual time={startup_ms:.3}..{total_ms:.3}"));
                            out.push_str(&format!(" rows={rows:.0} loops={:.0})", i.nloops));
                        } else {
                            out.push_str(&format!(
                                " (actual rows={rows:.0} loops={:.0})",
                                i.nloops
                            ));
                        }
                    }
                    None => out.push_str(" (never executed)"),
                }
            }
            out.push_str("\n");
            out.set_indent(out.indent() + 1);
        } else {
            out.open_group("Plan", label, true);
            out.property_text("Node Type", &node.node_type);
            if let Some(relationship) = relationship {
                out.property_text("Parent Relationship", relationship);
            }
            if let Some(relation) = &node.relation_name {
                out.property_text("Relation Name", relation);
                out.property_text("Alias", node.alias.as_deref().unwrap_or(relation));
            }
            if opts.costs {
                out.property_float("Startup Cost", None, node.startup_cost, 2);
                out.property_float("Total Cost", None, node.total_cost, 2);
                out.property_float("Plan Rows", None, node.plan_rows, 0);
                out.property_integer("Plan Width", None, i64::from(node.plan_width));
            }
            if opts.analyze {
                let (startup_ms, total_ms, rows, loops) = match executed {
                    Some(i) => {
                        let (s, t, r) = per_loop(i);
                        (s, t, r, i.nloops)
                    }
                    None => (0.0, 0.0, 0.0, 0.0),
                };
                if opts.timing {
                    out.property_float("Actual Startup Time", Some("ms"), startup_ms, 3);
                    out.property_float("Actual Total Time", Some("ms"), total_ms, 3);
                }
                out.property_float("Actual Rows", None, rows, 0);
                out.property_float("Actual Loops", None, loops, 0);
            }
        }

        if opts.verbose && !node.output.is_empty() {
            out.property_list("Output", &node.output);
        }
        if let Some(i) = &instr {
            if opts.buffers {
                show_buffer_usage(out, &i.buffer_usage);
            }
            if opts.wal {
                show_wal_usage(out, &i.wal_usage);
            }
        }

        if !node.children.is_empty() {
            out.open_group("Plans", Some("Plans"), false);
            let count = node.children.len();
            for (idx, child) in node.children.iter().enumerate() {
                let relationship = match (count, idx) {
                    (1 | 2, 0) => "Outer",
                    (2, 1) => "Inner",
                    _ => "Member",
                };
                self.explain_node(out, child, Some(relationship));
            }
            out.close_group("Plans", Some("Plans"), false);
        }

        if text {
            out.set_indent(save_indent);
        } else {
            out.close_group("Plan", label, true);
        }
    }
}

impl PlanRenderer for ExplainRenderer {
    fn query_text(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()> {
        out.property_text("Query Text", &query.source_text);
        Ok(())
    }

    fn query_parameters(
        &self,
        out: &mut ExplainOutput,
        params: &[ParamValue],
        max_length: Option<usize>,
    ) -> WatchResult<()> {
        if params.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = params
            .iter()
            .enumerate()
            .map(|(idx, param)| format!("${} = {}", idx + 1, quote_param(param, max_length)))
            .collect();
        out.property_text("Query Parameters", &rendered.join(", "));
        Ok(())
    }

    fn print_plan(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()> {
        self.explain_node(out, &query.plan, None);
        if out.options().settings {
            print_settings(out, &query.planner_settings);
        }
        Ok(())
    }

    fn print_triggers(&self, out: &mut ExplainOutput, query: &QueryDesc) -> WatchResult<()> {
        if query.triggers.is_empty() {
            return Ok(());
        }
        let opts = *out.options();

        out.open_group("Triggers", Some("Triggers"), false);
        for trigger in &query.triggers {
            let time_ms = trigger.time.as_secs_f64() * 1000.0;
            if opts.format == ExplainFormat::Text {
                let mut line = format!("Trigger {}", trigger.name);
                if let Some(constraint) = &trigger.constraint_name {
                    line.push_str(&format!(" for constraint {constraint}"));
                }
                if let Some(relation) = &trigger.relation {
                    line.push_str(&format!(" on {relation}"));
                }
                if opts.timing {
                    line.push_str(&format!(": time={time_ms:.3} calls={}\n", trigger.calls));
                } else {
                    line.push_str(&format!(": calls={}\n", trigger.calls));
                }
                out.push_indent();
                out.push_str(&line);
            } else {
                out.open_group("Trigger", None, true);
                out.property_text("Trigger Name", &trigger.name);
                if let Some(constraint) = &trigger.constraint_name {
                    out.property_text("Constraint Name", constraint);
                }
                if let Some(relation) = &trigger.relation {
                    out.property_text("Relation", relation);
                }
                if opts.timing {
                    out.property_float("Time", Some("ms"), time_ms, 3);
                }
                out.property_uinteger("Calls", None, trigger.calls);
                out.close_group("Trigger", None, true);
            }
        }
        out.close_group("Triggers", Some("Triggers"), false);
        Ok(())
    }
}

/// Per-loop averages: (startup ms, total ms, rows).
fn per_loop(instr: &Instrumentation) -> (f64, f64, f64) {
    let nloops = instr.nloops;
    (
        instr.startup.as_secs_f64() * 1000.0 / nloops,
        instr.total.as_secs_f64() * 1000.0 / nloops,
        instr.ntuples / nloops,
    )
}

fn quote_param(param: &ParamValue, max_length: Option<usize>) -> String {
    match param {
        ParamValue::Null => "NULL".to_string(),
        ParamValue::Text(value) => {
            let shown = match max_length {
                Some(max) if value.len() > max => format!("{}...", truncate_bytes(value, max)),
                _ => value.clone(),
            };
            format!("'{}'", shown.replace('\'', "''"))
        }
    }
}

fn print_settings(out: &mut ExplainOutput, settings: &BTreeMap<String, String>) {
    if settings.is_empty() {
        return;
    }
    if out.format() == ExplainFormat::Text {
        let rendered: Vec<String> = settings
            .iter()
            .map(|(name, value)| format!("{name} = '{value}'"))
            .collect();
        out.property_text("Settings", &rendered.join(", "));
    } else {
        out.open_group("Settings", Some("Settings"), true);
        for (name, value) in settings {
            out.property_text(name, value);
        }
        out.close_group("Settings", Some("Settings"), true);
    }
}

fn show_buffer_usage(out: &mut ExplainOutput, usage: &BufferUsage) {
    if out.format() == ExplainFormat::Text {
        if usage.is_empty() {
            return;
        }
        let mut parts = Vec::new();
        let shared = counters(&[
            ("hit", usage.shared_hit),
            ("read", usage.shared_read),
            ("dirtied", usage.shared_dirtied),
            ("written", usage.shared_written),
        ]);
        if !shared.is_empty() {
            parts.push(format!("shared {shared}"));
        }
        let temp = counters(&[("read", usage.temp_read), ("written", usage.temp_written)]);
        if !temp.is_empty() {
            parts.push(format!("temp {temp}"));
        }
        out.property_text("Buffers", &parts.join(", "));
    } else {
        out.property_uinteger("Shared Hit Blocks", None, usage.shared_hit);
        out.property_uinteger("Shared Read Blocks", None, usage.shared_read);
        out.property_uinteger("Shared Dirtied Blocks", None, usage.shared_dirtied);
        out.property_uinteger("Shared Written Blocks", None, usage.shared_written);
        out.property_uinteger("Temp Read Blocks", None, usage.temp_read);
        out.property_uinteger("Temp Written Blocks", None, usage.temp_written);
    }
}

fn show_wal_usage(out: &mut ExplainOutput, usage: &WalUsage) {
    if out.format() == ExplainFormat::Text {
        if usage.is_empty() {
            return;
        }
        let line = counters(&[
            ("records", usage.records),
            ("fpi", usage.fpi),
            ("bytes", usage.bytes),
        ]);
        out.property_text("WAL", &line);
    } else {
        out.property_uinteger("WAL Records", None, usage.records);
        out.property_uinteger("WAL FPI", None, usage.fpi);
        out.property_uinteger("WAL Bytes", None, usage.bytes);
    }
}

/// `name=value` pairs for the non-zero counters.
fn counters(pairs: &[(&str, u64)]) -> String {
    pairs
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(name, n)| format!("{name}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}
