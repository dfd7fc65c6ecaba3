use plan_watch::executor::{BufferUsage, WalUsage};
use plan_watch::{
    Backend, ConfigHandle, ExecFlags, ExplainFormat, HookChain, LogRecord, LogSink,
    MemoryLogSink, PlanNode, PlanWatch, QueryDesc, ScanDirection, StandardExecutor, TriggerStats,
    WatchConfig, WatchError, WatchResult,
};
use regex::Regex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A tiny engine: statements starting with `INVALID` are rejected at start,
/// `FAIL_*` / `PANIC_*` markers in the text break the matching stage, and
/// registered nested statements run inside the parent's run stage.
#[derive(Default)]
struct Engine {
    nested: HashMap<String, Vec<String>>,
    /// (statement, depth seen by the engine during run)
    seen: Mutex<Vec<(String, usize)>>,
    ended: Mutex<Vec<String>>,
}

impl Engine {
    fn nest(mut self, outer: &str, inner: &[&str]) -> Self {
        self.nested
            .insert(outer.to_string(), inner.iter().map(|s| s.to_string()).collect());
        self
    }

    fn seen(&self) -> Vec<(String, usize)> {
        self.seen.lock().unwrap().clone()
    }

    fn ended(&self) -> Vec<String> {
        self.ended.lock().unwrap().clone()
    }
}

impl StandardExecutor for Engine {
    fn executor_start(
        &self,
        _: &Backend,
        query: &mut QueryDesc,
        _: ExecFlags,
    ) -> WatchResult<bool> {
        if query.source_text.starts_with("INVALID") {
            return Ok(false);
        }
        query.plan.attach_instrumentation(query.instrument_options);
        Ok(true)
    }

    fn executor_run(
        &self,
        backend: &Backend,
        query: &mut QueryDesc,
        _: ScanDirection,
        _: u64,
    ) -> WatchResult<()> {
        self.seen
            .lock()
            .unwrap()
            .push((query.source_text.clone(), backend.nesting().depth()));

        if let Some(total) = query.totaltime.as_mut() {
            total.start_node();
        }
        let writes = query.source_text.starts_with("UPDATE");
        query.plan.for_each_mut(&mut |node| {
            let rows = node.plan_rows;
            if let Some(instr) = node.instrument.as_mut() {
                instr.start_node();
                instr.stop_node(rows);
                instr.record_buffers(BufferUsage {
                    shared_hit: 3,
                    ..Default::default()
                });
                if writes {
                    instr.record_wal(WalUsage {
                        records: 1,
                        fpi: 0,
                        bytes: 42,
                    });
                }
            }
        });

        if query.source_text.contains("FAIL_RUN") {
            return Err(WatchError::execution("division by zero"));
        }
        if query.source_text.contains("PANIC_RUN") {
            panic!("engine crashed during run");
        }

        for sql in self.nested.get(&query.source_text).into_iter().flatten() {
            let mut inner = statement(sql);
            backend.execute(&mut inner)?;
        }

        if let Some(total) = query.totaltime.as_mut() {
            total.stop_node(0.0);
        }
        Ok(())
    }

    fn executor_finish(&self, _: &Backend, query: &mut QueryDesc) -> WatchResult<()> {
        if query.source_text.contains("FAIL_FINISH") {
            return Err(WatchError::execution("deferred constraint violated"));
        }
        if query.source_text.contains("PANIC_FINISH") {
            panic!("engine crashed during finish");
        }
        Ok(())
    }

    fn executor_end(&self, _: &Backend, query: &mut QueryDesc) -> WatchResult<()> {
        self.ended.lock().unwrap().push(query.source_text.clone());
        Ok(())
    }
}

fn statement(sql: &str) -> QueryDesc {
    QueryDesc::new(
        sql,
        PlanNode::new("Seq Scan")
            .on("t")
            .cost(0.0, 35.5)
            .rows(25.0)
            .width(4),
    )
}

struct Harness {
    config: ConfigHandle,
    sink: Arc<MemoryLogSink>,
    engine: Arc<Engine>,
    backend: Backend,
}

fn harness(config: WatchConfig, engine: Engine) -> Harness {
    let config = ConfigHandle::new(config);
    let sink = Arc::new(MemoryLogSink::new());
    let engine = Arc::new(engine);

    let mut chain = HookChain::with_standard_arc(engine.clone());
    chain.install(PlanWatch::new(config.clone()).with_sink_arc(sink.clone()));

    Harness {
        config,
        sink,
        engine,
        backend: Backend::new(Arc::new(chain)),
    }
}

fn watched() -> WatchConfig {
    WatchConfig::new().with_min_duration(Duration::ZERO)
}

/// Rendered plan part of a report line.
fn plan_of(message: &str) -> &str {
    message.split_once(" plan:\n").map(|(_, plan)| plan).unwrap()
}

#[test]
fn disabled_threshold_logs_nothing() {
    let h = harness(
        WatchConfig::new().with_analyze(true).with_nested_statements(true),
        Engine::default().nest("SELECT outer()", &["SELECT inner"]),
    );

    for sql in ["SELECT 1", "SELECT outer()", "UPDATE t SET a = 1"] {
        let mut query = statement(sql);
        assert!(h.backend.execute(&mut query).unwrap());
        assert!(query.totaltime.is_none());
        assert!(query.instrument_options.is_empty());
    }
    assert!(h.sink.is_empty());
}

#[test]
fn zero_threshold_logs_one_text_line_per_statement() {
    let h = harness(watched(), Engine::default());
    let line = Regex::new(r"^duration: \d+\.\d{3} ms  plan:\n").unwrap();
    let statements = ["SELECT a FROM t", "SELECT b FROM t", "SELECT c FROM t"];

    for sql in statements {
        h.backend.execute(&mut statement(sql)).unwrap();
    }

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 3);
    for (message, sql) in messages.iter().zip(statements) {
        assert!(line.is_match(message), "unexpected line: {message}");
        assert_eq!(
            plan_of(message),
            format!("Query Text: {sql}\nSeq Scan on t  (cost=0.00..35.50 rows=25 width=4)")
        );
        assert!(!message.contains("actual"));
    }
}

#[test]
fn nested_statements_skipped_by_default() {
    let h = harness(
        watched(),
        Engine::default().nest("SELECT outer()", &["SELECT inner_a", "SELECT inner_b"]),
    );

    assert_eq!(h.backend.nesting().depth(), 0);
    h.backend.execute(&mut statement("SELECT outer()")).unwrap();
    assert_eq!(h.backend.nesting().depth(), 0);

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(plan_of(&messages[0]).starts_with("Query Text: SELECT outer()\n"));

    assert_eq!(
        h.engine.seen(),
        [
            ("SELECT outer()".to_string(), 1),
            ("SELECT inner_a".to_string(), 2),
            ("SELECT inner_b".to_string(), 2),
        ]
    );
}

#[test]
fn nested_statements_logged_when_enabled() {
    let h = harness(
        watched().with_nested_statements(true),
        Engine::default().nest("SELECT outer()", &["SELECT inner"]),
    );

    h.backend.execute(&mut statement("SELECT outer()")).unwrap();

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(plan_of(&messages[0]).starts_with("Query Text: SELECT inner\n"));
    assert!(plan_of(&messages[1]).starts_with("Query Text: SELECT outer()\n"));
}

#[test]
fn depth_restored_after_errors() {
    let h = harness(watched(), Engine::default());

    for sql in ["SELECT FAIL_RUN", "SELECT FAIL_FINISH"] {
        let err = h.backend.execute(&mut statement(sql)).unwrap_err();
        assert!(err.is_execution());
        assert_eq!(h.backend.nesting().depth(), 0);
    }
    assert!(h.sink.is_empty());

    h.backend.execute(&mut statement("SELECT 1")).unwrap();
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn depth_restored_after_panics() {
    let h = harness(watched(), Engine::default());

    for sql in ["SELECT PANIC_RUN", "SELECT PANIC_FINISH"] {
        let mut query = statement(sql);
        let outcome = catch_unwind(AssertUnwindSafe(|| h.backend.execute(&mut query)));
        assert!(outcome.is_err());
        assert_eq!(h.backend.nesting().depth(), 0);
    }

    h.backend.execute(&mut statement("SELECT 1")).unwrap();
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn failing_nested_statement_unwinds_both_levels() {
    let h = harness(
        watched().with_nested_statements(true),
        Engine::default().nest("SELECT outer()", &["SELECT FAIL_RUN"]),
    );

    let err = h.backend.execute(&mut statement("SELECT outer()")).unwrap_err();
    assert!(err.is_execution());
    assert_eq!(h.backend.nesting().depth(), 0);
    assert!(h.sink.is_empty());

    // A top-level statement right after is still treated as top level.
    h.config.set("plan_watch.log_nested_statements", "off").unwrap();
    h.backend.execute(&mut statement("SELECT 1")).unwrap();
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn analyze_dependent_toggles_inert_without_analyze() {
    let h = harness(
        watched()
            .with_buffers(true)
            .with_wal(true)
            .with_triggers(true)
            .with_timing(true),
        Engine::default(),
    );

    let mut query = statement("UPDATE t SET a = 1")
        .with_trigger(TriggerStats::new("audit", 1, Duration::from_micros(10)).on("t"));
    h.backend.execute(&mut query).unwrap();

    assert!(query.instrument_options.is_empty());
    let messages = h.sink.messages();
    let plan = plan_of(&messages[0]);
    for section in ["actual", "Buffers", "WAL", "Trigger"] {
        assert!(!plan.contains(section), "{section} in {plan}");
    }
}

#[test]
fn analyze_adds_runtime_sections() {
    let h = harness(
        watched()
            .with_analyze(true)
            .with_buffers(true)
            .with_wal(true)
            .with_triggers(true),
        Engine::default(),
    );

    let mut query = statement("UPDATE t SET a = 1")
        .with_trigger(TriggerStats::new("audit", 1, Duration::from_micros(10)).on("t"));
    h.backend.execute(&mut query).unwrap();

    let messages = h.sink.messages();
    let plan = plan_of(&messages[0]);
    let node = Regex::new(concat!(
        r"Seq Scan on t  \(cost=0\.00\.\.35\.50 rows=25 width=4\) ",
        r"\(actual time=\d+\.\d{3}\.\.\d+\.\d{3} rows=25 loops=1\)",
    ))
    .unwrap();
    assert!(node.is_match(plan), "{plan}");
    assert!(plan.contains("\n  Buffers: shared hit=3\n"));
    assert!(plan.contains("\n  WAL: records=1 bytes=42\n"));
    assert!(plan.ends_with("\nTrigger audit on t: time=0.010 calls=1"));
}

#[test]
fn analyze_without_timing_reports_rows_only() {
    let h = harness(watched().with_analyze(true).with_timing(false), Engine::default());

    h.backend.execute(&mut statement("SELECT a FROM t")).unwrap();

    let messages = h.sink.messages();
    assert!(plan_of(&messages[0]).ends_with("(actual rows=25 loops=1)"));
}

#[test]
fn json_report_is_one_object() {
    let h = harness(
        watched().with_format(ExplainFormat::Json).with_analyze(true),
        Engine::default(),
    );

    h.backend
        .execute(&mut statement("SELECT a FROM t WHERE b = $1").with_param("x"))
        .unwrap();

    let messages = h.sink.messages();
    let plan = plan_of(&messages[0]);
    assert!(plan.starts_with('{'));
    assert!(plan.ends_with('}'));
    assert!(!plan.ends_with('\n'));

    let value: serde_json::Value = serde_json::from_str(plan).unwrap();
    assert_eq!(value["Query Text"], "SELECT a FROM t WHERE b = $1");
    assert_eq!(value["Query Parameters"], "$1 = 'x'");
    assert_eq!(value["Plan"]["Node Type"], "Seq Scan");
    assert_eq!(value["Plan"]["Actual Rows"], 25);
    assert_eq!(value["Plan"]["Actual Loops"], 1);
}

#[test]
fn threshold_does_not_filter_fast_statements() {
    // The threshold only switches logging on; the measured duration is not
    // compared against it.
    let h = harness(
        WatchConfig::new().with_min_duration(Duration::from_secs(3600)),
        Engine::default(),
    );

    h.backend.execute(&mut statement("SELECT 1")).unwrap();
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn invalid_plan_is_not_logged() {
    let h = harness(watched().with_analyze(true), Engine::default());

    let mut query = statement("INVALID SELECT");
    assert!(!h.backend.execute(&mut query).unwrap());
    assert!(query.totaltime.is_none());
    assert!(h.sink.is_empty());
}

#[test]
fn settings_changes_apply_to_the_next_statement() {
    let h = harness(watched(), Engine::default());

    h.backend.execute(&mut statement("SELECT 1")).unwrap();
    h.config.set("plan_watch.log_format", "yaml").unwrap();
    h.config.set("plan_watch.log_parameter_max_length", "2").unwrap();
    h.backend
        .execute(&mut statement("SELECT 2").with_param("abcdef"))
        .unwrap();
    h.config.set("plan_watch.log_min_duration", "-1").unwrap();
    h.backend.execute(&mut statement("SELECT 3")).unwrap();

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(plan_of(&messages[0]).starts_with("Query Text: SELECT 1\n"));
    assert!(
        plan_of(&messages[1])
            .starts_with("Query Text: \"SELECT 2\"\nQuery Parameters: \"$1 = 'ab...'\"\n")
    );
}

#[test]
fn two_watchers_compose() {
    let config = ConfigHandle::new(watched());
    let first = Arc::new(MemoryLogSink::new());
    let second = Arc::new(MemoryLogSink::new());
    let engine = Engine::default().nest("SELECT outer()", &["SELECT inner"]);

    let mut chain = HookChain::new(engine);
    chain
        .install(PlanWatch::new(config.clone()).with_sink_arc(first.clone()))
        .install(PlanWatch::new(config.clone()).with_sink_arc(second.clone()));
    let backend = Backend::new(Arc::new(chain));

    backend.execute(&mut statement("SELECT outer()")).unwrap();
    assert_eq!(backend.nesting().depth(), 0);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);

    config.set("plan_watch.log_nested_statements", "on").unwrap();
    backend.execute(&mut statement("SELECT outer()")).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
}

#[test]
fn backends_on_separate_threads() {
    let config = ConfigHandle::new(watched());
    let sink = Arc::new(MemoryLogSink::new());
    let mut chain = HookChain::new(Engine::default().nest("SELECT outer()", &["SELECT inner"]));
    chain.install(PlanWatch::new(config).with_sink_arc(sink.clone()));
    let chain = Arc::new(chain);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let chain = chain.clone();
            std::thread::spawn(move || {
                let backend = Backend::new(chain);
                for _ in 0..5 {
                    backend.execute(&mut statement("SELECT outer()")).unwrap();
                }
                backend.nesting().depth()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), 0);
    }
    assert_eq!(sink.len(), 20);
}

struct RefusingSink;

impl LogSink for RefusingSink {
    fn emit(&self, _: &LogRecord) -> WatchResult<()> {
        Err(WatchError::emit("log destination unavailable"))
    }
}

#[test]
fn engine_end_runs_when_the_report_cannot_be_emitted() {
    let engine = Arc::new(Engine::default());
    let mut chain = HookChain::with_standard_arc(engine.clone());
    chain.install(PlanWatch::new(ConfigHandle::new(watched())).with_sink(RefusingSink));
    let backend = Backend::new(Arc::new(chain));

    let err = backend.execute(&mut statement("SELECT 1")).unwrap_err();
    assert!(matches!(err, WatchError::Emit(_)), "{err}");
    assert_eq!(engine.ended(), ["SELECT 1"]);
    assert_eq!(backend.nesting().depth(), 0);

    // The backend stays usable for the next statement.
    let _ = backend.execute(&mut statement("SELECT 2"));
    assert_eq!(engine.ended(), ["SELECT 1", "SELECT 2"]);
}
