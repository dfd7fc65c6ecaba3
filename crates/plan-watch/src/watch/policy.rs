//! Per-statement decisions: whether to watch, and what to measure.

use crate::config::WatchConfig;
use crate::executor::{ExecFlags, InstrumentOptions};

/// Whether a statement at nesting `depth` should be watched.
///
/// `log_min_duration` acts as an on/off switch here; the measured duration is
/// never compared against it.
pub fn is_enabled(config: &WatchConfig, depth: usize) -> bool {
    config.log_min_duration.is_some() && (depth == 0 || config.log_nested_statements)
}

/// Instrumentation to request from the engine for a watched statement.
///
/// Empty unless `log_analyze` is set and the statement will actually run.
/// Timing and row-count-only collection are exclusive; timing wins.
pub fn negotiate_instrumentation(config: &WatchConfig, eflags: ExecFlags) -> InstrumentOptions {
    if !config.log_analyze || eflags.contains(ExecFlags::EXPLAIN_ONLY) {
        return InstrumentOptions::empty();
    }

    let mut options = if config.log_timing {
        InstrumentOptions::TIMER
    } else {
        InstrumentOptions::ROWS
    };
    if config.log_buffers {
        options |= InstrumentOptions::BUFFERS;
    }
    if config.log_wal {
        options |= InstrumentOptions::WAL;
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn disabled_threshold_never_enables() {
        let config = WatchConfig::new().with_nested_statements(true);
        assert!(!is_enabled(&config, 0));
        assert!(!is_enabled(&config, 3));
    }

    #[test]
    fn nested_statements_need_opt_in() {
        let config = WatchConfig::new().with_min_duration(Duration::ZERO);
        assert!(is_enabled(&config, 0));
        assert!(!is_enabled(&config, 1));

        let config = config.with_nested_statements(true);
        assert!(is_enabled(&config, 1));
    }

    #[test]
    fn threshold_is_a_switch_not_a_filter() {
        // A huge threshold still enables; the duration is not consulted.
        let config = WatchConfig::new().with_min_duration(Duration::from_secs(3600));
        assert!(is_enabled(&config, 0));
    }

    #[test]
    fn no_instrumentation_without_analyze() {
        let config = WatchConfig::new()
            .with_min_duration(Duration::ZERO)
            .with_buffers(true)
            .with_wal(true);
        assert!(negotiate_instrumentation(&config, ExecFlags::empty()).is_empty());
    }

    #[test]
    fn timing_preferred_over_rows() {
        let config = WatchConfig::new().with_analyze(true);
        assert_eq!(
            negotiate_instrumentation(&config, ExecFlags::empty()),
            InstrumentOptions::TIMER
        );

        let config = config.with_timing(false).with_buffers(true).with_wal(true);
        assert_eq!(
            negotiate_instrumentation(&config, ExecFlags::empty()),
            InstrumentOptions::ROWS | InstrumentOptions::BUFFERS | InstrumentOptions::WAL
        );
    }

    #[test]
    fn explain_only_requests_nothing() {
        let config = WatchConfig::new().with_analyze(true).with_buffers(true);
        assert!(negotiate_instrumentation(&config, ExecFlags::EXPLAIN_ONLY).is_empty());
    }
}
