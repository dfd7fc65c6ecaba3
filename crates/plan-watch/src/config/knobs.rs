use super::{ExplainFormat, LogLevel, WatchConfig};
use crate::error::{WatchError, WatchResult};
use std::time::Duration;

/// Reserved namespace of every knob.
pub const SETTING_PREFIX: &str = "plan_watch";

/// Identifies one knob of [`WatchConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    LogMinDuration,
    LogParameterMaxLength,
    LogAnalyze,
    LogSettings,
    LogVerbose,
    LogBuffers,
    LogWal,
    LogTriggers,
    LogFormat,
    LogLevel,
    LogNestedStatements,
    LogTiming,
}

/// Unit of an integer knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnobUnit {
    Milliseconds,
    Bytes,
}

/// Value domain of a knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnobKind {
    /// `-1` (disabled) or `0..=i32::MAX` in `unit`
    Integer { unit: KnobUnit },
    Bool,
    Enum(&'static [&'static str]),
}

/// Registry entry describing one knob.
#[derive(Debug, Clone, Copy)]
pub struct Knob {
    pub setting: Setting,
    /// Name without the `plan_watch.` prefix.
    pub name: &'static str,
    pub short_desc: &'static str,
    pub long_desc: Option<&'static str>,
    pub kind: KnobKind,
}

impl Knob {
    /// Fully-qualified name, e.g. `plan_watch.log_analyze`.
    pub fn qualified_name(&self) -> String {
        format!("{SETTING_PREFIX}.{}", self.name)
    }
}

/// Every knob, in registration order.
pub const KNOBS: &[Knob] = &[
    Knob {
        setting: Setting::LogMinDuration,
        name: "log_min_duration",
        short_desc: "Sets the minimum execution time above which plans will be logged.",
        long_desc: Some("-1 disables logging plans. 0 means log all plans."),
        kind: KnobKind::Integer {
            unit: KnobUnit::Milliseconds,
        },
    },
    Knob {
        setting: Setting::LogParameterMaxLength,
        name: "log_parameter_max_length",
        short_desc: "Sets the maximum length of query parameter values to log.",
        long_desc: Some("-1 means log values in full."),
        kind: KnobKind::Integer {
            unit: KnobUnit::Bytes,
        },
    },
    Knob {
        setting: Setting::LogAnalyze,
        name: "log_analyze",
        short_desc: "Collect runtime statistics for plan logging.",
        long_desc: None,
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogSettings,
        name: "log_settings",
        short_desc: "Log modified configuration parameters affecting query planning.",
        long_desc: None,
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogVerbose,
        name: "log_verbose",
        short_desc: "Include output columns in logged plans.",
        long_desc: None,
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogBuffers,
        name: "log_buffers",
        short_desc: "Log buffers usage.",
        long_desc: Some("This has no effect unless log_analyze is also set."),
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogWal,
        name: "log_wal",
        short_desc: "Log WAL usage.",
        long_desc: Some("This has no effect unless log_analyze is also set."),
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogTriggers,
        name: "log_triggers",
        short_desc: "Include trigger statistics in plans.",
        long_desc: Some("This has no effect unless log_analyze is also set."),
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogFormat,
        name: "log_format",
        short_desc: "Plan format to be used for plan logging.",
        long_desc: None,
        kind: KnobKind::Enum(ExplainFormat::NAMES),
    },
    Knob {
        setting: Setting::LogLevel,
        name: "log_level",
        short_desc: "Log level for the plan.",
        long_desc: None,
        kind: KnobKind::Enum(LogLevel::NAMES),
    },
    Knob {
        setting: Setting::LogNestedStatements,
        name: "log_nested_statements",
        short_desc: "Log nested statements.",
        long_desc: None,
        kind: KnobKind::Bool,
    },
    Knob {
        setting: Setting::LogTiming,
        name: "log_timing",
        short_desc: "Collect timing data, not just row counts.",
        long_desc: Some("This has no effect unless log_analyze is also set."),
        kind: KnobKind::Bool,
    },
];

/// Resolve a knob by qualified or short name, case-insensitively.
pub(crate) fn lookup(name: &str) -> WatchResult<&'static Knob> {
    let lower = name.trim().to_ascii_lowercase();
    let short = match lower.split_once('.') {
        Some((prefix, rest)) if prefix == SETTING_PREFIX => rest,
        Some(_) => return Err(WatchError::UnknownSetting(name.to_string())),
        None => lower.as_str(),
    };
    KNOBS
        .iter()
        .find(|knob| knob.name == short)
        .ok_or_else(|| WatchError::UnknownSetting(name.to_string()))
}

/// Validate `value` and store it. The config is untouched on error.
pub(crate) fn apply(config: &mut WatchConfig, knob: &Knob, value: &str) -> WatchResult<()> {
    let name = knob.name;
    match knob.setting {
        Setting::LogMinDuration => config.log_min_duration = parse_duration(name, value)?,
        Setting::LogParameterMaxLength => {
            config.log_parameter_max_length = parse_bytes(name, value)?
        }
        Setting::LogAnalyze => config.log_analyze = parse_bool(name, value)?,
        Setting::LogSettings => config.log_settings = parse_bool(name, value)?,
        Setting::LogVerbose => config.log_verbose = parse_bool(name, value)?,
        Setting::LogBuffers => config.log_buffers = parse_bool(name, value)?,
        Setting::LogWal => config.log_wal = parse_bool(name, value)?,
        Setting::LogTriggers => config.log_triggers = parse_bool(name, value)?,
        Setting::LogFormat => config.log_format = value.parse()?,
        Setting::LogLevel => config.log_level = value.parse()?,
        Setting::LogNestedStatements => config.log_nested_statements = parse_bool(name, value)?,
        Setting::LogTiming => config.log_timing = parse_bool(name, value)?,
    }
    Ok(())
}

/// Canonical text of a knob's current value.
pub(crate) fn show(config: &WatchConfig, knob: &Knob) -> String {
    match knob.setting {
        Setting::LogMinDuration => show_duration(config.log_min_duration),
        Setting::LogParameterMaxLength => show_bytes(config.log_parameter_max_length),
        Setting::LogAnalyze => show_bool(config.log_analyze),
        Setting::LogSettings => show_bool(config.log_settings),
        Setting::LogVerbose => show_bool(config.log_verbose),
        Setting::LogBuffers => show_bool(config.log_buffers),
        Setting::LogWal => show_bool(config.log_wal),
        Setting::LogTriggers => show_bool(config.log_triggers),
        Setting::LogFormat => config.log_format.to_string(),
        Setting::LogLevel => config.log_level.to_string(),
        Setting::LogNestedStatements => show_bool(config.log_nested_statements),
        Setting::LogTiming => show_bool(config.log_timing),
    }
}

const DURATION_UNITS: &[(&str, i64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("min", 60_000),
    ("h", 3_600_000),
    ("d", 86_400_000),
];

const BYTE_UNITS: &[(&str, i64)] = &[
    ("B", 1),
    ("kB", 1 << 10),
    ("MB", 1 << 20),
    ("GB", 1 << 30),
    ("TB", 1 << 40),
];

/// Parse a millisecond knob: `-1`, `250`, `250ms`, `1.5s`, `1min`, `500us`.
/// Fractions are rounded to the nearest millisecond.
pub(crate) fn parse_duration(name: &str, value: &str) -> WatchResult<Option<Duration>> {
    let (number, unit) = split_number(name, value)?;
    let millis = if unit == "us" {
        Some(round_to_unit(number / 1000.0))
    } else {
        scale(number, unit, DURATION_UNITS)
    };
    let millis = millis.ok_or_else(|| {
        WatchError::invalid_setting(
            name,
            value,
            "valid units are \"us\", \"ms\", \"s\", \"min\", \"h\", and \"d\"",
        )
    })?;
    check_range(name, value, millis).map(|ms| ms.map(Duration::from_millis))
}

/// Parse a byte knob: `-1`, `64`, `64B`, `1.5kB`, `2MB`.
pub(crate) fn parse_bytes(name: &str, value: &str) -> WatchResult<Option<usize>> {
    let (number, unit) = split_number(name, value)?;
    let bytes = scale(number, unit, BYTE_UNITS).ok_or_else(|| {
        WatchError::invalid_setting(
            name,
            value,
            "valid units are \"B\", \"kB\", \"MB\", \"GB\", and \"TB\"",
        )
    })?;
    check_range(name, value, bytes)?
        .map(|b| {
            usize::try_from(b)
                .map_err(|_| WatchError::invalid_setting(name, value, "value out of range"))
        })
        .transpose()
}

/// Parse a boolean: `on/off`, `true/false`, `yes/no`, `1/0`, or an unambiguous prefix.
pub(crate) fn parse_bool(name: &str, value: &str) -> WatchResult<bool> {
    let v = value.trim().to_ascii_lowercase();
    let prefix_of = |word: &str, min_len: usize| v.len() >= min_len && word.starts_with(v.as_str());

    if prefix_of("true", 1) || prefix_of("yes", 1) || prefix_of("on", 2) || v == "1" {
        Ok(true)
    } else if prefix_of("false", 1) || prefix_of("no", 1) || prefix_of("off", 2) || v == "0" {
        Ok(false)
    } else {
        Err(WatchError::invalid_setting(
            name,
            value,
            "requires a Boolean value",
        ))
    }
}

fn split_number<'a>(name: &str, value: &'a str) -> WatchResult<(f64, &'a str)> {
    let trimmed = value.trim();
    let mut seen_point = false;
    let number_end = trimmed
        .char_indices()
        .find(|&(i, c)| {
            let part_of_number = match c {
                '0'..='9' => true,
                '-' | '+' => i == 0,
                '.' if !seen_point => {
                    seen_point = true;
                    true
                }
                _ => false,
            };
            !part_of_number
        })
        .map_or(trimmed.len(), |(i, _)| i);
    let number = &trimmed[..number_end];
    if !number.bytes().any(|b| b.is_ascii_digit()) {
        return Err(WatchError::invalid_setting(
            name,
            value,
            "requires a numeric value",
        ));
    }
    let number = number
        .parse::<f64>()
        .map_err(|_| WatchError::invalid_setting(name, value, "requires a numeric value"))?;
    Ok((number, trimmed[number_end..].trim()))
}

fn scale(number: f64, unit: &str, units: &[(&str, i64)]) -> Option<i64> {
    let factor = if unit.is_empty() {
        1
    } else {
        units.iter().find(|(u, _)| *u == unit)?.1
    };
    Some(round_to_unit(number * factor as f64))
}

/// Nearest whole unit, halves rounded up. Out-of-range values saturate.
fn round_to_unit(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// `-1` means disabled; everything else must fit in `0..=i32::MAX`.
fn check_range(name: &str, value: &str, n: i64) -> WatchResult<Option<u64>> {
    if n == -1 {
        return Ok(None);
    }
    if !(0..=i64::from(i32::MAX)).contains(&n) {
        return Err(WatchError::invalid_setting(
            name,
            value,
            format!("value is outside the valid range -1 .. {}", i32::MAX),
        ));
    }
    Ok(Some(n.unsigned_abs()))
}

fn show_duration(value: Option<Duration>) -> String {
    match value {
        None => "-1".to_string(),
        Some(d) => show_scaled(d.as_millis().min(i64::MAX as u128) as i64, DURATION_UNITS),
    }
}

fn show_bytes(value: Option<usize>) -> String {
    match value {
        None => "-1".to_string(),
        Some(b) => show_scaled(i64::try_from(b).unwrap_or(i64::MAX), BYTE_UNITS),
    }
}

fn show_scaled(n: i64, units: &[(&str, i64)]) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let (unit, factor) = units
        .iter()
        .rev()
        .find(|(_, factor)| n % factor == 0)
        .copied()
        .unwrap_or(units[0]);
    format!("{}{unit}", n / factor)
}

fn show_bool(value: bool) -> String {
    if value { "on" } else { "off" }.to_string()
}
