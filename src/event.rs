use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::exception::CapturedError;
use crate::value::Value;

/// Severity of a log event.
///
/// The wire format only distinguishes four levels, so `Trace` is folded
/// into `"debug"` and `Error` maps to `"crit"` on emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Name of this level in the emitted envelope.
    pub fn wire_name(self) -> &'static str {
        match self {
            Level::Trace | Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "crit",
        }
    }
}

/// Call-site location, as far as the host backend can resolve it.
#[derive(Debug, Clone, Default)]
pub struct CallerLocation {
    pub file: Option<String>,
    pub class: Option<String>,
    pub method: Option<String>,
    pub line: Option<u32>,
}

/// Tagged payload shape of a single log call.
///
/// Key/value lists are paired by index: a shorter value list pads the
/// missing trailing keys with JSON `null`, excess values are dropped, and
/// a `None` key list (or map) yields an empty data block regardless of
/// the values supplied.
///
/// The `*Json` variants carry raw, pre-validated JSON text that is
/// spliced verbatim into the data block; validity is the caller's
/// responsibility.
#[derive(Debug, Clone)]
pub enum Payload {
    Array {
        name: String,
        keys: Option<Vec<String>>,
        values: Vec<Value>,
    },
    ArrayJson {
        name: String,
        keys: Option<Vec<String>>,
        fragments: Vec<Option<String>>,
    },
    Map {
        name: String,
        entries: Option<Vec<(String, Value)>>,
    },
    MapJson {
        name: String,
        entries: Option<Vec<(String, Option<String>)>>,
    },
    Object {
        name: String,
        value: Option<Value>,
    },
    ObjectJson {
        name: String,
        fragment: Option<String>,
    },
    Lists {
        name: String,
        data_keys: Option<Vec<String>>,
        data_values: Vec<Value>,
        context_keys: Option<Vec<String>>,
        context_values: Vec<Value>,
    },
    /// Plain message call with no structured payload; the data block
    /// carries a single `message` field.
    Standard,
}

impl Payload {
    /// Canonical event name carried by this payload, if any. `Standard`
    /// calls have none and fall back to the logger name.
    pub fn name(&self) -> Option<&str> {
        match self {
            Payload::Array { name, .. }
            | Payload::ArrayJson { name, .. }
            | Payload::Map { name, .. }
            | Payload::MapJson { name, .. }
            | Payload::Object { name, .. }
            | Payload::ObjectJson { name, .. }
            | Payload::Lists { name, .. } => Some(name),
            Payload::Standard => None,
        }
    }
}

/// A single log event as delivered by the host backend.
///
/// Consumed exactly once per encode call and never mutated.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Full logger name, e.g. a module path.
    pub logger: String,
    pub thread: Option<String>,
    /// Fully formatted message text, arguments already substituted.
    pub message: String,
    pub payload: Payload,
    /// Ambient key/value map captured at call time.
    pub mdc: BTreeMap<String, Value>,
    pub caller: Option<CallerLocation>,
    pub error: Option<CapturedError>,
}

impl LogEvent {
    /// Minimal event with the given level, logger and payload; timestamp
    /// is taken at construction time.
    pub fn new(level: Level, logger: impl Into<String>, payload: Payload) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            thread: std::thread::current().name().map(|s| s.to_string()),
            message: String::new(),
            payload,
            mdc: BTreeMap::new(),
            caller: None,
            error: None,
        }
    }
}
