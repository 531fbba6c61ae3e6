use std::sync::OnceLock;

use crate::classify::SerializerRegistry;
use crate::event::LogEvent;
use crate::serialize::{forced_safe_encode, safe_encode};
use crate::value::Value;

/// Sentinel emitted when a metadata lookup fails or a field is missing
/// from the event.
pub const UNKNOWN: &str = "<UNKNOWN>";

/// Which metadata fields the context block carries. Each flag is
/// independent; ambient keys are looked up in the event's ambient map
/// and included even when the value is null.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub host: bool,
    pub process: bool,
    pub thread: bool,
    pub logger: bool,
    /// Condense the logger name to its final path segment.
    pub condensed_logger: bool,
    pub file: bool,
    pub class: bool,
    pub method: bool,
    pub line: bool,
    /// Ambient keys copied from the event's ambient map.
    pub ambient_keys: Vec<String>,
    /// Render complex explicit values as plain-text references instead
    /// of running rich serialization. Guarantees assembly cannot run
    /// caller code.
    pub forced_safe: bool,
    /// Host name override; skips resolution entirely when set.
    pub host_override: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            host: true,
            process: true,
            thread: true,
            logger: true,
            condensed_logger: false,
            // Caller location is off by default; resolving it is the
            // backend's business and not always available.
            file: false,
            class: false,
            method: false,
            line: false,
            ambient_keys: Vec::new(),
            forced_safe: false,
            host_override: None,
        }
    }
}

impl ContextConfig {
    /// All standard metadata fields enabled, including caller location.
    pub fn all() -> Self {
        ContextConfig {
            file: true,
            class: true,
            method: true,
            line: true,
            ..ContextConfig::default()
        }
    }
}

/// Builds the context block of the envelope.
///
/// Host and process lookups run at most once per assembler instance;
/// a failed lookup caches the sentinel so it is not retried on every
/// call.
pub struct ContextAssembler {
    config: ContextConfig,
    hostname: OnceLock<String>,
    pid: OnceLock<String>,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        ContextAssembler {
            config,
            hostname: OnceLock::new(),
            pid: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn hostname(&self) -> &str {
        self.hostname.get_or_init(|| {
            if let Some(host) = &self.config.host_override {
                return host.clone();
            }
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| UNKNOWN.to_string())
        })
    }

    fn pid(&self) -> &str {
        self.pid.get_or_init(|| std::process::id().to_string())
    }

    /// Assemble the ordered context block: standard fields in their
    /// fixed order, then configured ambient keys, then explicit pairs.
    /// Explicit pairs follow data-block pairing: excess keys map to
    /// null, excess values are dropped. Duplicate keys keep their first
    /// position; the last written value wins.
    pub fn build(
        &self,
        registry: &SerializerRegistry,
        event: &LogEvent,
        explicit_keys: Option<&[String]>,
        explicit_values: &[Value],
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut block = serde_json::Map::new();
        let cfg = &self.config;
        if cfg.host {
            block.insert("host".to_string(), self.hostname().into());
        }
        if cfg.process {
            block.insert("pid".to_string(), self.pid().into());
        }
        if cfg.thread {
            let thread = event.thread.as_deref().unwrap_or(UNKNOWN);
            block.insert("thread".to_string(), thread.into());
        }
        if cfg.logger {
            let logger = if cfg.condensed_logger {
                condense(&event.logger)
            } else {
                event.logger.as_str()
            };
            block.insert("logger".to_string(), logger.into());
        }
        let caller = event.caller.as_ref();
        if cfg.file {
            let file = caller.and_then(|c| c.file.as_deref()).unwrap_or(UNKNOWN);
            block.insert("file".to_string(), file.into());
        }
        if cfg.class {
            let class = caller.and_then(|c| c.class.as_deref()).unwrap_or(UNKNOWN);
            block.insert("class".to_string(), class.into());
        }
        if cfg.method {
            let method = caller.and_then(|c| c.method.as_deref()).unwrap_or(UNKNOWN);
            block.insert("method".to_string(), method.into());
        }
        if cfg.line {
            let line = caller.and_then(|c| c.line);
            let line = match line {
                Some(n) => serde_json::Value::from(n),
                None => serde_json::Value::String(UNKNOWN.to_string()),
            };
            block.insert("line".to_string(), line);
        }
        for key in &cfg.ambient_keys {
            let value = match event.mdc.get(key) {
                Some(v) => self.encode(registry, v),
                None => serde_json::Value::Null,
            };
            block.insert(key.clone(), value);
        }
        if let Some(keys) = explicit_keys {
            for (i, key) in keys.iter().enumerate() {
                let value = match explicit_values.get(i) {
                    Some(v) => self.encode(registry, v),
                    None => serde_json::Value::Null,
                };
                block.insert(key.clone(), value);
            }
        }
        block
    }

    fn encode(&self, registry: &SerializerRegistry, value: &Value) -> serde_json::Value {
        if self.config.forced_safe {
            forced_safe_encode(registry, value)
        } else {
            safe_encode(registry, value)
        }
    }
}

/// Final path segment of a dotted or `::`-separated logger name.
fn condense(logger: &str) -> &str {
    logger
        .rsplit(|c| c == '.' || c == ':')
        .next()
        .unwrap_or(logger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallerLocation, Level, LogEvent, Payload};
    use serde_json::json;

    fn event() -> LogEvent {
        let mut ev = LogEvent::new(Level::Info, "app::web::auth", Payload::Standard);
        ev.thread = Some("worker-1".to_string());
        ev.caller = Some(CallerLocation {
            file: Some("auth.rs".to_string()),
            class: Some("app::web::auth".to_string()),
            method: Some("login".to_string()),
            line: Some(42),
        });
        ev
    }

    #[test]
    fn all_flags_produce_exactly_the_standard_fields() {
        let assembler = ContextAssembler::new(ContextConfig {
            host_override: Some("box-1".to_string()),
            ..ContextConfig::all()
        });
        let reg = SerializerRegistry::new();
        let block = assembler.build(&reg, &event(), None, &[]);
        let keys: Vec<&str> = block.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            ["host", "pid", "thread", "logger", "file", "class", "method", "line"]
        );
        for (_, v) in &block {
            assert!(!v.is_null());
        }
        assert_eq!(block["host"], json!("box-1"));
        assert_eq!(block["line"], json!(42));
    }

    #[test]
    fn condensed_logger_keeps_last_segment() {
        assert_eq!(condense("app::web::auth"), "auth");
        assert_eq!(condense("a.b.c"), "c");
        assert_eq!(condense("flat"), "flat");
    }

    #[test]
    fn ambient_keys_are_included_even_when_missing() {
        let mut cfg = ContextConfig::default();
        cfg.host = false;
        cfg.process = false;
        cfg.thread = false;
        cfg.logger = false;
        cfg.ambient_keys = vec!["request_id".to_string(), "tenant".to_string()];
        let assembler = ContextAssembler::new(cfg);
        let reg = SerializerRegistry::new();
        let mut ev = event();
        ev.mdc.insert("request_id".to_string(), Value::from("r-9"));
        let block = assembler.build(&reg, &ev, None, &[]);
        assert_eq!(block["request_id"], json!("r-9"));
        assert!(block.contains_key("tenant"));
        assert_eq!(block["tenant"], json!(null));
    }

    #[test]
    fn explicit_pairs_follow_data_pairing() {
        let assembler = ContextAssembler::new(ContextConfig::default());
        let reg = SerializerRegistry::new();
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        // Two values for three keys: the trailing key pads with null;
        // a fourth value would simply be dropped.
        let values = vec![Value::from(1i64), Value::from("x")];
        let block = assembler.build(&reg, &event(), Some(&keys), &values);
        assert_eq!(block["a"], json!(1));
        assert_eq!(block["b"], json!("x"));
        assert_eq!(block["c"], json!(null));
    }

    #[test]
    fn forced_safe_renders_complex_values_as_strings() {
        struct Opaque;
        let assembler = ContextAssembler::new(ContextConfig {
            forced_safe: true,
            ..ContextConfig::default()
        });
        let reg = SerializerRegistry::new();
        let keys = vec!["obj".to_string(), "n".to_string()];
        let values = vec![Value::other(Opaque), Value::from(3i64)];
        let block = assembler.build(&reg, &event(), Some(&keys), &values);
        assert!(block["obj"].as_str().unwrap().contains('@'));
        assert_eq!(block["n"], json!(3));
    }

    #[test]
    fn failed_caller_lookup_degrades_to_sentinel() {
        let assembler = ContextAssembler::new(ContextConfig {
            host_override: Some("box-1".to_string()),
            ..ContextConfig::all()
        });
        let reg = SerializerRegistry::new();
        let mut ev = event();
        ev.caller = None;
        ev.thread = None;
        let block = assembler.build(&reg, &ev, None, &[]);
        assert_eq!(block["thread"], json!(UNKNOWN));
        assert_eq!(block["file"], json!(UNKNOWN));
        assert_eq!(block["line"], json!(UNKNOWN));
    }
}
