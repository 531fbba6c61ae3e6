use std::sync::Arc;

use chrono::Utc;

use crate::builder::LogBuilder;
use crate::encoder::WireEncoder;
use crate::event::{Level, LogEvent, Payload};
use crate::exception::CapturedError;
use crate::layer::DeliveryHandle;
use crate::mdc;
use crate::value::Value;

/// Front door for direct, typed log calls.
///
/// A logger owns its name and minimum level, shares an encoder, and
/// ships finished lines through the delivery pipeline. Everything up to
/// the channel send runs synchronously on the caller's thread; the
/// logger itself holds no mutable state and can be called from any
/// number of threads at once.
pub struct Logger {
    name: String,
    min_level: Level,
    encoder: Arc<WireEncoder>,
    out: DeliveryHandle,
}

impl Logger {
    pub fn new(
        name: impl Into<String>,
        min_level: Level,
        encoder: Arc<WireEncoder>,
        out: DeliveryHandle,
    ) -> Self {
        Logger {
            name: name.into(),
            min_level,
            encoder,
            out,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    /// Start a builder for a single entry at `level`. When the level is
    /// disabled the returned builder is inert and costs nothing.
    pub fn build(&self, level: Level) -> LogBuilder<'_> {
        LogBuilder::new(self, level)
    }

    /// Encode and ship a payload at `level`. Calls below the minimum
    /// level are discarded before any work happens.
    pub fn log(&self, level: Level, payload: Payload) {
        self.dispatch(level, payload, None, String::new());
    }

    pub fn array(
        &self,
        level: Level,
        name: impl Into<String>,
        keys: Option<Vec<String>>,
        values: Vec<Value>,
    ) {
        self.log(
            level,
            Payload::Array {
                name: name.into(),
                keys,
                values,
            },
        );
    }

    pub fn array_json(
        &self,
        level: Level,
        name: impl Into<String>,
        keys: Option<Vec<String>>,
        fragments: Vec<Option<String>>,
    ) {
        self.log(
            level,
            Payload::ArrayJson {
                name: name.into(),
                keys,
                fragments,
            },
        );
    }

    pub fn map(
        &self,
        level: Level,
        name: impl Into<String>,
        entries: Option<Vec<(String, Value)>>,
    ) {
        self.log(
            level,
            Payload::Map {
                name: name.into(),
                entries,
            },
        );
    }

    pub fn map_json(
        &self,
        level: Level,
        name: impl Into<String>,
        entries: Option<Vec<(String, Option<String>)>>,
    ) {
        self.log(
            level,
            Payload::MapJson {
                name: name.into(),
                entries,
            },
        );
    }

    pub fn object(&self, level: Level, name: impl Into<String>, value: Option<Value>) {
        self.log(
            level,
            Payload::Object {
                name: name.into(),
                value,
            },
        );
    }

    pub fn object_json(&self, level: Level, name: impl Into<String>, fragment: Option<String>) {
        self.log(
            level,
            Payload::ObjectJson {
                name: name.into(),
                fragment,
            },
        );
    }

    /// Plain message call; the data block carries a single `message`
    /// field with the given text.
    pub fn message(&self, level: Level, text: impl Into<String>) {
        self.dispatch(level, Payload::Standard, None, text.into());
    }

    pub(crate) fn dispatch(
        &self,
        level: Level,
        payload: Payload,
        error: Option<CapturedError>,
        message: String,
    ) {
        if !self.enabled(level) {
            return;
        }
        let event = LogEvent {
            timestamp: Utc::now(),
            level,
            logger: self.name.clone(),
            thread: std::thread::current().name().map(|s| s.to_string()),
            message,
            payload,
            mdc: mdc::snapshot(),
            caller: None,
            error,
        };
        let line = self.encoder.encode(&event);
        self.out.ship(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use crate::layer::DeliveryHandle;
    use serde_json::json;

    fn logger(min_level: Level) -> (Logger, tokio::sync::mpsc::Receiver<String>) {
        let (handle, rx) = DeliveryHandle::for_tests(32);
        let encoder = Arc::new(WireEncoder::new(ContextConfig {
            host_override: Some("box-1".to_string()),
            ..ContextConfig::default()
        }));
        (Logger::new("svc::api", min_level, encoder, handle), rx)
    }

    #[test]
    fn array_call_ships_one_line() {
        let (log, mut rx) = logger(Level::Info);
        log.array(
            Level::Info,
            "req",
            Some(vec!["k1".to_string()]),
            vec![Value::from(7i64)],
        );
        let line = rx.try_recv().unwrap();
        let doc: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(doc["name"], json!("req"));
        assert_eq!(doc["data"], json!({"k1": 7}));
    }

    #[test]
    fn disabled_level_ships_nothing() {
        let (log, mut rx) = logger(Level::Warn);
        log.message(Level::Info, "quiet");
        assert!(rx.try_recv().is_err());
        assert!(!log.enabled(Level::Debug));
        assert!(log.enabled(Level::Error));
    }

    #[test]
    fn message_call_uses_standard_shape() {
        let (log, mut rx) = logger(Level::Debug);
        log.message(Level::Debug, "hello");
        let line = rx.try_recv().unwrap();
        let doc: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(doc["data"], json!({"message": "hello"}));
        assert_eq!(doc["name"], json!("svc::api"));
        assert_eq!(doc["level"], json!("debug"));
    }

    #[test]
    fn ambient_values_reach_the_context_block() {
        let (handle, mut rx) = DeliveryHandle::for_tests(8);
        let encoder = Arc::new(WireEncoder::new(ContextConfig {
            host_override: Some("box-1".to_string()),
            ambient_keys: vec!["request_id".to_string()],
            ..ContextConfig::default()
        }));
        let log = Logger::new("svc", Level::Info, encoder, handle);
        let _guard = mdc::scoped("request_id", "r-42");
        log.message(Level::Info, "hi");
        let line = rx.try_recv().unwrap();
        let doc: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(doc["context"]["request_id"], json!("r-42"));
    }
}
