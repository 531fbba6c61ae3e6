use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use uuid::Uuid;

use crate::classify::SerializerRegistry;
use crate::context::{ContextAssembler, ContextConfig};
use crate::envelope::{wire_time, DataBlock, Envelope, WIRE_VERSION};
use crate::event::{LogEvent, Payload};
use crate::serialize::safe_encode;
use crate::value::Value;

/// Internal encoding failure. Never escapes [`WireEncoder::encode`];
/// it only shapes the plain-text fallback line.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns a [`LogEvent`] into one newline-terminated wire line.
///
/// The encoder holds no per-call state: concurrent encodes never
/// interfere. The only shared pieces are the registry's append-only
/// cache and the assembler's memoized host/pid lookups.
pub struct WireEncoder {
    registry: Arc<SerializerRegistry>,
    context: ContextAssembler,
}

impl WireEncoder {
    pub fn new(config: ContextConfig) -> Self {
        WireEncoder::with_registry(config, Arc::new(SerializerRegistry::new()))
    }

    pub fn with_registry(config: ContextConfig, registry: Arc<SerializerRegistry>) -> Self {
        WireEncoder {
            registry,
            context: ContextAssembler::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SerializerRegistry> {
        &self.registry
    }

    /// Encode an event. This call cannot fail: if JSON generation
    /// itself breaks down, the returned line is a plain-text diagnostic
    /// instead, keeping one line per event either way.
    pub fn encode(&self, event: &LogEvent) -> String {
        match catch_unwind(AssertUnwindSafe(|| self.encode_inner(event))) {
            Ok(Ok(line)) => line,
            Ok(Err(err)) => fallback_line(&err.to_string()),
            Err(_) => fallback_line("encoder panicked"),
        }
    }

    fn encode_inner(&self, event: &LogEvent) -> Result<String, EncodeError> {
        let (data, context_keys, context_values) = self.dispatch(event);
        let context = self.context.build(
            &self.registry,
            event,
            context_keys.as_deref(),
            context_values.unwrap_or(&[]),
        );
        let envelope = Envelope {
            time: wire_time(event.timestamp),
            name: event.payload.name().unwrap_or(&event.logger),
            level: event.level.wire_name(),
            data,
            exception: event.error.as_ref().map(|e| e.to_json()),
            context,
            id: Uuid::new_v4().to_string(),
            version: WIRE_VERSION,
        };
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        Ok(line)
    }

    /// Build the data block for the event's payload shape, plus the
    /// extra context pairs the `Lists` shape carries.
    fn dispatch<'a>(
        &self,
        event: &'a LogEvent,
    ) -> (DataBlock, Option<&'a [String]>, Option<&'a [Value]>) {
        match &event.payload {
            Payload::Array { keys, values, .. } => {
                (self.keyed_values(keys.as_deref(), values), None, None)
            }
            Payload::ArrayJson { keys, fragments, .. } => {
                let mut block = DataBlock::empty();
                if let Some(keys) = keys {
                    for (i, key) in keys.iter().enumerate() {
                        match fragments.get(i).and_then(|f| f.as_deref()) {
                            Some(fragment) => block.push_raw(key.clone(), fragment),
                            None => block.push_node(key.clone(), serde_json::Value::Null),
                        }
                    }
                }
                (block, None, None)
            }
            Payload::Map { entries, .. } => {
                let mut block = DataBlock::empty();
                if let Some(entries) = entries {
                    for (key, value) in entries {
                        block.push_node(key.clone(), safe_encode(&self.registry, value));
                    }
                }
                (block, None, None)
            }
            Payload::MapJson { entries, .. } => {
                let mut block = DataBlock::empty();
                if let Some(entries) = entries {
                    for (key, fragment) in entries {
                        match fragment.as_deref() {
                            Some(fragment) => block.push_raw(key.clone(), fragment),
                            None => block.push_node(key.clone(), serde_json::Value::Null),
                        }
                    }
                }
                (block, None, None)
            }
            Payload::Object { value, .. } => {
                let block = match value {
                    Some(value) => DataBlock::Node(safe_encode(&self.registry, value)),
                    None => DataBlock::empty(),
                };
                (block, None, None)
            }
            Payload::ObjectJson { fragment, .. } => {
                let block = match fragment.as_deref() {
                    Some(fragment) => DataBlock::whole_raw(fragment),
                    None => DataBlock::empty(),
                };
                (block, None, None)
            }
            Payload::Lists {
                data_keys,
                data_values,
                context_keys,
                context_values,
                ..
            } => (
                self.keyed_values(data_keys.as_deref(), data_values),
                context_keys.as_deref(),
                Some(context_values.as_slice()),
            ),
            Payload::Standard => {
                let mut block = DataBlock::empty();
                block.push_node("message", serde_json::Value::String(event.message.clone()));
                (block, None, None)
            }
        }
    }

    fn keyed_values(&self, keys: Option<&[String]>, values: &[Value]) -> DataBlock {
        let mut block = DataBlock::empty();
        if let Some(keys) = keys {
            for (i, key) in keys.iter().enumerate() {
                let node = match values.get(i) {
                    Some(value) => safe_encode(&self.registry, value),
                    None => serde_json::Value::Null,
                };
                block.push_node(key.clone(), node);
            }
        }
        block
    }
}

fn fallback_line(message: &str) -> String {
    format!("Unknown exception: {message}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use crate::exception::CapturedError;
    use serde_json::json;

    fn encoder() -> WireEncoder {
        WireEncoder::new(ContextConfig {
            host_override: Some("box-1".to_string()),
            ..ContextConfig::default()
        })
    }

    fn encode(event: &LogEvent) -> serde_json::Value {
        let line = encoder().encode(event);
        assert!(line.ends_with('\n'));
        serde_json::from_str(line.trim_end()).expect("valid json line")
    }

    fn array_event(keys: Option<Vec<&str>>, values: Vec<Value>) -> LogEvent {
        LogEvent::new(
            Level::Info,
            "svc",
            Payload::Array {
                name: "req".to_string(),
                keys: keys.map(|ks| ks.into_iter().map(String::from).collect()),
                values,
            },
        )
    }

    #[test]
    fn array_call_produces_keyed_data_block() {
        let doc = encode(&array_event(
            Some(vec!["k1", "k2"]),
            vec![Value::from(1234i64), Value::from("foo")],
        ));
        assert_eq!(doc["data"], json!({"k1": 1234, "k2": "foo"}));
        assert_eq!(doc["name"], json!("req"));
        assert_eq!(doc["level"], json!("info"));
        assert_eq!(doc["version"], json!("0"));
        assert!(doc.get("exception").is_none());
    }

    #[test]
    fn short_value_list_pads_trailing_keys_with_null() {
        let doc = encode(&array_event(
            Some(vec!["k1", "k2", "k3"]),
            vec![Value::from(1i64)],
        ));
        assert_eq!(doc["data"], json!({"k1": 1, "k2": null, "k3": null}));
    }

    #[test]
    fn missing_keys_yield_empty_data_regardless_of_values() {
        let doc = encode(&array_event(None, vec![Value::from(1i64)]));
        assert_eq!(doc["data"], json!({}));
    }

    #[test]
    fn excess_values_are_dropped() {
        let doc = encode(&array_event(
            Some(vec!["k1"]),
            vec![Value::from(1i64), Value::from(2i64)],
        ));
        assert_eq!(doc["data"], json!({"k1": 1}));
    }

    #[test]
    fn null_map_yields_empty_data_block() {
        let doc = encode(&LogEvent::new(
            Level::Info,
            "svc",
            Payload::Map {
                name: "m".to_string(),
                entries: None,
            },
        ));
        assert_eq!(doc["data"], json!({}));
    }

    #[test]
    fn json_fragments_splice_verbatim() {
        let doc = encode(&LogEvent::new(
            Level::Info,
            "svc",
            Payload::MapJson {
                name: "m".to_string(),
                entries: Some(vec![
                    ("a".to_string(), Some(r#"{"deep":[1]}"#.to_string())),
                    ("b".to_string(), None),
                ]),
            },
        ));
        assert_eq!(doc["data"], json!({"a": {"deep": [1]}, "b": null}));
    }

    #[test]
    fn null_object_fragment_renders_empty_object() {
        let doc = encode(&LogEvent::new(
            Level::Info,
            "svc",
            Payload::ObjectJson {
                name: "o".to_string(),
                fragment: None,
            },
        ));
        assert_eq!(doc["data"], json!({}));
    }

    #[test]
    fn object_value_becomes_the_data_block() {
        let doc = encode(&LogEvent::new(
            Level::Info,
            "svc",
            Payload::Object {
                name: "o".to_string(),
                value: Some(Value::Map(vec![(
                    "inner".to_string(),
                    Value::from(true),
                )])),
            },
        ));
        assert_eq!(doc["data"], json!({"inner": true}));
    }

    #[test]
    fn lists_payload_feeds_data_and_context() {
        let mut event = LogEvent::new(
            Level::Warn,
            "svc",
            Payload::Lists {
                name: "batch".to_string(),
                data_keys: Some(vec!["count".to_string()]),
                data_values: vec![Value::from(3i64)],
                context_keys: Some(vec!["shard".to_string()]),
                context_values: vec![Value::from("eu-1")],
            },
        );
        event.thread = Some("t".to_string());
        let doc = encode(&event);
        assert_eq!(doc["data"], json!({"count": 3}));
        assert_eq!(doc["context"]["shard"], json!("eu-1"));
        assert_eq!(doc["level"], json!("warn"));
    }

    #[test]
    fn standard_payload_carries_only_the_message() {
        let mut event = LogEvent::new(Level::Error, "svc::mod", Payload::Standard);
        event.message = "it broke".to_string();
        let doc = encode(&event);
        assert_eq!(doc["data"], json!({"message": "it broke"}));
        // No payload name: the logger name stands in.
        assert_eq!(doc["name"], json!("svc::mod"));
        assert_eq!(doc["level"], json!("crit"));
    }

    #[test]
    fn error_chain_always_lands_in_exception() {
        let mut event = array_event(Some(vec!["k"]), vec![Value::from(1i64)]);
        event.error = Some(CapturedError::new("acme::Npe", "npe!"));
        let doc = encode(&event);
        assert_eq!(doc["exception"]["type"], json!("acme::Npe"));
        assert_eq!(doc["exception"]["message"], json!("npe!"));
        assert_eq!(doc["exception"]["data"], json!({}));
    }

    #[test]
    fn ids_are_unique_per_event() {
        let event = array_event(Some(vec!["k"]), vec![Value::from(1i64)]);
        let enc = encoder();
        let a: serde_json::Value =
            serde_json::from_str(enc.encode(&event).trim_end()).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(enc.encode(&event).trim_end()).unwrap();
        assert_ne!(a["id"], b["id"]);
    }

    #[test]
    fn trace_maps_to_debug_on_the_wire() {
        let mut event = array_event(Some(vec![]), vec![]);
        event.level = Level::Trace;
        let doc = encode(&event);
        assert_eq!(doc["level"], json!("debug"));
    }
}
