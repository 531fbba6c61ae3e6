use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::classify::{Safety, SerializerRegistry};
use crate::value::{OtherValue, Value};

/// Recursion cap for nested containers and conversion output. Values
/// below this depth encode normally; deeper nodes are cut off rather
/// than risking a runaway stack.
pub const MAX_DEPTH: usize = 16;

/// Render a value to JSON. Total: every branch ends in either direct
/// emission or the reference form, and a panicking conversion is caught
/// and degraded, so this function never fails for any input.
pub fn safe_encode(registry: &SerializerRegistry, value: &Value) -> serde_json::Value {
    encode_at(registry, value, 0)
}

/// Render a value for the forced-safe context path: simple and
/// native-JSON values encode as usual, everything else becomes a
/// plain-text reference string. No caller conversion ever runs.
pub fn forced_safe_encode(registry: &SerializerRegistry, value: &Value) -> serde_json::Value {
    match registry.classify(value) {
        Safety::Simple | Safety::NativeJson => encode_at(registry, value, 0),
        _ => serde_json::Value::String(describe(value)),
    }
}

fn encode_at(registry: &SerializerRegistry, value: &Value, depth: usize) -> serde_json::Value {
    if depth >= MAX_DEPTH {
        return truncated(value);
    }
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),
        // NaN and infinities have no JSON form.
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Json(node) => node.clone(),
        Value::Seq(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| encode_at(registry, item, depth + 1))
                .collect(),
        ),
        Value::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (key, item) in entries {
                map.insert(key.clone(), encode_at(registry, item, depth + 1));
            }
            serde_json::Value::Object(map)
        }
        Value::Error(err) => err.to_json(),
        Value::Other(other) => encode_other(registry, other),
    }
}

fn encode_other(registry: &SerializerRegistry, other: &OtherValue) -> serde_json::Value {
    let (Some(convert), Some(target)) = (registry.resolve(other), other.target.as_ref()) else {
        return reference(other);
    };
    // A conversion is application code; a panic inside it must not
    // take the log call down with it.
    match catch_unwind(AssertUnwindSafe(|| convert(&**target))) {
        Ok(json) => json,
        Err(_) => reference(other),
    }
}

/// Reference form of an opaque value: identity and qualified type name.
/// The identity is null when the target is unavailable.
pub fn reference(other: &OtherValue) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    let id = match other.identity_hex() {
        Some(hex) => serde_json::Value::String(hex),
        None => serde_json::Value::Null,
    };
    map.insert("_id".to_string(), id);
    map.insert(
        "_class".to_string(),
        serde_json::Value::String(other.type_name.clone()),
    );
    serde_json::Value::Object(map)
}

fn truncated(value: &Value) -> serde_json::Value {
    match value {
        Value::Other(other) => reference(other),
        _ => serde_json::Value::Null,
    }
}

/// One-line description of a value for plain-text contexts.
fn describe(value: &Value) -> String {
    match value {
        Value::Other(other) => other.reference_string(),
        Value::Error(err) => format!("{}: {}", err.type_name, err.message),
        Value::Seq(items) => format!("<seq:{}>", items.len()),
        Value::Map(entries) => format!("<map:{}>", entries.len()),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ToLogValue;
    use serde_json::json;

    struct Panicky;

    impl ToLogValue for Panicky {
        fn to_log_value(&self) -> serde_json::Value {
            panic!("conversion blew up");
        }
    }

    struct Plain {
        n: u64,
    }

    #[test]
    fn simple_values_round_trip() {
        let reg = SerializerRegistry::new();
        assert_eq!(safe_encode(&reg, &Value::from("foo")), json!("foo"));
        assert_eq!(safe_encode(&reg, &Value::from(1234i64)), json!(1234));
        assert_eq!(safe_encode(&reg, &Value::from(true)), json!(true));
        assert_eq!(safe_encode(&reg, &Value::Null), json!(null));
    }

    #[test]
    fn non_finite_floats_become_null() {
        let reg = SerializerRegistry::new();
        assert_eq!(safe_encode(&reg, &Value::Float(f64::NAN)), json!(null));
        assert_eq!(safe_encode(&reg, &Value::Float(f64::INFINITY)), json!(null));
        assert_eq!(safe_encode(&reg, &Value::Float(1.5)), json!(1.5));
    }

    #[test]
    fn containers_recurse_in_order() {
        let reg = SerializerRegistry::new();
        let v = Value::Map(vec![
            ("b".to_string(), Value::from(1i64)),
            ("a".to_string(), Value::Seq(vec![Value::from("x"), Value::Null])),
        ]);
        let encoded = safe_encode(&reg, &v);
        assert_eq!(encoded, json!({"b": 1, "a": ["x", null]}));
        // Insertion order survives, not alphabetical order.
        let text = serde_json::to_string(&encoded).unwrap();
        assert!(text.starts_with(r#"{"b""#));
    }

    #[test]
    fn unregistered_value_encodes_as_reference() {
        let reg = SerializerRegistry::new();
        let encoded = safe_encode(&reg, &Value::other(Plain { n: 9 }));
        let obj = encoded.as_object().unwrap();
        assert!(obj.get("_id").unwrap().is_string());
        assert!(obj
            .get("_class")
            .unwrap()
            .as_str()
            .unwrap()
            .ends_with("Plain"));
    }

    #[test]
    fn detached_reference_has_null_id() {
        let reg = SerializerRegistry::new();
        let encoded = safe_encode(&reg, &Value::detached("acme::Gone"));
        assert_eq!(encoded, json!({"_id": null, "_class": "acme::Gone"}));
    }

    #[test]
    fn registered_conversion_is_used() {
        let reg = SerializerRegistry::new();
        reg.register::<Plain, _>(|p| json!({ "n": p.n }));
        let encoded = safe_encode(&reg, &Value::other(Plain { n: 7 }));
        assert_eq!(encoded, json!({"n": 7}));
    }

    #[test]
    fn panicking_conversion_degrades_to_reference() {
        let reg = SerializerRegistry::new();
        let encoded = safe_encode(&reg, &Value::loggable(Panicky));
        assert!(encoded.as_object().unwrap().contains_key("_class"));
    }

    #[test]
    fn deep_nesting_is_cut_off_not_fatal() {
        let reg = SerializerRegistry::new();
        let mut v = Value::from("leaf");
        for _ in 0..(MAX_DEPTH * 3) {
            v = Value::Seq(vec![v]);
        }
        // Must terminate and produce something; the leaf is gone.
        let encoded = safe_encode(&reg, &v);
        assert!(encoded.is_array());
    }

    #[test]
    fn forced_safe_never_runs_conversions() {
        let reg = SerializerRegistry::new();
        let encoded = forced_safe_encode(&reg, &Value::loggable(Panicky));
        let text = encoded.as_str().expect("plain string");
        assert!(text.contains('@'));
        // Simple values still pass through untouched.
        assert_eq!(forced_safe_encode(&reg, &Value::from(5i64)), json!(5));
    }
}
