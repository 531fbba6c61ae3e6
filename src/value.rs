use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::exception::CapturedError;

/// Conversion applied to an opaque value to obtain its rich JSON form.
pub type LogValueFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> serde_json::Value + Send + Sync>;

/// Opt-in capability for rich serialization of application types.
///
/// Types that implement this trait are considered safe to hand to the
/// serializer; everything else degrades to a reference-only form. For
/// third-party types that cannot implement the trait, register a
/// conversion on the [`SerializerRegistry`](crate::classify::SerializerRegistry)
/// instead.
pub trait ToLogValue {
    fn to_log_value(&self) -> serde_json::Value;
}

/// A caller-supplied value attached to a log call.
///
/// Covers the JSON-native scalar shapes, pre-parsed JSON nodes, the
/// built-in container shapes, captured errors, and opaque application
/// values wrapped as [`OtherValue`].
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    /// A pre-parsed JSON node, emitted as-is.
    Json(serde_json::Value),
    Seq(Vec<Value>),
    /// Ordered map; insertion order is preserved on the wire.
    Map(Vec<(String, Value)>),
    Error(CapturedError),
    Other(OtherValue),
}

impl Value {
    /// Wrap an arbitrary application value without opting into rich
    /// serialization. Unless a conversion is registered for `T`, the
    /// value is emitted in reference form only.
    pub fn other<T: Any + Send + Sync>(value: T) -> Value {
        Value::Other(OtherValue {
            target: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>().to_string(),
            type_id: Some(TypeId::of::<T>()),
            convert: None,
        })
    }

    /// Wrap a value whose type has opted into rich serialization via
    /// [`ToLogValue`].
    pub fn loggable<T: Any + Send + Sync + ToLogValue>(value: T) -> Value {
        Value::Other(OtherValue {
            target: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>().to_string(),
            type_id: Some(TypeId::of::<T>()),
            convert: Some(Arc::new(|any| {
                any.downcast_ref::<T>()
                    .map(|v| v.to_log_value())
                    .unwrap_or(serde_json::Value::Null)
            })),
        })
    }

    /// A reference to a value that is no longer reachable in this
    /// process, e.g. after crossing a process boundary. Emits with a
    /// null identity.
    pub fn detached(type_name: impl Into<String>) -> Value {
        Value::Other(OtherValue {
            target: None,
            type_name: type_name.into(),
            type_id: None,
            convert: None,
        })
    }
}

/// An opaque application value together with what is known about its
/// type: the qualified name, the type identity used for registry
/// lookups, and an optional conversion captured at construction.
#[derive(Clone)]
pub struct OtherValue {
    pub(crate) target: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) type_name: String,
    pub(crate) type_id: Option<TypeId>,
    pub(crate) convert: Option<LogValueFn>,
}

impl OtherValue {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identity of the wrapped target as a hex string, or `None` when
    /// the target is unavailable.
    pub fn identity_hex(&self) -> Option<String> {
        self.target
            .as_ref()
            .map(|t| format!("{:x}", Arc::as_ptr(t) as *const () as usize))
    }

    /// Plain-text reference rendering, `qualified::Name@hex`.
    pub fn reference_string(&self) -> String {
        match self.identity_hex() {
            Some(id) => format!("{}@{}", self.type_name, id),
            None => format!("{}@null", self.type_name),
        }
    }
}

impl std::fmt::Debug for OtherValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtherValue")
            .field("type_name", &self.type_name)
            .field("attached", &self.target.is_some())
            .finish_non_exhaustive()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Value {
        Value::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Seq(v)
    }
}

impl From<CapturedError> for Value {
    fn from(v: CapturedError) -> Value {
        Value::Error(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Session {
        user: String,
    }

    impl ToLogValue for Session {
        fn to_log_value(&self) -> serde_json::Value {
            serde_json::json!({ "user": self.user })
        }
    }

    #[test]
    fn other_keeps_type_name_and_identity() {
        let v = Value::other(Session {
            user: "kim".to_string(),
        });
        let Value::Other(other) = v else {
            panic!("expected Other");
        };
        assert!(other.type_name().ends_with("Session"));
        assert!(other.identity_hex().is_some());
        assert!(other.reference_string().contains('@'));
    }

    #[test]
    fn detached_has_no_identity() {
        let Value::Other(other) = Value::detached("acme::Widget") else {
            panic!("expected Other");
        };
        assert_eq!(other.identity_hex(), None);
        assert_eq!(other.reference_string(), "acme::Widget@null");
    }

    #[test]
    fn loggable_carries_a_conversion() {
        let Value::Other(other) = Value::loggable(Session {
            user: "kim".to_string(),
        }) else {
            panic!("expected Other");
        };
        let convert = other.convert.expect("conversion present");
        let target = other.target.expect("target present");
        let json = convert(&*target);
        assert_eq!(json, serde_json::json!({ "user": "kim" }));
    }

    #[test]
    fn from_impls_cover_scalars() {
        assert!(matches!(Value::from(true), Value::Bool(true)));
        assert!(matches!(Value::from(7i64), Value::Int(7)));
        assert!(matches!(Value::from(7u64), Value::UInt(7)));
        assert!(matches!(Value::from("x"), Value::Str(_)));
        assert!(matches!(Value::from(None::<i64>), Value::Null));
    }
}
