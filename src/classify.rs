use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::value::{LogValueFn, OtherValue, Value};

/// Safety classification of a caller-supplied value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    /// String, number, boolean or null; serialized as-is.
    Simple,
    /// Already a parsed JSON node; serialized as-is.
    NativeJson,
    /// Has a recognized conversion and may be serialized richly.
    ComplexSafe,
    /// No recognized conversion; serialized in reference form only.
    ComplexUnsafe,
}

/// Registry of rich-serialization conversions for third-party types,
/// plus a per-type classification cache.
///
/// The cache is append-only: an entry is written at most once per type
/// identity, and later reads skip the converter lookup entirely. A
/// conversion registered after a type has already been classified does
/// not retroactively change that type's classification.
///
/// One registry instance is owned by each encoder; there is no
/// process-wide state.
pub struct SerializerRegistry {
    converters: RwLock<HashMap<TypeId, LogValueFn>>,
    cache: RwLock<HashMap<TypeId, bool>>,
    resolutions: AtomicU64,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        SerializerRegistry {
            converters: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            resolutions: AtomicU64::new(0),
        }
    }

    /// Register a conversion for a third-party type `T`.
    pub fn register<T, F>(&self, convert: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> serde_json::Value + Send + Sync + 'static,
    {
        let wrapped: LogValueFn = std::sync::Arc::new(move |any| {
            any.downcast_ref::<T>()
                .map(|v| convert(v))
                .unwrap_or(serde_json::Value::Null)
        });
        if let Ok(mut map) = self.converters.write() {
            map.insert(TypeId::of::<T>(), wrapped);
        }
    }

    /// Classify a value. Never fails; anything that cannot be resolved
    /// is conservatively `ComplexUnsafe`.
    pub fn classify(&self, value: &Value) -> Safety {
        match value {
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::UInt(_)
            | Value::Float(_)
            | Value::Str(_) => Safety::Simple,
            Value::Json(_) => Safety::NativeJson,
            // Built-in containers and captured errors have a known
            // serialization by construction.
            Value::Seq(_) | Value::Map(_) | Value::Error(_) => Safety::ComplexSafe,
            Value::Other(other) => self.classify_other(other),
        }
    }

    fn classify_other(&self, other: &OtherValue) -> Safety {
        if other.convert.is_some() {
            return Safety::ComplexSafe;
        }
        let Some(type_id) = other.type_id else {
            return Safety::ComplexUnsafe;
        };
        if let Some(known) = self.cached(type_id) {
            return if known {
                Safety::ComplexSafe
            } else {
                Safety::ComplexUnsafe
            };
        }
        // Cache miss: resolve against the converter table once and
        // remember the verdict for this type.
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let loggable = self
            .converters
            .read()
            .map(|map| map.contains_key(&type_id))
            .unwrap_or(false);
        if let Ok(mut cache) = self.cache.write() {
            cache.entry(type_id).or_insert(loggable);
        }
        if loggable {
            Safety::ComplexSafe
        } else {
            Safety::ComplexUnsafe
        }
    }

    fn cached(&self, type_id: TypeId) -> Option<bool> {
        self.cache.read().ok().and_then(|c| c.get(&type_id).copied())
    }

    /// Conversion for an opaque value: the one captured at construction
    /// wins, then the converter table.
    pub(crate) fn resolve(&self, other: &OtherValue) -> Option<LogValueFn> {
        if let Some(convert) = &other.convert {
            return Some(convert.clone());
        }
        let type_id = other.type_id?;
        self.converters
            .read()
            .ok()
            .and_then(|map| map.get(&type_id).cloned())
    }

    /// Number of cache-missing resolutions performed so far.
    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        SerializerRegistry::new()
    }
}
