//! Thread-local ambient context.
//!
//! Key/value pairs put here ride along on every event the current
//! thread logs, via the snapshot taken when the event is built. Use
//! [`scoped`] for values that should only live for a region of code.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::value::Value;

thread_local! {
    static AMBIENT: RefCell<BTreeMap<String, Value>> = RefCell::new(BTreeMap::new());
}

/// Set an ambient value for the current thread. Returns the previous
/// value under that key, if any.
pub fn insert(key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    AMBIENT.with(|map| map.borrow_mut().insert(key.into(), value.into()))
}

/// Remove an ambient value from the current thread.
pub fn remove(key: &str) -> Option<Value> {
    AMBIENT.with(|map| map.borrow_mut().remove(key))
}

/// Drop all ambient values on the current thread.
pub fn clear() {
    AMBIENT.with(|map| map.borrow_mut().clear());
}

/// Copy of the current thread's ambient map.
pub fn snapshot() -> BTreeMap<String, Value> {
    AMBIENT.with(|map| map.borrow().clone())
}

/// Set an ambient value for the lifetime of the returned guard; the
/// previous value (or absence) is restored on drop.
pub fn scoped(key: impl Into<String>, value: impl Into<Value>) -> AmbientGuard {
    let key = key.into();
    let prior = insert(key.clone(), value);
    AmbientGuard { key, prior }
}

pub struct AmbientGuard {
    key: String,
    prior: Option<Value>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        match self.prior.take() {
            Some(prior) => {
                insert(self.key.clone(), prior);
            }
            None => {
                remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_snapshot() {
        clear();
        insert("request_id", "r-1");
        let snap = snapshot();
        assert!(matches!(snap.get("request_id"), Some(Value::Str(s)) if s == "r-1"));
        clear();
        assert!(snapshot().is_empty());
    }

    #[test]
    fn scoped_value_restores_prior_state() {
        clear();
        insert("tenant", "a");
        {
            let _guard = scoped("tenant", "b");
            assert!(matches!(snapshot().get("tenant"), Some(Value::Str(s)) if s == "b"));
        }
        assert!(matches!(snapshot().get("tenant"), Some(Value::Str(s)) if s == "a"));
        {
            let _guard = scoped("fresh", 1i64);
            assert!(snapshot().contains_key("fresh"));
        }
        assert!(!snapshot().contains_key("fresh"));
        clear();
    }
}
