use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::envelope::wire_time;
use crate::event::Level;
use crate::logger::Logger;
use crate::value::Value;

/// Wraps a [`Logger`] so that at most one entry is emitted per window,
/// independent of event name, while counting what was suppressed.
///
/// The shared state is two independent atomics, `last_emit` and
/// `skipped`, kept lock-free on purpose. Callers racing across the
/// window boundary may both decide to emit, and a skip may be
/// momentarily undercounted; that relaxed consistency is the accepted
/// price of a lock-free hot path. Merge the two fields into one
/// atomically-swapped record if exact accounting ever becomes a
/// requirement.
pub struct RateLimitedLogger {
    inner: Logger,
    window: Duration,
    /// Epoch milliseconds of the last emission; 0 means never.
    last_emit: AtomicI64,
    skipped: AtomicU64,
}

/// Data key carrying the number of suppressed calls since the previous
/// emission.
pub const SKIPPED_KEY: &str = "_skipped";

/// Data key carrying the time of the previous emission.
pub const LAST_LOG_TIME_KEY: &str = "_lastLogTime";

impl RateLimitedLogger {
    pub fn new(inner: Logger, window: Duration) -> Self {
        RateLimitedLogger {
            inner,
            window,
            last_emit: AtomicI64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &Logger {
        &self.inner
    }

    /// Number of calls suppressed since the last emission.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Attempt a keyed log call. Disabled levels do nothing and are not
    /// counted. Calls landing inside the window are suppressed and
    /// counted; the next emission carries the count in `_skipped` and
    /// the previous emission time in `_lastLogTime`, appended after the
    /// caller's own pairs.
    pub fn log(
        &self,
        level: Level,
        name: impl Into<String>,
        mut keys: Vec<String>,
        mut values: Vec<Value>,
    ) {
        if !self.inner.enabled(level) {
            return;
        }
        let now = Utc::now().timestamp_millis();
        let last = self.last_emit.load(Ordering::Relaxed);
        let window_ms = self.window.as_millis() as i64;
        if last != 0 && now.saturating_sub(last) < window_ms {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.last_emit.store(now, Ordering::Relaxed);
        let skipped = self.skipped.swap(0, Ordering::Relaxed);

        keys.push(SKIPPED_KEY.to_string());
        values.push(Value::from(skipped));
        keys.push(LAST_LOG_TIME_KEY.to_string());
        values.push(match previous_emit_time(last) {
            Some(text) => Value::from(text),
            None => Value::Null,
        });
        self.inner.array(level, name, Some(keys), values);
    }
}

fn previous_emit_time(last_ms: i64) -> Option<String> {
    if last_ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(last_ms).single().map(wire_time)
}
