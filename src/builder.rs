use crate::event::{Level, Payload};
use crate::exception::CapturedError;
use crate::logger::Logger;
use crate::value::Value;

/// Single-use accumulator for one log entry.
///
/// Collect an event name, a message, data pairs, context pairs and an
/// error, then commit once with [`log`](LogBuilder::log). Appending is
/// O(1) and preserves insertion order; duplicate keys are all retained
/// in order, and folding them is the consumer's business.
///
/// A builder obtained for a disabled level is inert: every operation
/// returns immediately and the final `log()` does nothing, so call
/// sites can build unconditionally without checking the level first.
/// Committing consumes the builder, so a second commit cannot happen.
pub enum LogBuilder<'a> {
    Active(Box<ActiveBuilder<'a>>),
    Disabled,
}

pub struct ActiveBuilder<'a> {
    logger: &'a Logger,
    level: Level,
    name: Option<String>,
    message: Option<String>,
    error: Option<CapturedError>,
    data_keys: Vec<String>,
    data_values: Vec<Value>,
    context_keys: Vec<String>,
    context_values: Vec<Value>,
}

impl<'a> LogBuilder<'a> {
    pub(crate) fn new(logger: &'a Logger, level: Level) -> Self {
        if !logger.enabled(level) {
            return LogBuilder::Disabled;
        }
        LogBuilder::Active(Box::new(ActiveBuilder {
            logger,
            level,
            name: None,
            message: None,
            error: None,
            data_keys: Vec::new(),
            data_values: Vec::new(),
            context_keys: Vec::new(),
            context_values: Vec::new(),
        }))
    }

    /// Set the canonical event name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        if let LogBuilder::Active(b) = &mut self {
            b.name = Some(name.into());
        }
        self
    }

    /// Set the message text; committed as a trailing `message` data
    /// pair.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let LogBuilder::Active(b) = &mut self {
            b.message = Some(message.into());
        }
        self
    }

    /// Attach an error chain captured from a concrete error.
    pub fn error<E: std::error::Error + 'static>(self, err: &E) -> Self {
        self.captured(CapturedError::of(err))
    }

    /// Attach an already-captured error chain.
    pub fn captured(mut self, err: CapturedError) -> Self {
        if let LogBuilder::Active(b) = &mut self {
            b.error = Some(err);
        }
        self
    }

    /// Append one data pair.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let LogBuilder::Active(b) = &mut self {
            b.data_keys.push(key.into());
            b.data_values.push(value.into());
        }
        self
    }

    /// Append one context pair.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let LogBuilder::Active(b) = &mut self {
            b.context_keys.push(key.into());
            b.context_values.push(value.into());
        }
        self
    }

    /// Commit the entry. Consumes the builder; inert builders do
    /// nothing.
    pub fn log(self) {
        let LogBuilder::Active(b) = self else {
            return;
        };
        let mut data_keys = b.data_keys;
        let mut data_values = b.data_values;
        if let Some(message) = b.message {
            data_keys.push("message".to_string());
            data_values.push(Value::from(message));
        }
        let payload = Payload::Lists {
            name: b.name.unwrap_or_else(|| b.logger.name().to_string()),
            data_keys: Some(data_keys),
            data_values,
            context_keys: Some(b.context_keys),
            context_values: b.context_values,
        };
        b.logger.dispatch(b.level, payload, b.error, String::new());
    }
}
