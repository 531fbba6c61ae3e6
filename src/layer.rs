use crate::encoder::WireEncoder;
use crate::event::{CallerLocation, Level, LogEvent, Payload};
use crate::exception::CapturedError;
use crate::mdc;
use crate::sink::LineSink;
use crate::value::Value;
use chrono::Utc;
use std::error::Error;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Reserved field name that sets the canonical event name of a call.
pub const EVENT_NAME_FIELD: &str = "event";

/// Handle for shipping finished wire lines into the delivery pipeline.
///
/// Shipping never blocks: when the channel is full the line is dropped
/// and counted instead of stalling the caller's thread.
#[derive(Clone)]
pub struct DeliveryHandle {
    sender: mpsc::Sender<String>,
    /// Total events observed (before level filtering).
    pub total_lines: Arc<AtomicU64>,
    /// Successfully pulled from the channel by the delivery task.
    pub enqueued_lines: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_lines: Arc<AtomicU64>,
}

impl DeliveryHandle {
    pub(crate) fn ship(&self, line: String) {
        if self.sender.try_send(line).is_err() {
            self.dropped_lines.fetch_add(1, Ordering::Relaxed);
            eprintln!("wire log channel full, dropping line");
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = DeliveryHandle {
            sender: tx,
            total_lines: Arc::new(AtomicU64::new(0)),
            enqueued_lines: Arc::new(AtomicU64::new(0)),
            dropped_lines: Arc::new(AtomicU64::new(0)),
        };
        (handle, rx)
    }
}

/// Spawn the background task that pulls wire lines from a bounded
/// channel and sends them to the provided [`LineSink`] in batches.
///
/// Minimal thresholds are enforced for `buffer`, `batch_size` and
/// `flush_interval` to avoid degenerate configurations. Delivery I/O is
/// fully decoupled from application threads.
pub fn spawn_delivery(
    sink: Arc<dyn LineSink>,
    buffer: usize,
    batch_size: usize,
    flush_interval: Duration,
) -> (DeliveryHandle, JoinHandle<()>) {
    // Enforce minimal thresholds to avoid degenerate configs.
    let buffer = buffer.max(16);
    let batch_size = batch_size.max(1);
    let flush_interval = if flush_interval < Duration::from_millis(10) {
        Duration::from_millis(10)
    } else {
        flush_interval
    };

    let (tx, mut rx) = mpsc::channel::<String>(buffer);

    let handle = DeliveryHandle {
        sender: tx,
        total_lines: Arc::new(AtomicU64::new(0)),
        enqueued_lines: Arc::new(AtomicU64::new(0)),
        dropped_lines: Arc::new(AtomicU64::new(0)),
    };
    let enqueued_bg = Arc::clone(&handle.enqueued_lines);

    let task = tokio::spawn(async move {
        let mut batch = Vec::with_capacity(batch_size);
        let backoff = Duration::from_millis(100);
        let max_backoff = Duration::from_secs(10);

        loop {
            tokio::select! {
                Some(line) = rx.recv() => {
                    batch.push(line);
                    enqueued_bg.fetch_add(1, Ordering::Relaxed);
                    if batch.len() >= batch_size {
                        if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                            eprintln!("error sending wire log batch: {}", e);
                        }
                    }
                }
                _ = sleep(flush_interval) => {
                    if !batch.is_empty() {
                        if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                            eprintln!("error flushing wire log batch: {}", e);
                        }
                    }
                }
            }
        }
    });

    (handle, task)
}

async fn send_batch(
    sink: &dyn LineSink,
    batch: &mut Vec<String>,
    mut backoff: Duration,
    max_backoff: Duration,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for line in batch.iter() {
            if let Err(e) = sink.send(line).await {
                last_err = Some(e);
                break;
            }
        }

        if last_err.is_none() {
            batch.clear();
            return Ok(());
        }

        eprintln!("wire log sink send failed, retrying in {:?}", backoff);
        sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, max_backoff);
    }
}

/// `tracing_subscriber` layer that turns events into wire lines.
///
/// Each observed event is converted to a [`LogEvent`] via a field
/// visitor, encoded synchronously on the caller's thread, and shipped
/// through the bounded channel to the delivery task. Events below
/// `capture` are ignored.
pub struct WireLayer {
    encoder: Arc<WireEncoder>,
    handle: DeliveryHandle,
    capture: Level,
}

impl WireLayer {
    pub fn new(encoder: Arc<WireEncoder>, handle: DeliveryHandle, capture: Level) -> Self {
        WireLayer {
            encoder,
            handle,
            capture,
        }
    }

    fn build_event(&self, event: &Event<'_>, level: Level) -> LogEvent {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let message = visitor.message.unwrap_or_default();
        let payload = if visitor.fields.is_empty() {
            Payload::Standard
        } else {
            let mut entries = Vec::with_capacity(visitor.fields.len() + 1);
            if !message.is_empty() {
                entries.push(("message".to_string(), Value::from(message.clone())));
            }
            entries.extend(visitor.fields);
            Payload::Map {
                name: visitor
                    .event_name
                    .unwrap_or_else(|| meta.target().to_string()),
                entries: Some(entries),
            }
        };

        LogEvent {
            timestamp: Utc::now(),
            level,
            logger: meta.target().to_string(),
            thread: std::thread::current().name().map(|s| s.to_string()),
            message,
            payload,
            mdc: mdc::snapshot(),
            caller: Some(CallerLocation {
                file: meta.file().map(|s| s.to_string()),
                class: meta.module_path().map(|s| s.to_string()),
                method: None,
                line: meta.line(),
            }),
            error: visitor.error,
        }
    }
}

impl<S> Layer<S> for WireLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.handle.total_lines.fetch_add(1, Ordering::Relaxed);
        let level = level_from_tracing(*event.metadata().level());
        if level < self.capture {
            return;
        }
        let event = self.build_event(event, level);
        let line = self.encoder.encode(&event);
        self.handle.ship(line);
    }
}

pub(crate) fn level_from_tracing(level: tracing::Level) -> Level {
    if level == tracing::Level::ERROR {
        Level::Error
    } else if level == tracing::Level::WARN {
        Level::Warn
    } else if level == tracing::Level::INFO {
        Level::Info
    } else if level == tracing::Level::DEBUG {
        Level::Debug
    } else {
        Level::Trace
    }
}

use tracing::field::{Field, Visit};

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Vec<(String, Value)>,
    pub message: Option<String>,
    pub event_name: Option<String>,
    pub error: Option<CapturedError>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            EVENT_NAME_FIELD => self.event_name = Some(value.to_string()),
            _ => self
                .fields
                .push((field.name().to_string(), Value::from(value))),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .push((field.name().to_string(), Value::from(value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .push((field.name().to_string(), Value::from(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .push((field.name().to_string(), Value::from(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .push((field.name().to_string(), Value::from(value)));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn Error + 'static)) {
        self.error = Some(CapturedError::of_dyn(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((
                field.name().to_string(),
                Value::from(format!("{:?}", value)),
            ));
        }
    }
}
