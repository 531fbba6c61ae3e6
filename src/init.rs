use crate::context::ContextConfig;
use crate::encoder::WireEncoder;
use crate::event::Level;
use crate::layer::{spawn_delivery, DeliveryHandle, WireLayer};
use crate::sink::LineSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the encoding pipeline.
///
/// Controls the bounded channel between application threads and the
/// delivery task, batching toward the sink, the minimum captured level,
/// the context block layout, and whether a console `fmt` layer is
/// stacked on top for local visibility.
///
/// **Fields**
/// - `channel_buffer`: maximum number of finished lines queued before
///   new lines are dropped.
/// - `batch_size`: batch size for sink delivery.
/// - `flush_interval`: maximum interval between flushes even with a
///   partial batch.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   added alongside the wire layer.
/// - `capture_level`: events below this level are ignored.
/// - `context`: metadata fields of the context block.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub enable_stdout: bool,
    pub capture_level: Level,
    pub context: ContextConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            enable_stdout: true,
            capture_level: Level::Info,
            context: ContextConfig::default(),
        }
    }
}

/// Build the shared encoder and delivery pipeline without installing
/// any subscriber. Useful when constructing [`Logger`](crate::logger::Logger)
/// instances directly or wiring the layer into an existing registry.
pub fn build_pipeline(
    sink: Arc<dyn LineSink>,
    config: &PipelineConfig,
) -> (Arc<WireEncoder>, DeliveryHandle, JoinHandle<()>) {
    let encoder = Arc::new(WireEncoder::new(config.context.clone()));
    let (handle, task) = spawn_delivery(
        sink,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );
    (encoder, handle, task)
}

/// Initialize the global `tracing` subscriber using the provided sink
/// and [`PipelineConfig`].
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`WireLayer`] as the global
/// default subscriber, so all `tracing` events in the process are
/// observed, encoded and shipped to the sink.
pub fn init_tracing_with_config(sink: Arc<dyn LineSink>, config: PipelineConfig) {
    let (encoder, handle, _task) = build_pipeline(sink, &config);
    let layer = WireLayer::new(encoder, handle, config.capture_level);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    }
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`PipelineConfig::default`].
pub fn init_tracing(sink: Arc<dyn LineSink>) {
    init_tracing_with_config(sink, PipelineConfig::default());
}
