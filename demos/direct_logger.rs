use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use wirelog::event::Level;
use wirelog::init::{build_pipeline, PipelineConfig};
use wirelog::limiter::RateLimitedLogger;
use wirelog::logger::Logger;
use wirelog::sink::StdoutSink;
use wirelog::value::Value;

#[tokio::main]
async fn main() {
    let config = PipelineConfig::default();
    let (encoder, handle, _task) = build_pipeline(Arc::new(StdoutSink), &config);

    let logger = Logger::new("demo::worker", Level::Info, encoder, handle);

    logger
        .build(Level::Info)
        .name("batch_done")
        .message("batch finished")
        .data("rows", 1532u64)
        .data("elapsed_ms", 210u64)
        .context("shard", "eu-1")
        .log();

    // A chatty call site: only one line per second makes it out, the
    // rest are counted into _skipped.
    let limited = RateLimitedLogger::new(logger, Duration::from_secs(1));
    for i in 0..10u64 {
        limited.log(
            Level::Info,
            "tick",
            vec!["i".to_string()],
            vec![Value::from(i)],
        );
    }

    sleep(Duration::from_secs(2)).await;
}
