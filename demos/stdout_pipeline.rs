use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use wirelog::init::{init_tracing_with_config, PipelineConfig};
use wirelog::sink::StdoutSink;

#[tokio::main]
async fn main() {
    let sink = Arc::new(StdoutSink);
    init_tracing_with_config(
        sink,
        PipelineConfig {
            enable_stdout: false,
            ..PipelineConfig::default()
        },
    );

    info!(event = "startup", port = 8080u64, "listening");
    let _guard = wirelog::mdc::scoped("request_id", "r-1001");
    info!(event = "req", method = "GET", path = "/health", status = 200u64, "handled");
    warn!(event = "slow_req", elapsed_ms = 1543u64, "request over budget");

    // Give background task a little time to drain the channel
    sleep(Duration::from_secs(2)).await;
}
