use async_trait::async_trait;
use std::error::Error;
use std::io::Write;

/// Asynchronous destination for finished wire lines.
///
/// Implementations are responsible for transporting lines to a concrete
/// destination (stdout, a file roller, a forwarder, etc). The delivery
/// task calls `send` from a background task and never awaits it on the
/// application thread; whether lines are flushed immediately or
/// buffered is entirely the sink's concern.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Send a single newline-terminated wire line.
    ///
    /// **Parameters**
    /// - `line`: one finished line as produced by the encoder; either a
    ///   JSON envelope or the plain-text diagnostic fallback.
    ///
    /// **Returns**
    /// - `Ok(())` if the line was accepted by the destination.
    /// - `Err(..)` on failure. The delivery task treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, line: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered lines, if the sink buffers at all.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Sink that writes lines to standard output.
#[derive(Clone, Default)]
pub struct StdoutSink;

#[async_trait]
impl LineSink for StdoutSink {
    async fn send(&self, line: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        std::io::stdout().flush()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_sink_accepts_lines() {
        let sink = StdoutSink;
        assert!(sink.send("").await.is_ok());
        assert!(sink.flush().await.is_ok());
    }
}
