use tokio::io::{AsyncWriteExt, Stdout};

use crate::core::error::SynError;
use crate::loggers::core::LogRecord;
use crate::loggers::transports::DeliveryMode;

/// Prints every record as a single JSON line on stdout.
pub struct ConsoleTransport {
    out: Stdout,
    mode: DeliveryMode,
}

impl ConsoleTransport {
    pub fn new(mode: DeliveryMode) -> Self {
        Self { out: tokio::io::stdout(), mode }
    }

    pub async fn send(&mut self, record: &LogRecord) -> Result<(), SynError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| SynError::InternalError(format!("JSON encode: {}", e)))?;
        line.push(b'\n');

        self.out
            .write_all(&line)
            .await
            .map_err(|e| SynError::TransportError(format!("stdout: {}", e)))?;
        if self.mode == DeliveryMode::Synchronous {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SynError> {
        self.out
            .flush()
            .await
            .map_err(|e| SynError::TransportError(format!("stdout: {}", e)))
    }
}
