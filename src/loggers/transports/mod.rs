//! Backends a [`crate::loggers::Logger`] can ship records to.
//!
//! The backend is owned exclusively by the logger's worker task; nothing here
//! is shared across logger instances.

pub mod capture;
pub mod console;
pub mod gelf;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::SynError;
use crate::loggers::builder::LoggerConfiguration;
use crate::loggers::core::LogRecord;

pub use capture::CaptureSink;
pub use console::ConsoleTransport;
pub use gelf::GelfTcpTransport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    /// GELF over TCP to the collector.
    Graylog,
    /// One JSON line per record on stdout.
    Console,
    /// Records are accepted and discarded.
    Null,
    /// Records are kept in memory, see [`CaptureSink`].
    Capture,
}

impl FromStr for BackendVariant {
    type Err = SynError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "graylog" => Ok(BackendVariant::Graylog),
            "console" | "basic" => Ok(BackendVariant::Console),
            "null" => Ok(BackendVariant::Null),
            "test" | "capture" => Ok(BackendVariant::Capture),
            other => Err(SynError::ConfigError(format!("Unknown logging variant: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Writes are buffered and flushed when the queue goes idle.
    #[default]
    Buffered,
    /// Every record is flushed to the socket before the next one is taken.
    Synchronous,
}

impl FromStr for DeliveryMode {
    type Err = SynError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buffered" => Ok(DeliveryMode::Buffered),
            "synchronous" | "sync" => Ok(DeliveryMode::Synchronous),
            other => Err(SynError::ConfigError(format!("Unknown delivery mode: {}", other))),
        }
    }
}

/// Terminator appended to every GELF frame on the TCP stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameDelimiter {
    #[default]
    Null,
    Newline,
}

impl FrameDelimiter {
    pub fn byte(&self) -> u8 {
        match self {
            FrameDelimiter::Null => b'\0',
            FrameDelimiter::Newline => b'\n',
        }
    }
}

impl FromStr for FrameDelimiter {
    type Err = SynError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" | "nul" => Ok(FrameDelimiter::Null),
            "newline" => Ok(FrameDelimiter::Newline),
            other => Err(SynError::ConfigError(format!("Unknown frame delimiter: {}", other))),
        }
    }
}

pub enum Transport {
    Gelf(GelfTcpTransport),
    Console(ConsoleTransport),
    Null,
    Capture(CaptureSink),
}

impl Transport {
    pub fn from_config(config: &LoggerConfiguration, capture: Option<CaptureSink>) -> Result<Self, SynError> {
        match config.backend_variant {
            BackendVariant::Graylog => {
                let host = config.server_host.as_deref().ok_or_else(|| {
                    SynError::ConfigError("graylog variant requires a server host".into())
                })?;
                Ok(Transport::Gelf(GelfTcpTransport::new(
                    host,
                    config.server_port,
                    &config.delivery,
                )))
            }
            BackendVariant::Console => Ok(Transport::Console(ConsoleTransport::new(config.delivery.mode))),
            BackendVariant::Null => Ok(Transport::Null),
            BackendVariant::Capture => Ok(Transport::Capture(capture.unwrap_or_default())),
        }
    }

    pub async fn send(&mut self, record: &LogRecord) -> Result<(), SynError> {
        match self {
            Transport::Gelf(t) => t.send(record).await,
            Transport::Console(t) => t.send(record).await,
            Transport::Null => Ok(()),
            Transport::Capture(sink) => {
                sink.push(record.clone());
                Ok(())
            }
        }
    }

    pub async fn flush(&mut self) -> Result<(), SynError> {
        match self {
            Transport::Gelf(t) => t.flush().await,
            Transport::Console(t) => t.flush().await,
            Transport::Null | Transport::Capture(_) => Ok(()),
        }
    }

    /// Records that had been accepted into a write buffer and were lost with
    /// the connection since the last call.
    pub fn take_lost(&mut self) -> u64 {
        match self {
            Transport::Gelf(t) => t.take_lost(),
            _ => 0,
        }
    }

    /// Releases the connection, flushing whatever is still buffered.
    pub async fn close(&mut self) {
        if let Transport::Gelf(t) = self {
            t.close().await;
        }
    }
}
