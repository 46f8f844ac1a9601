//! # GELF over TCP
//!
//! Each record is rendered as a GELF 1.1 JSON object and written to the
//! collector followed by a frame delimiter. The connection is opened on the
//! first send, reused afterwards and dropped on any failure so the next send
//! reconnects.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core::error::SynError;
use crate::loggers::builder::DeliveryOptions;
use crate::loggers::core::LogRecord;
use crate::loggers::transports::{DeliveryMode, FrameDelimiter};

pub const GELF_VERSION: &str = "1.1";

pub struct GelfTcpTransport {
    addr: String,
    send_timeout: Duration,
    mode: DeliveryMode,
    delimiter: FrameDelimiter,
    stream: Option<BufWriter<TcpStream>>,
    /// Frames sitting in the write buffer, not yet flushed.
    pending: u64,
    lost: u64,
}

impl GelfTcpTransport {
    pub fn new(host: &str, port: u16, delivery: &DeliveryOptions) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            send_timeout: delivery.send_timeout,
            mode: delivery.mode,
            delimiter: delivery.frame_delimiter,
            stream: None,
            pending: 0,
            lost: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn send(&mut self, record: &LogRecord) -> Result<(), SynError> {
        let mut frame = encode(record)?;
        frame.push(self.delimiter.byte());

        let result = self.write_frame(&frame).await;
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    pub async fn flush(&mut self) -> Result<(), SynError> {
        let deadline = self.send_timeout;
        let Some(writer) = self.stream.as_mut() else {
            return Ok(());
        };

        let result = match timeout(deadline, writer.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SynError::TransportError(format!("Flush to {} failed: {}", self.addr, e))),
            Err(_) => Err(SynError::TransportError(format!("Flush to {} timed out", self.addr))),
        };

        match result {
            Ok(()) => self.pending = 0,
            Err(_) => self.disconnect(),
        }
        result
    }

    pub fn take_lost(&mut self) -> u64 {
        std::mem::take(&mut self.lost)
    }

    pub async fn close(&mut self) {
        if self.flush().await.is_ok() {
            if let Some(mut writer) = self.stream.take() {
                let _ = writer.shutdown().await;
            }
        }
        self.stream = None;
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SynError> {
        if self.stream.is_none() {
            let stream = self.connect().await?;
            self.stream = Some(BufWriter::new(stream));
        }

        let sync = self.mode == DeliveryMode::Synchronous;
        let deadline = self.send_timeout;
        let Some(writer) = self.stream.as_mut() else {
            return Err(SynError::InternalError("GELF connection missing after connect".into()));
        };

        let write = async {
            writer.write_all(frame).await?;
            if sync {
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        match timeout(deadline, write).await {
            Ok(Ok(())) => {
                if !sync {
                    self.pending += 1;
                }
                Ok(())
            }
            Ok(Err(e)) => Err(SynError::TransportError(format!("Send to {} failed: {}", self.addr, e))),
            Err(_) => Err(SynError::TransportError(format!("Send to {} timed out", self.addr))),
        }
    }

    async fn connect(&self) -> Result<TcpStream, SynError> {
        let stream = timeout(self.send_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SynError::TransportError(format!("Connect to {} timed out", self.addr)))?
            .map_err(|e| SynError::TransportError(format!("Connect to {} failed: {}", self.addr, e)))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn disconnect(&mut self) {
        self.lost += std::mem::take(&mut self.pending);
        self.stream = None;
    }
}

/// Renders a record as a GELF 1.1 JSON document (without delimiter).
///
/// Extra fields are prefixed with `_`; `null` fields are left out because the
/// collector rejects them. The record's own keys are written last and win over
/// any extra field mapping onto the same name.
pub fn encode(record: &LogRecord) -> Result<Vec<u8>, SynError> {
    let mut doc = Map::new();
    for (key, value) in &record.fields {
        if value.is_null() {
            continue;
        }
        doc.insert(additional_field_name(key), value.clone());
    }

    doc.insert("version".into(), Value::from(GELF_VERSION));
    doc.insert("host".into(), Value::from(record.host.clone()));
    doc.insert("short_message".into(), Value::from(record.message.clone()));
    doc.insert("timestamp".into(), Value::from(gelf_timestamp(&record.timestamp)));
    doc.insert("level".into(), Value::from(record.severity.syslog_level()));
    doc.insert("_logger".into(), Value::from(record.logger.clone()));
    doc.insert("_facility".into(), Value::from(record.category.prefix()));
    doc.insert("_level_name".into(), Value::from(record.severity.as_str()));

    serde_json::to_vec(&Value::Object(doc))
        .map_err(|e| SynError::InternalError(format!("GELF encode: {}", e)))
}

fn gelf_timestamp(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Maps a field key onto the GELF additional-field grammar `_[\w.-]+`.
/// `_id` is reserved by the collector.
fn additional_field_name(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect();
    match cleaned.as_str() {
        "id" => "_id_".to_string(),
        "" => "_empty".to_string(),
        _ => format!("_{}", cleaned),
    }
}
