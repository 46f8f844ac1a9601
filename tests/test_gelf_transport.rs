//! # GELF transport
//!
//! Runs loggers against a local TCP listener standing in for the collector.

use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use synlogger::loggers::transports::gelf;
use synlogger::loggers::{
    Category, DeliveryMode, Fields, FrameDelimiter, LogRecord, Logger, LoggerBuilder, Severity,
};
use synlogger::{error, info};

async fn collector() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind collector");
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn graylog(builder: LoggerBuilder, port: u16) -> Logger {
    builder
        .with_server("127.0.0.1")
        .with_port(port)
        .with_host_name("node-a")
        .initialise()
        .expect("graylog logger should initialise")
}

async fn read_frame(reader: &mut BufReader<TcpStream>, delimiter: u8) -> Value {
    let mut buf = Vec::new();
    timeout(Duration::from_secs(2), reader.read_until(delimiter, &mut buf))
        .await
        .expect("frame should arrive")
        .expect("read frame");
    assert_eq!(buf.pop(), Some(delimiter), "frame must end with the delimiter");
    serde_json::from_slice(&buf).expect("frame is JSON")
}

#[tokio::test]
async fn records_arrive_as_null_delimited_gelf() {
    let (listener, port) = collector().await;
    let logger = graylog(LoggerBuilder::ttp("ttp_1"), port);

    // Nothing connects until the first record is sent
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());

    error!(logger, "lost worker", "round" => 3, "worker" => "WKR_worker_1");
    assert!(logger.flush(Duration::from_secs(2)).await);

    let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("logger should connect")
        .expect("accept");
    let mut reader = BufReader::new(stream);
    let doc = read_frame(&mut reader, b'\0').await;

    assert_eq!(doc["version"], "1.1");
    assert_eq!(doc["host"], "node-a");
    assert_eq!(doc["short_message"], "lost worker");
    assert_eq!(doc["level"], 3);
    assert_eq!(doc["_logger"], "TTP_ttp_1");
    assert_eq!(doc["_facility"], "TTP");
    assert_eq!(doc["_level_name"], "error");
    assert_eq!(doc["_round"], 3);
    assert_eq!(doc["_worker"], "WKR_worker_1");
    assert!(doc["timestamp"].as_f64().unwrap() > 0.0);

    let stats = logger.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn caller_fields_cannot_replace_record_keys() {
    let (listener, port) = collector().await;
    let logger = graylog(LoggerBuilder::worker("w1"), port);

    error!(logger, "x", "facility" => "DIR", "level_name" => "debug", "logger" => "DIR_other");
    assert!(logger.flush(Duration::from_secs(2)).await);

    let (stream, _) = listener.accept().await.expect("accept");
    let mut reader = BufReader::new(stream);
    let doc = read_frame(&mut reader, b'\0').await;

    assert_eq!(doc["_facility"], "WKR");
    assert_eq!(doc["_level_name"], "error");
    assert_eq!(doc["_logger"], "WKR_w1");
    assert_eq!(doc["_extra_facility"], "DIR");
    assert_eq!(doc["_extra_level_name"], "debug");
    assert_eq!(doc["_extra_logger"], "DIR_other");
}

#[tokio::test]
async fn reconnects_after_the_collector_drops_the_connection() {
    let (listener, port) = collector().await;
    let logger = graylog(
        LoggerBuilder::worker("worker_3").with_delivery_mode(DeliveryMode::Synchronous),
        port,
    );

    info!(logger, "before");
    assert!(logger.flush(Duration::from_secs(2)).await);
    let (first, _) = listener.accept().await.expect("accept");
    let mut reader = BufReader::new(first);
    assert_eq!(read_frame(&mut reader, b'\0').await["short_message"], "before");
    drop(reader);

    // The first writes after the close may still land in the socket buffer;
    // keep logging until the failure is noticed and a new connection shows up.
    let mut second = None;
    for attempt in 0..50 {
        info!(logger, "after", "attempt" => attempt);
        assert!(logger.flush(Duration::from_secs(2)).await);
        if let Ok(accepted) = timeout(Duration::from_millis(50), listener.accept()).await {
            second = Some(accepted.expect("accept").0);
            break;
        }
    }

    let mut reader = BufReader::new(second.expect("logger should reconnect"));
    let doc = read_frame(&mut reader, b'\0').await;
    assert_eq!(doc["short_message"], "after");
    assert!(logger.stats().transport_errors >= 1);
}

#[tokio::test]
async fn newline_frames_in_synchronous_mode_share_one_connection() {
    let (listener, port) = collector().await;
    let logger = graylog(
        LoggerBuilder::director("node_0")
            .with_frame_delimiter(FrameDelimiter::Newline)
            .with_delivery_mode(DeliveryMode::Synchronous),
        port,
    );

    info!(logger, "first");
    info!(logger, "second");
    assert!(logger.flush(Duration::from_secs(2)).await);

    let (stream, _) = listener.accept().await.expect("accept");
    let mut reader = BufReader::new(stream);
    assert_eq!(read_frame(&mut reader, b'\n').await["short_message"], "first");
    assert_eq!(read_frame(&mut reader, b'\n').await["short_message"], "second");

    // A single connection is reused for both records
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}

#[tokio::test]
async fn unreachable_collector_drops_after_retries() {
    let (listener, port) = collector().await;
    drop(listener);

    let logger = graylog(
        LoggerBuilder::worker("worker_1").with_send_timeout(Duration::from_millis(500)),
        port,
    );

    assert_eq!(logger.info("nobody listening"), synlogger::loggers::Enqueue::Queued);
    assert!(logger.flush(Duration::from_secs(3)).await);

    let stats = logger.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.dropped, 1);
    // One initial attempt plus the default single retry
    assert_eq!(stats.transport_errors, 2);
}

#[tokio::test]
async fn shutdown_flushes_buffered_frames() {
    let (listener, port) = collector().await;
    let logger = graylog(LoggerBuilder::worker("worker_2"), port);

    info!(logger, "last words");
    assert!(logger.shutdown(Duration::from_secs(2)).await);

    let (stream, _) = listener.accept().await.expect("accept");
    let mut reader = BufReader::new(stream);
    assert_eq!(read_frame(&mut reader, b'\0').await["short_message"], "last words");
}

#[test]
fn encode_maps_fields_onto_gelf_grammar() {
    let mut fields = Fields::new();
    fields.insert("id".into(), Value::from("abc"));
    fields.insert("cpu percent".into(), Value::from(12.5));
    fields.insert("disk_percent".into(), Value::Null);

    let record = LogRecord {
        timestamp: Utc::now(),
        severity: Severity::Warning,
        category: Category::Sysmetric,
        logger: "SYS_sys_1".into(),
        host: "node-b".into(),
        message: "probe".into(),
        fields,
    };

    let doc: Value = serde_json::from_slice(&gelf::encode(&record).unwrap()).unwrap();
    assert_eq!(doc["level"], 4);
    assert_eq!(doc["_facility"], "SYS");
    assert_eq!(doc["_id_"], "abc");
    assert_eq!(doc["_cpu_percent"], 12.5);
    assert!(doc.get("_disk_percent").is_none(), "null fields are left out");
    assert!(doc.get("_id").is_none());
}

#[test]
fn encode_keeps_record_keys_over_extra_fields() {
    // Filters run after reserved keys are renamed, so fields may still collide here
    let mut fields = Fields::new();
    fields.insert("facility".into(), Value::from("DIR"));
    fields.insert("level_name".into(), Value::from("debug"));
    fields.insert("logger".into(), Value::from("DIR_other"));

    let record = LogRecord {
        timestamp: Utc::now(),
        severity: Severity::Critical,
        category: Category::Worker,
        logger: "WKR_w1".into(),
        host: "node-c".into(),
        message: "collide".into(),
        fields,
    };

    let doc: Value = serde_json::from_slice(&gelf::encode(&record).unwrap()).unwrap();
    assert_eq!(doc["_facility"], "WKR");
    assert_eq!(doc["_level_name"], "critical");
    assert_eq!(doc["_logger"], "WKR_w1");
}
