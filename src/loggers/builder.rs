use tokio::sync::{mpsc, oneshot};
use crate::loggers::worker::{Envelope, LogWorker};
use crate::loggers::core::{Category, Fields, LogRecord, Severity};
use crate::loggers::format::RecordFormatter;
use crate::loggers::stats::{DeliveryStats, StatsSnapshot};
use crate::loggers::sysmetric::SysmetricLogger;
use crate::loggers::transports::{BackendVariant, CaptureSink, DeliveryMode, FrameDelimiter, Transport};
use crate::configs::LoggerSettings;
use crate::core::error::SynError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Predicate over the in-progress record. It may enrich the record; returning
/// `false` suppresses it.
pub type FilterFn = Arc<dyn Fn(&mut LogRecord) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOptions {
    pub queue_capacity: usize,
    pub send_timeout: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Upper bound for `flush`/`shutdown`/`terminate` drains.
    pub drain_timeout: Duration,
    pub mode: DeliveryMode,
    pub frame_delimiter: FrameDelimiter,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            send_timeout: Duration::from_secs(2),
            max_retries: 1,
            drain_timeout: Duration::from_secs(5),
            mode: DeliveryMode::Buffered,
            frame_delimiter: FrameDelimiter::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    pub interval: Duration,
    pub probe_timeout: Duration,
    /// Samples kept while the queue is full; the oldest is evicted first.
    pub backlog: usize,
    /// Attach the logger's own counters to every sample.
    pub self_observability: bool,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            backlog: 16,
            self_observability: false,
        }
    }
}

/// Immutable once the logger is initialised.
pub struct LoggerConfiguration {
    pub category: Category,
    /// Prefixed name, e.g. `TTP_ttp_1`.
    pub logger_name: String,
    /// Name of the machine records are stamped with.
    pub host: String,
    pub server_host: Option<String>,
    pub server_port: u16,
    pub minimum_level: Severity,
    pub backend_variant: BackendVariant,
    pub debugging_fields: bool,
    pub filter_functions: Vec<FilterFn>,
    pub censor_keys: Vec<String>,
    pub file_path: String,
    pub delivery: DeliveryOptions,
    pub sampling: SamplingOptions,
}

/// Outcome of handing a record to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Below the minimum level or vetoed by a filter.
    Suppressed,
    Full,
    Closed,
}

#[derive(Clone)]
pub struct Logger {
    sender: mpsc::Sender<Envelope>,
    formatter: Arc<RecordFormatter>,
    stats: Arc<DeliveryStats>,
    capture: Option<CaptureSink>,
}

pub struct LoggerBuilder {
    category: Category,
    name: String,
    server: Option<String>,
    port: Option<u16>,
    level: Severity,
    variant: BackendVariant,
    debugging_fields: bool,
    filters: Vec<FilterFn>,
    censor_keys: Vec<String>,
    file_path: String,
    delivery: DeliveryOptions,
    sampling: SamplingOptions,
    host: Option<String>,
}

impl LoggerBuilder {
    pub fn new(category: Category, name: &str) -> Self {
        Self {
            category,
            name: name.to_string(),
            server: None,
            port: None,
            level: Severity::Info,
            variant: BackendVariant::Graylog,
            debugging_fields: false,
            filters: Vec::new(),
            censor_keys: Vec::new(),
            file_path: String::new(),
            delivery: DeliveryOptions::default(),
            sampling: SamplingOptions::default(),
            host: None,
        }
    }

    pub fn director(name: &str) -> Self {
        Self::new(Category::Director, name)
    }

    pub fn ttp(name: &str) -> Self {
        Self::new(Category::Ttp, name)
    }

    pub fn worker(name: &str) -> Self {
        Self::new(Category::Worker, name)
    }

    pub fn sysmetric(name: &str) -> Self {
        Self::new(Category::Sysmetric, name)
    }

    /// Seeds a builder from loaded settings. Level, variant, delivery mode and
    /// frame delimiter strings are parsed here.
    pub fn from_settings(category: Category, settings: &LoggerSettings) -> Result<Self, SynError> {
        let mut builder = Self::new(category, &settings.logger_name)
            .with_level(settings.logging_level.parse()?)
            .with_variant(settings.logging_variant.parse()?)
            .with_debugging_fields(settings.debugging_fields)
            .with_censor_keys(settings.censor_keys.clone())
            .with_file_path(&settings.file_path)
            .with_queue_capacity(settings.queue_capacity)
            .with_send_timeout(Duration::from_millis(settings.send_timeout_ms))
            .with_max_retries(settings.max_retries)
            .with_drain_timeout(Duration::from_millis(settings.drain_timeout_ms))
            .with_delivery_mode(settings.delivery_mode.parse()?)
            .with_frame_delimiter(settings.frame_delimiter.parse()?)
            .with_sampling_interval(Duration::from_millis(settings.sampling_interval_ms))
            .with_probe_timeout(Duration::from_millis(settings.probe_timeout_ms))
            .with_sample_backlog(settings.sample_backlog)
            .with_self_observability(settings.self_observability);

        if let Some(server) = &settings.server {
            builder = builder.with_server(server);
        }
        if let Some(port) = settings.port {
            builder = builder.with_port(port);
        }
        Ok(builder)
    }

    pub fn with_server(mut self, host: &str) -> Self {
        self.server = Some(host.to_string());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn with_variant(mut self, variant: BackendVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_debugging_fields(mut self, enabled: bool) -> Self {
        self.debugging_fields = enabled;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut LogRecord) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_censor_keys(mut self, keys: Vec<String>) -> Self {
        self.censor_keys = keys;
        self
    }

    pub fn with_file_path(mut self, path: &str) -> Self {
        self.file_path = path.to_string();
        self
    }

    pub fn with_host_name(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.delivery.queue_capacity = capacity;
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.delivery.send_timeout = send_timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.delivery.max_retries = retries;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.delivery.drain_timeout = drain_timeout;
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery.mode = mode;
        self
    }

    pub fn with_frame_delimiter(mut self, delimiter: FrameDelimiter) -> Self {
        self.delivery.frame_delimiter = delimiter;
        self
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.sampling.probe_timeout = probe_timeout;
        self
    }

    pub fn with_sample_backlog(mut self, backlog: usize) -> Self {
        self.sampling.backlog = backlog;
        self
    }

    pub fn with_self_observability(mut self, enabled: bool) -> Self {
        self.sampling.self_observability = enabled;
        self
    }

    /// Validates the configuration, constructs the backend and spawns the
    /// delivery worker. Must be called inside a Tokio runtime.
    pub fn initialise(self) -> Result<Logger, SynError> {
        let capture = (self.variant == BackendVariant::Capture).then(CaptureSink::new);
        let config = self.into_configuration()?;
        let transport = Transport::from_config(&config, capture.clone())?;

        let (tx, rx) = mpsc::channel(config.delivery.queue_capacity);
        let stats = Arc::new(DeliveryStats::default());

        let worker = LogWorker::new(rx, transport, stats.clone(), config.delivery.max_retries);
        tokio::spawn(async move {
            worker.run().await;
        });

        Ok(Logger {
            sender: tx,
            formatter: Arc::new(RecordFormatter::new(Arc::new(config))),
            stats,
            capture,
        })
    }

    /// Same as [`LoggerBuilder::initialise`], wrapped in a [`SysmetricLogger`]
    /// probing this host. The category is forced to `SYS`.
    pub fn initialise_sysmetric(mut self) -> Result<SysmetricLogger, SynError> {
        self.category = Category::Sysmetric;
        SysmetricLogger::new(self.initialise()?)
    }

    fn into_configuration(self) -> Result<LoggerConfiguration, SynError> {
        if self.name.trim().is_empty() {
            return Err(SynError::ConfigError("logger_name must not be empty".into()));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(SynError::ConfigError("queue_capacity must be greater than 0".into()));
        }
        if self.sampling.interval.is_zero() {
            return Err(SynError::ConfigError("sampling interval must be greater than 0".into()));
        }
        if self.sampling.backlog == 0 {
            return Err(SynError::ConfigError("sample_backlog must be greater than 0".into()));
        }

        let server_host = self.server.filter(|s| !s.trim().is_empty());
        let server_port = self.port.unwrap_or_else(|| self.category.default_port());
        if self.variant == BackendVariant::Graylog {
            if server_host.is_none() {
                return Err(SynError::ConfigError("graylog variant requires a server host".into()));
            }
            if server_port == 0 {
                return Err(SynError::ConfigError("graylog variant requires a non-zero port".into()));
            }
        }

        let host = self
            .host
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(LoggerConfiguration {
            category: self.category,
            logger_name: self.category.logger_name(&self.name),
            host,
            server_host,
            server_port,
            minimum_level: self.level,
            backend_variant: self.variant,
            debugging_fields: self.debugging_fields,
            filter_functions: self.filters,
            censor_keys: self.censor_keys,
            file_path: self.file_path,
            delivery: self.delivery,
            sampling: self.sampling,
        })
    }
}

impl Logger {
    pub fn config(&self) -> &LoggerConfiguration {
        self.formatter.config()
    }

    pub fn name(&self) -> &str {
        &self.config().logger_name
    }

    pub fn category(&self) -> Category {
        self.config().category
    }

    pub fn enabled(&self, level: Severity) -> bool {
        self.formatter.is_enabled(level)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn stats_handle(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Records delivered so far when the `test`/`capture` variant is in use.
    pub fn captured(&self) -> Option<&CaptureSink> {
        self.capture.as_ref()
    }

    /// Formats and enqueues a record. Never blocks and never fails: records
    /// that cannot be queued are counted instead.
    pub fn log(&self, level: Severity, msg: &str, fields: Fields) -> Enqueue {
        match self.formatter.format(level, msg, fields) {
            Ok(record) => self.enqueue(record),
            Err(_) => {
                self.stats.record_suppressed();
                Enqueue::Suppressed
            }
        }
    }

    pub fn debug(&self, msg: &str) -> Enqueue {
        self.log(Severity::Debug, msg, Fields::new())
    }

    pub fn info(&self, msg: &str) -> Enqueue {
        self.log(Severity::Info, msg, Fields::new())
    }

    pub fn warning(&self, msg: &str) -> Enqueue {
        self.log(Severity::Warning, msg, Fields::new())
    }

    pub fn error(&self, msg: &str) -> Enqueue {
        self.log(Severity::Error, msg, Fields::new())
    }

    pub fn critical(&self, msg: &str) -> Enqueue {
        self.log(Severity::Critical, msg, Fields::new())
    }

    /// Like [`Logger::log`] but leaves a full queue to the caller, which can
    /// then retry later or evict something of its own.
    pub(crate) fn try_log(&self, level: Severity, msg: &str, fields: Fields) -> Enqueue {
        match self.formatter.format(level, msg, fields) {
            Ok(record) => match self.sender.try_send(Envelope::Record(record)) {
                Ok(()) => {
                    self.stats.record_enqueued();
                    Enqueue::Queued
                }
                Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.stats.record_dropped(1);
                    Enqueue::Closed
                }
            },
            Err(_) => {
                self.stats.record_suppressed();
                Enqueue::Suppressed
            }
        }
    }

    fn enqueue(&self, record: LogRecord) -> Enqueue {
        match self.sender.try_send(Envelope::Record(record)) {
            Ok(()) => {
                self.stats.record_enqueued();
                Enqueue::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_dropped(1);
                Enqueue::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.record_dropped(1);
                Enqueue::Closed
            }
        }
    }

    /// Waits until every record queued before this call has been handed to
    /// the backend and the backend flushed. Returns `false` on timeout or if
    /// the logger is shut down.
    pub async fn flush(&self, wait: Duration) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control(Envelope::Flush(ack_tx), ack_rx, wait).await
    }

    /// Drains the queue, releases the connection and stops the worker.
    pub async fn shutdown(&self, wait: Duration) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control(Envelope::Shutdown(ack_tx), ack_rx, wait).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn control(&self, envelope: Envelope, ack: oneshot::Receiver<()>, wait: Duration) -> bool {
        let round_trip = async {
            self.sender.send(envelope).await.ok()?;
            ack.await.ok()
        };
        matches!(timeout(wait, round_trip).await, Ok(Some(())))
    }
}
