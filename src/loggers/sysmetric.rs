//! # Sysmetric tracking
//!
//! A [`SysmetricLogger`] wraps a `SYS_` [`Logger`] and periodically emits host
//! metric samples through it. Each `track` call starts one background sampling
//! task; `terminate` cancels it, lets the in-flight sample finish and drains
//! the queue within the configured drain timeout.
//!
//! The sampler never waits on the delivery queue. When the queue is full,
//! samples wait in a small backlog and the oldest one is evicted when a new
//! sample arrives.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant, MissedTickBehavior};

use crate::core::error::SynError;
use crate::loggers::builder::{Enqueue, Logger};
use crate::loggers::core::{Category, Fields, HostMetrics, MetricSample, Severity, TrackingContext};
use crate::loggers::probe::MetricProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Configured and ready, never tracked.
    Initialized,
    Tracking,
    Stopped,
}

/// Snapshot of the tracking session, readable without locking.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrackingStatus {
    pub state: LifecycleState,
    pub interval: Option<Duration>,
    pub context: Option<TrackingContext>,
    pub started_at: Option<DateTime<Utc>>,
    pub sessions_started: u64,
}

struct ActiveSession {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

pub struct SysmetricLogger {
    logger: Logger,
    probe: Arc<Mutex<MetricProbe>>,
    session: Mutex<Option<ActiveSession>>,
    status: ArcSwap<TrackingStatus>,
}

impl SysmetricLogger {
    /// Wraps a `SYS_` logger, probing the local host.
    pub fn new(logger: Logger) -> Result<Self, SynError> {
        Self::with_probe(logger, MetricProbe::system())
    }

    pub fn with_probe(logger: Logger, probe: MetricProbe) -> Result<Self, SynError> {
        if logger.category() != Category::Sysmetric {
            return Err(SynError::ConfigError(format!(
                "sysmetric tracking needs a SYS logger, got {}",
                logger.category()
            )));
        }

        Ok(Self {
            logger,
            probe: Arc::new(Mutex::new(probe)),
            session: Mutex::new(None),
            status: ArcSwap::from_pointee(TrackingStatus {
                state: LifecycleState::Initialized,
                interval: None,
                context: None,
                started_at: None,
                sessions_started: 0,
            }),
        })
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn status(&self) -> Arc<TrackingStatus> {
        self.status.load_full()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.load().state
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == LifecycleState::Tracking
    }

    /// Starts sampling at the configured interval.
    ///
    /// Returns `Ok(false)` without touching the running session if one is
    /// already active.
    pub fn track(&self, file_path: &str, class_name: &str, function_name: &str) -> Result<bool, SynError> {
        let interval = self.logger.config().sampling.interval;
        self.track_with_interval(file_path, class_name, function_name, interval)
    }

    pub fn track_with_interval(
        &self,
        file_path: &str,
        class_name: &str,
        function_name: &str,
        interval: Duration,
    ) -> Result<bool, SynError> {
        if interval.is_zero() {
            return Err(SynError::ConfigError("tracking interval must be greater than 0".into()));
        }

        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            let mut fields = Fields::new();
            fields.insert("requested_file_path".into(), Value::from(file_path));
            fields.insert("requested_class_name".into(), Value::from(class_name));
            fields.insert("requested_function_name".into(), Value::from(function_name));
            self.logger.log(
                Severity::Warning,
                "Sysmetric tracking already running; keeping the current session",
                fields,
            );
            return Ok(false);
        }

        let context = TrackingContext::new(file_path, class_name, function_name);
        let sampling = &self.logger.config().sampling;
        let sampler = Sampler {
            logger: self.logger.clone(),
            probe: self.probe.clone(),
            message: format!("{} - Probing system's hardware usage", self.logger.name()),
            context: context.clone(),
            interval,
            probe_timeout: sampling.probe_timeout,
            backlog: sampling.backlog,
            self_observability: sampling.self_observability,
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(sampler.run(cancel_rx));
        *session = Some(ActiveSession { cancel: cancel_tx, handle });

        let sessions_started = self.status.load().sessions_started + 1;
        self.status.store(Arc::new(TrackingStatus {
            state: LifecycleState::Tracking,
            interval: Some(interval),
            context: Some(context),
            started_at: Some(Utc::now()),
            sessions_started,
        }));
        Ok(true)
    }

    /// Stops the running session and drains queued records.
    ///
    /// Returns `false` when nothing was being tracked; the state is left as is.
    pub async fn terminate(&self) -> bool {
        let active = self.lock_session().take();
        let Some(ActiveSession { cancel, mut handle }) = active else {
            return false;
        };

        let deadline = Instant::now() + self.logger.config().delivery.drain_timeout;
        let _ = cancel.send(());
        let samples = match timeout_at(deadline, &mut handle).await {
            Ok(Ok(samples)) => Some(samples),
            _ => {
                handle.abort();
                None
            }
        };

        let mut fields = Fields::new();
        if let Some(samples) = samples {
            fields.insert("samples_emitted".into(), Value::from(samples));
        }
        self.logger.log(Severity::Info, "Sysmetric operations stopped.", fields);
        self.logger.flush(deadline.saturating_duration_since(Instant::now())).await;

        // A `track` that ran during the drain owns the status now.
        let session = self.lock_session();
        if session.is_none() {
            let previous = self.status.load_full();
            self.status.store(Arc::new(TrackingStatus {
                state: LifecycleState::Stopped,
                ..(*previous).clone()
            }));
        }
        true
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SysmetricLogger {
    fn drop(&mut self) {
        if let Some(active) = self.lock_session().take() {
            let _ = active.cancel.send(());
        }
    }
}

struct Sampler {
    logger: Logger,
    probe: Arc<Mutex<MetricProbe>>,
    message: String,
    context: TrackingContext,
    interval: Duration,
    probe_timeout: Duration,
    backlog: usize,
    self_observability: bool,
}

impl Sampler {
    /// Returns the number of samples taken.
    async fn run(self, mut cancel: oneshot::Receiver<()>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut pending = SampleBacklog::new(self.backlog);
        let mut sequence = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break,
                _ = ticker.tick() => {
                    let metrics = self.read_probe().await;
                    let sample = MetricSample::stamp(metrics, sequence, &self.context);
                    sequence += 1;
                    if !self.offer(&mut pending, sample) {
                        break;
                    }
                }
            }
        }

        self.forward(&mut pending);
        if !pending.is_empty() {
            self.logger.stats_handle().record_dropped(pending.len() as u64);
        }
        sequence
    }

    /// Runs the probe off the async workers, bounded by the probe timeout.
    async fn read_probe(&self) -> HostMetrics {
        let probe = Arc::clone(&self.probe);
        let reading = tokio::task::spawn_blocking(move || match probe.try_lock() {
            Ok(mut probe) => probe.sample(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().sample(),
            // A previous reading is still stuck in the OS.
            Err(TryLockError::WouldBlock) => HostMetrics::unavailable(),
        });

        let metrics = match timeout(self.probe_timeout, reading).await {
            Ok(Ok(metrics)) => metrics,
            _ => HostMetrics::unavailable(),
        };
        if metrics.failures > 0 {
            self.logger.stats_handle().record_probe_errors(u64::from(metrics.failures));
        }
        metrics
    }

    /// Appends a fresh sample behind the backlog, evicting the oldest one when
    /// the backlog is full, then forwards what fits.
    fn offer(&self, pending: &mut SampleBacklog, sample: MetricSample) -> bool {
        if pending.push(sample).is_some() {
            self.logger.stats_handle().record_dropped(1);
        }
        self.forward(pending)
    }

    /// Moves samples from the backlog onto the logger queue until it is full.
    /// Returns `false` once the logger is closed.
    fn forward(&self, pending: &mut SampleBacklog) -> bool {
        while let Some(sample) = pending.front() {
            let fields = self.fields_for(sample);
            match self.logger.try_log(Severity::Info, &self.message, fields) {
                Enqueue::Queued | Enqueue::Suppressed => {
                    pending.pop_front();
                }
                Enqueue::Full => return true,
                Enqueue::Closed => {
                    pending.pop_front();
                    self.logger.stats_handle().record_dropped(pending.len() as u64);
                    pending.clear();
                    return false;
                }
            }
        }
        true
    }

    fn fields_for(&self, sample: &MetricSample) -> Fields {
        let mut fields = sample.to_fields();
        fields.insert("resolution".into(), Value::from(self.interval.as_secs_f64()));

        if self.self_observability {
            let stats = self.logger.stats();
            fields.insert("records_dropped".into(), Value::from(stats.dropped));
            fields.insert("records_suppressed".into(), Value::from(stats.suppressed));
            fields.insert("transport_errors".into(), Value::from(stats.transport_errors));
            fields.insert("probe_errors".into(), Value::from(stats.probe_errors));
        }
        fields
    }
}

/// Bounded FIFO of samples waiting for room on the logger queue.
struct SampleBacklog {
    capacity: usize,
    items: VecDeque<MetricSample>,
}

impl SampleBacklog {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, items: VecDeque::with_capacity(capacity) }
    }

    /// Appends a sample, returning the evicted oldest one when full.
    fn push(&mut self, sample: MetricSample) -> Option<MetricSample> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(sample);
        evicted
    }

    fn front(&self) -> Option<&MetricSample> {
        self.items.front()
    }

    fn pop_front(&mut self) -> Option<MetricSample> {
        self.items.pop_front()
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loggers::builder::LoggerBuilder;
    use crate::loggers::core::HostMetrics;
    use crate::loggers::transports::BackendVariant;

    fn sample(sequence_id: u64) -> MetricSample {
        MetricSample::stamp(HostMetrics::default(), sequence_id, &TrackingContext::new("f", "C", "fn"))
    }

    #[test]
    fn backlog_evicts_oldest_when_full() {
        let mut backlog = SampleBacklog::new(2);
        assert!(backlog.push(sample(0)).is_none());
        assert!(backlog.push(sample(1)).is_none());

        let evicted = backlog.push(sample(2)).expect("oldest sample should be evicted");
        assert_eq!(evicted.sequence_id, 0);
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.front().map(|s| s.sequence_id), Some(1));
    }

    #[test]
    fn backlog_keeps_at_least_one_sample() {
        let mut backlog = SampleBacklog::new(0);
        assert!(backlog.push(sample(0)).is_none());
        assert_eq!(backlog.push(sample(1)).map(|s| s.sequence_id), Some(0));
        assert_eq!(backlog.pop_front().map(|s| s.sequence_id), Some(1));
        assert!(backlog.is_empty());
    }

    #[tokio::test]
    async fn full_queue_keeps_the_newest_samples() {
        let logger = LoggerBuilder::sysmetric("sys_1")
            .with_variant(BackendVariant::Capture)
            .with_queue_capacity(1)
            .initialise()
            .unwrap();
        let sampler = Sampler {
            logger: logger.clone(),
            probe: Arc::new(Mutex::new(MetricProbe::system())),
            message: "SYS_sys_1 - Probing system's hardware usage".into(),
            context: TrackingContext::new("f", "C", "fn"),
            interval: Duration::from_millis(10),
            probe_timeout: Duration::from_secs(1),
            backlog: 2,
            self_observability: false,
        };

        // The worker cannot run before the first await, so the queue stays full.
        assert_eq!(logger.info("occupies the queue"), Enqueue::Queued);
        let mut pending = SampleBacklog::new(2);
        for sequence_id in 0..5 {
            assert!(sampler.offer(&mut pending, sample(sequence_id)));
        }
        assert_eq!(logger.stats().dropped, 3);
        assert_eq!(pending.len(), 2);

        while !pending.is_empty() {
            assert!(logger.flush(Duration::from_secs(1)).await);
            assert!(sampler.forward(&mut pending));
        }
        assert!(logger.flush(Duration::from_secs(1)).await);

        let delivered: Vec<u64> = logger
            .captured()
            .unwrap()
            .records()
            .iter()
            .filter_map(|r| r.field("sequence_id").and_then(Value::as_u64))
            .collect();
        assert_eq!(delivered, vec![3, 4]);
        assert_eq!(logger.stats().dropped, 3);
    }
}
