use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::loggers::core::LogRecord;
use crate::loggers::stats::DeliveryStats;
use crate::loggers::transports::Transport;

/// Messages travelling on a logger's queue. Control messages are ordered with
/// the records, so acknowledging one means every earlier record was handled.
pub enum Envelope {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct LogWorker {
    receiver: mpsc::Receiver<Envelope>,
    transport: Transport,
    stats: Arc<DeliveryStats>,
    max_retries: u32,
}

impl LogWorker {
    pub fn new(
        receiver: mpsc::Receiver<Envelope>,
        transport: Transport,
        stats: Arc<DeliveryStats>,
        max_retries: u32,
    ) -> Self {
        Self { receiver, transport, stats, max_retries }
    }

    pub async fn run(mut self) {
        while let Some(envelope) = self.receiver.recv().await {
            match envelope {
                Envelope::Record(record) => {
                    self.deliver(&record).await;
                    if self.receiver.is_empty() {
                        self.flush_transport().await;
                    }
                }
                Envelope::Flush(ack) => {
                    self.flush_transport().await;
                    let _ = ack.send(());
                }
                Envelope::Shutdown(ack) => {
                    self.stop().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }

        // Every handle was dropped without an explicit shutdown.
        self.transport.close().await;
        self.account_lost();
    }

    async fn deliver(&mut self, record: &LogRecord) {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.transport.send(record).await {
                Ok(()) => {
                    self.stats.record_delivered();
                    self.account_lost();
                    return;
                }
                Err(e) => {
                    self.stats.record_transport_error();
                    tracing::debug!(
                        target: "synlogger::transport",
                        logger = %record.logger,
                        attempt,
                        error = %e,
                        "delivery attempt failed"
                    );
                }
            }
        }

        self.account_lost();
        self.stats.record_dropped(1);
        tracing::warn!(
            target: "synlogger::transport",
            logger = %record.logger,
            attempts,
            "record dropped after exhausting retries"
        );
    }

    async fn flush_transport(&mut self) {
        if let Err(e) = self.transport.flush().await {
            self.stats.record_transport_error();
            tracing::debug!(target: "synlogger::transport", error = %e, "flush failed");
        }
        self.account_lost();
    }

    async fn stop(&mut self) {
        self.receiver.close();
        self.transport.close().await;
        self.account_lost();

        // Anything that slipped in behind the shutdown request is not delivered.
        while let Ok(envelope) = self.receiver.try_recv() {
            match envelope {
                Envelope::Record(_) => self.stats.record_dropped(1),
                Envelope::Flush(ack) | Envelope::Shutdown(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    fn account_lost(&mut self) {
        let lost = self.transport.take_lost();
        if lost > 0 {
            self.stats.record_dropped(lost);
        }
    }
}
