use std::sync::{Arc, Mutex, MutexGuard};

use crate::loggers::core::LogRecord;

/// In-memory backend. Clones share the same buffer, so a test can keep one
/// handle while the worker owns the other.
#[derive(Clone, Default)]
pub struct CaptureSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: LogRecord) {
        self.lock().push(record);
    }

    /// Copy of everything delivered so far, in delivery order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
