//! # Record Formatter
//!
//! Turns a log call into a [`LogRecord`]. Processing order:
//!
//! 1. level gate (before anything is allocated),
//! 2. field sanitizing (reserved keys renamed, values flattened to scalars),
//! 3. debugging fields,
//! 4. filter functions in declaration order,
//! 5. `file_path` stamping,
//! 6. censoring.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::SynError;
use crate::loggers::builder::LoggerConfiguration;
use crate::loggers::core::{Fields, LogRecord, Severity, CENSORED, RESERVED_KEYS, to_field_value};

pub struct RecordFormatter {
    config: Arc<LoggerConfiguration>,
}

impl RecordFormatter {
    pub fn new(config: Arc<LoggerConfiguration>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoggerConfiguration {
        &self.config
    }

    pub fn is_enabled(&self, level: Severity) -> bool {
        level >= self.config.minimum_level
    }

    pub fn format(&self, level: Severity, message: &str, fields: Fields) -> Result<LogRecord, SynError> {
        if !self.is_enabled(level) {
            return Err(SynError::ValidationError(format!(
                "{} is below the minimum level {}",
                level, self.config.minimum_level
            )));
        }

        let mut record = LogRecord {
            timestamp: Utc::now(),
            severity: level,
            category: self.config.category,
            logger: self.config.logger_name.clone(),
            host: self.config.host.clone(),
            message: message.to_string(),
            fields: Fields::new(),
        };

        for (key, value) in fields {
            let key = if RESERVED_KEYS.contains(&key.as_str()) {
                format!("extra_{}", key)
            } else {
                key
            };
            record.fields.insert(key, to_field_value(&value));
        }

        if self.config.debugging_fields {
            attach_debugging_fields(&mut record.fields);
        }

        for (idx, filter) in self.config.filter_functions.iter().enumerate() {
            if !filter(&mut record) {
                return Err(SynError::ValidationError(format!("Rejected by filter #{}", idx)));
            }
        }

        record
            .fields
            .entry("file_path".to_string())
            .or_insert_with(|| Value::from(self.config.file_path.clone()));

        self.censor(&mut record.fields);
        Ok(record)
    }

    fn censor(&self, fields: &mut Fields) {
        for key in &self.config.censor_keys {
            if let Some(value) = fields.get_mut(key) {
                if is_truthy(value) {
                    *value = Value::from(CENSORED);
                }
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn attach_debugging_fields(fields: &mut Fields) {
    let process_name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let thread = std::thread::current();

    fields.insert("process_id".into(), Value::from(std::process::id()));
    fields.insert("process_name".into(), Value::from(process_name));
    fields.insert("thread_name".into(), Value::from(thread.name().unwrap_or("unnamed")));
}
