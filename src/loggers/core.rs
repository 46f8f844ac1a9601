use serde::{Deserialize, Serialize};
use serde_json::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::SynError;
use crate::loggers::probe::METRIC_GROUPS;

/// Extra key/value pairs carried by a record. Values are JSON scalars.
pub type Fields = BTreeMap<String, Value>;

/// Keys owned by the record itself; caller fields using them get renamed.
pub const RESERVED_KEYS: &[&str] = &[
    "timestamp", "severity", "level", "level_name", "category", "facility", "logger", "message", "host",
];

/// Replacement value for censored fields.
pub const CENSORED: &str = "*CENSORED*";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug, Info, Warning, Error, Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug, Severity::Info, Severity::Warning, Severity::Error, Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Syslog numeric level used in the GELF `level` field.
    pub fn syslog_level(&self) -> u8 {
        match self {
            Severity::Debug => 7,
            Severity::Info => 6,
            Severity::Warning => 4,
            Severity::Error => 3,
            Severity::Critical => 2,
        }
    }

    /// Numeric level in the 10..50 scale used by the grid's configuration files.
    pub fn numeric(&self) -> u8 {
        match self {
            Severity::Debug => 10,
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Critical => 50,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SynError;

    /// Accepts level names (case-insensitive, `warn`/`fatal` aliases) and the
    /// numeric forms 10, 20, 30, 40, 50.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "10" => Ok(Severity::Debug),
            "info" | "20" => Ok(Severity::Info),
            "warning" | "warn" | "30" => Ok(Severity::Warning),
            "error" | "40" => Ok(Severity::Error),
            "critical" | "fatal" | "50" => Ok(Severity::Critical),
            other => Err(SynError::ConfigError(format!("Unknown logging level: {}", other))),
        }
    }
}

/// Grid role emitting a record. The collector routes streams on its prefix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "SYS")]
    Sysmetric,
    #[serde(rename = "DIR")]
    Director,
    #[serde(rename = "TTP")]
    Ttp,
    #[serde(rename = "WKR")]
    Worker,
}

impl Category {
    pub fn prefix(&self) -> &'static str {
        match self {
            Category::Sysmetric => "SYS",
            Category::Director => "DIR",
            Category::Ttp => "TTP",
            Category::Worker => "WKR",
        }
    }

    /// Collector port allocated to this role when none is configured.
    pub fn default_port(&self) -> u16 {
        match self {
            Category::Sysmetric => 9100,
            Category::Director => 9200,
            Category::Ttp => 9300,
            Category::Worker => 9400,
        }
    }

    /// Renders `<PREFIX>_<name>`, the identity the collector's stream rules match on.
    pub fn logger_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix(), name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    /// Prefixed logger name, e.g. `WKR_worker_1`.
    pub logger: String,
    /// Host the record originates from.
    pub host: String,
    pub message: String,
    pub fields: Fields,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Converts any serializable value into a scalar field value.
///
/// Arrays and objects are flattened to their JSON text so every field stays a
/// scalar on the wire; values that fail to serialize become `null`.
pub fn to_field_value<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value).unwrap_or(Value::Null) {
        v @ (Value::Array(_) | Value::Object(_)) => Value::String(v.to_string()),
        v => v,
    }
}

/// Where a tracking session was started from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackingContext {
    pub file_path: String,
    pub class_name: String,
    pub function_name: String,
}

impl TrackingContext {
    pub fn new(file_path: &str, class_name: &str, function_name: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            class_name: class_name.to_string(),
            function_name: function_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Point-in-time host utilization. `None` marks a metric that could not be
/// queried; the other metrics of the same reading stay valid.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct HostMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub network: Option<NetworkCounters>,
    /// Number of sub-queries that failed while taking this reading.
    #[serde(skip)]
    pub failures: u32,
}

impl HostMetrics {
    /// Reading where nothing could be queried (probe timed out or was busy).
    pub fn unavailable() -> Self {
        Self { failures: METRIC_GROUPS, ..Self::default() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSample {
    pub sequence_id: u64,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub network: Option<NetworkCounters>,
    pub sampled_at: DateTime<Utc>,
    pub context: TrackingContext,
}

impl MetricSample {
    pub fn stamp(metrics: HostMetrics, sequence_id: u64, context: &TrackingContext) -> Self {
        Self {
            sequence_id,
            cpu_percent: metrics.cpu_percent,
            memory_percent: metrics.memory_percent,
            disk_percent: metrics.disk_percent,
            memory: metrics.memory,
            network: metrics.network,
            sampled_at: Utc::now(),
            context: context.clone(),
        }
    }

    /// Names of the metric groups this sample could not read.
    pub fn unavailable_metrics(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.cpu_percent.is_none() {
            missing.push("cpu");
        }
        if self.memory.is_none() {
            missing.push("memory");
        }
        if self.disk_percent.is_none() {
            missing.push("disk");
        }
        if self.network.is_none() {
            missing.push("network");
        }
        missing
    }

    /// Flattens the sample into record fields. Unavailable metrics are `null`.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        let pct = |v: Option<f64>| v.map(Value::from).unwrap_or(Value::Null);

        fields.insert("sequence_id".into(), Value::from(self.sequence_id));
        fields.insert("sampled_at".into(), Value::from(self.sampled_at.to_rfc3339()));
        fields.insert("cpu_percent".into(), pct(self.cpu_percent));
        fields.insert("memory_percent".into(), pct(self.memory_percent));
        fields.insert("disk_percent".into(), pct(self.disk_percent));

        let mem = self.memory;
        let mem_field = |f: fn(&MemoryUsage) -> u64| mem.as_ref().map(|m| Value::from(f(m))).unwrap_or(Value::Null);
        fields.insert("memory_total".into(), mem_field(|m| m.total));
        fields.insert("memory_available".into(), mem_field(|m| m.available));
        fields.insert("memory_used".into(), mem_field(|m| m.used));
        fields.insert("memory_free".into(), mem_field(|m| m.free));

        let net = self.network;
        let net_field = |f: fn(&NetworkCounters) -> u64| net.as_ref().map(|n| Value::from(f(n))).unwrap_or(Value::Null);
        fields.insert("net_bytes_sent".into(), net_field(|n| n.bytes_sent));
        fields.insert("net_bytes_recv".into(), net_field(|n| n.bytes_recv));
        fields.insert("net_packets_sent".into(), net_field(|n| n.packets_sent));
        fields.insert("net_packets_recv".into(), net_field(|n| n.packets_recv));

        let missing = self.unavailable_metrics();
        if !missing.is_empty() {
            fields.insert("unavailable".into(), Value::from(missing.join(",")));
        }

        fields.insert("file_path".into(), Value::from(self.context.file_path.clone()));
        fields.insert("class_name".into(), Value::from(self.context.class_name.clone()));
        fields.insert("function_name".into(), Value::from(self.context.function_name.clone()));
        fields
    }
}
