use figment::{Figment, providers::{Env, Format, Json, Serialized, Toml}};
use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::core::error::SynError;

/// Prefix of the environment variables overriding file settings.
pub const ENV_PREFIX: &str = "SYNLOG_";

/// Raw logger settings as they appear in files and the environment.
///
/// Enumerated values (`logging_level`, `logging_variant`, `delivery_mode`,
/// `frame_delimiter`) stay strings here and are validated by
/// [`crate::loggers::LoggerBuilder::from_settings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerSettings {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub logger_name: String,
    pub logging_level: String,
    pub logging_variant: String,
    pub debugging_fields: bool,
    pub censor_keys: Vec<String>,
    pub file_path: String,
    pub queue_capacity: usize,
    pub send_timeout_ms: u64,
    pub max_retries: u32,
    pub drain_timeout_ms: u64,
    pub delivery_mode: String,
    pub frame_delimiter: String,
    pub sampling_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub sample_backlog: usize,
    pub self_observability: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            logger_name: "std_log".to_string(),
            logging_level: "info".to_string(),
            logging_variant: "graylog".to_string(),
            debugging_fields: false,
            censor_keys: Vec::new(),
            file_path: String::new(),
            queue_capacity: 1024,
            send_timeout_ms: 2_000,
            max_retries: 1,
            drain_timeout_ms: 5_000,
            delivery_mode: "buffered".to_string(),
            frame_delimiter: "null".to_string(),
            sampling_interval_ms: 1_000,
            probe_timeout_ms: 2_000,
            sample_backlog: 16,
            self_observability: false,
        }
    }
}

impl LoggerSettings {
    /// LOCAL: defaults <- TOML/JSON file <- SYNLOG_ env vars. Fails if file missing.
    pub fn load(path: &str) -> Result<Self, SynError> {
        let file = Path::new(path);
        if !file.exists() {
            return Err(SynError::ConfigError(format!("Local file not found: {}", path)));
        }

        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match file.extension().and_then(|e| e.to_str()) {
            Some("json") => figment.merge(Json::file(file)),
            Some("toml") => figment.merge(Toml::file(file)),
            other => {
                return Err(SynError::ConfigError(format!(
                    "Unsupported settings format {:?} for {}",
                    other, path
                )));
            }
        };

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// ENV: defaults <- SYNLOG_ env vars only.
    pub fn from_env() -> Result<Self, SynError> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, SynError> {
        figment.extract().map_err(|e| SynError::ConfigError(e.to_string()))
    }
}
