pub mod core;
pub mod configs;
pub mod loggers;

pub use core::error::SynError;
pub use configs::LoggerSettings;
pub use loggers::{Category, Logger, LoggerBuilder, Severity, SysmetricLogger};
