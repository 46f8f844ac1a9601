//! # Core Error Module
//!
//! This module defines the central `SynError` type used throughout the library.
//! It leverages `thiserror` for error message formatting and `serde` for serialization.
//!
//! Only [`SynError::ConfigError`] is ever handed back to application code. The
//! remaining variants describe failures on the logging path; they are consumed
//! by the pipeline and surface only as counters in
//! [`crate::loggers::stats::StatsSnapshot`].

use serde::Serialize;
use thiserror::Error;

/// Central error type for the `synlogger` library.
#[derive(Debug, Error, Serialize, Clone, PartialEq)]
pub enum SynError {
    /// Missing or invalid setup: endpoint, backend variant, level, queue sizes.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A record was rejected before delivery (below the minimum level or
    /// vetoed by a filter function).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Connecting to or writing to the collector failed.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A host metric could not be queried.
    #[error("Probe error: {0}")]
    ProbeError(String),

    /// Error related to internal logic or state.
    #[error("Internal error: {0}")]
    InternalError(String),
}
