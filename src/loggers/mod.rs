// src/loggers/mod.rs

pub mod builder;
pub mod core;
pub mod format;
pub mod probe;
pub mod stats;
pub mod sysmetric;
pub mod worker;
pub mod transports;

pub use builder::{Enqueue, Logger, LoggerBuilder, LoggerConfiguration};
pub use core::{Category, Fields, LogRecord, MetricSample, Severity, TrackingContext};
pub use sysmetric::{LifecycleState, SysmetricLogger, TrackingStatus};
pub use transports::{BackendVariant, CaptureSink, DeliveryMode, FrameDelimiter};

#[macro_export]
macro_rules! log_base {
    // No kv pairs
    ($logger:expr, $level:expr, $msg:expr) => {
        $crate::log_base!($logger, $level, $msg, )
    };
    // With kv pairs (zero or more)
    ($logger:expr, $level:expr, $msg:expr, $( $k:expr => $v:expr ),* $(,)? ) => {
        {
            let logger = &$logger;
            let level = $level;
            // Fields are only built for records that pass the level gate
            if logger.enabled(level) {
                #[allow(unused_mut)]
                let mut ctx = $crate::loggers::core::Fields::new();
                $(
                    ctx.insert($k.to_string(), $crate::loggers::core::to_field_value(&$v));
                )*
                let msg: &str = &$msg;
                logger.log(level, msg, ctx)
            } else {
                logger.log(level, "", $crate::loggers::core::Fields::new())
            }
        }
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $msg:expr $(, $k:expr => $v:expr )* $(,)? ) => {
        $crate::log_base!($logger, $crate::loggers::core::Severity::Debug, $msg $(, $k => $v )* )
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $msg:expr $(, $k:expr => $v:expr )* $(,)? ) => {
        $crate::log_base!($logger, $crate::loggers::core::Severity::Info, $msg $(, $k => $v )* )
    };
}

#[macro_export]
macro_rules! warning {
    ($logger:expr, $msg:expr $(, $k:expr => $v:expr )* $(,)? ) => {
        $crate::log_base!($logger, $crate::loggers::core::Severity::Warning, $msg $(, $k => $v )* )
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $msg:expr $(, $k:expr => $v:expr )* $(,)? ) => {
        $crate::log_base!($logger, $crate::loggers::core::Severity::Error, $msg $(, $k => $v )* )
    };
}

#[macro_export]
macro_rules! critical {
    ($logger:expr, $msg:expr $(, $k:expr => $v:expr )* $(,)? ) => {
        $crate::log_base!($logger, $crate::loggers::core::Severity::Critical, $msg $(, $k => $v )* )
    };
}
