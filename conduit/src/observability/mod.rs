//! Logging setup and call spans.

mod logging;

pub use logging::{call_span, default_log_directory, init_logging, LogConfig, LogFormat, LOG_ENV};
