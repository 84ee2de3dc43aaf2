//! AVT CLI Library
//!
//! Shared functionality for AVT command-line tools.

pub mod config;
pub mod send;
pub mod stats;

pub use config::{Config, ConfigError, OutputConfig, StreamConfig, TagMode};
pub use send::{send_all, SendError, SendSummary};
pub use stats::{describe, display_input_stats, format_bandwidth, format_bytes};
