//! Shared utilities for the y'alls earnings core.

pub mod logging;
pub mod stats;

pub use logging::{init_logging, LogFormat, ParseLogFormatError};
pub use stats::StatsCounter;
