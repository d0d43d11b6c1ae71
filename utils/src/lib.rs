//! Shared utilities for forge.

pub mod logging;
pub mod stats;
pub mod time;

pub use logging::{init_test_tracing, init_tracing};
pub use stats::StatsCounter;
pub use time::format_duration;
