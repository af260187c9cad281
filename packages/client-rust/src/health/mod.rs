//! Reference health tracking: failure counters plus an optional background
//! prober.

pub mod failure_counting;
pub mod monitor;

pub use failure_counting::FailureCountingHealthCheck;
pub use monitor::HealthMonitor;
