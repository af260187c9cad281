//! Client configuration types.

use std::time::Duration;

use courier_core::MAX_FRAME_LENGTH;

/// Top-level configuration for the reference collaborators.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// TCP transport settings.
    pub transport: TransportConfig,
    /// Failure counting and probing settings.
    pub health: HealthCheckConfig,
    /// Address selection strategy for the static resolver.
    pub selector: SelectorMode,
}

/// TCP transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,
    /// Largest accepted frame in bytes, in either direction.
    pub max_frame_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// Health check settings.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Consecutive failures after which an address is unhealthy.
    pub failure_threshold: u32,
    /// Time after the last failure at which an unhealthy address is offered
    /// traffic again.
    pub recovery_interval: Duration,
    /// Interval between background probes of unhealthy addresses.
    pub probe_interval: Duration,
    /// Connect timeout for a single probe.
    pub probe_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_interval: Duration::from_secs(30),
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// How the static resolver picks among healthy candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorMode {
    /// Round robin per service.
    #[default]
    Polling,
    /// Uniformly random.
    Random,
    /// Routing key modulo candidate count; equal keys pick the same address
    /// while the candidate list is unchanged.
    Hash,
}
