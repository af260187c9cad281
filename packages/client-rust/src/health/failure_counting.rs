//! Consecutive-failure health tracking.
//!
//! An address becomes unhealthy after `failure_threshold` consecutive failure
//! reports and is offered traffic again once `recovery_interval` has passed
//! since its last failure, or as soon as a success is recorded.

use async_trait::async_trait;
use courier_core::Address;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::HealthCheckConfig;
use crate::traits::HealthCheckService;

/// Per-address failure tracking state.
#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    /// Consecutive failures since the last success.
    failures: u32,
    /// When the most recent failure was reported.
    last_failure: Instant,
}

/// [`HealthCheckService`] backed by a lock-free map of failure counters.
#[derive(Debug)]
pub struct FailureCountingHealthCheck {
    config: HealthCheckConfig,
    entries: DashMap<Address, HealthEntry>,
}

impl FailureCountingHealthCheck {
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Consecutive failures currently recorded for `address`.
    #[must_use]
    pub fn failure_count(&self, address: &Address) -> u32 {
        self.entries.get(address).map_or(0, |e| e.failures)
    }

    /// Addresses at or above the failure threshold, regardless of recovery.
    #[must_use]
    pub fn unhealthy_addresses(&self) -> Vec<Address> {
        self.entries
            .iter()
            .filter(|e| e.value().failures >= self.config.failure_threshold)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Forgets everything known about `address`.
    pub fn remove(&self, address: &Address) {
        self.entries.remove(address);
    }

    /// Forgets all addresses.
    pub fn reset(&self) {
        self.entries.clear();
    }

    fn is_healthy_at(&self, address: &Address, now: Instant) -> bool {
        let Some(entry) = self.entries.get(address) else {
            return true;
        };
        entry.failures < self.config.failure_threshold
            || now.saturating_duration_since(entry.last_failure) >= self.config.recovery_interval
    }
}

impl Default for FailureCountingHealthCheck {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

#[async_trait]
impl HealthCheckService for FailureCountingHealthCheck {
    async fn mark_failure(&self, address: &Address) -> anyhow::Result<()> {
        let now = Instant::now();
        let failures = {
            let mut entry = self.entries.entry(address.clone()).or_insert(HealthEntry {
                failures: 0,
                last_failure: now,
            });
            entry.failures = entry.failures.saturating_add(1);
            entry.last_failure = now;
            entry.failures
        };

        if failures == self.config.failure_threshold {
            warn!(%address, failures, "address marked unhealthy");
        } else {
            debug!(%address, failures, "address failure recorded");
        }
        Ok(())
    }

    async fn mark_success(&self, address: &Address) -> anyhow::Result<()> {
        if self.entries.remove(address).is_some() {
            debug!(%address, "address recovered");
        }
        Ok(())
    }

    async fn is_healthy(&self, address: &Address) -> bool {
        self.is_healthy_at(address, Instant::now())
    }
}
