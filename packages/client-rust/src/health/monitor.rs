//! Background probing of unhealthy addresses.

use std::sync::Arc;
use std::time::Duration;

use courier_core::Address;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::failure_counting::FailureCountingHealthCheck;
use crate::config::HealthCheckConfig;
use crate::traits::HealthCheckService;

/// Periodically tries to connect to every unhealthy address and clears the
/// ones that accept a connection.
pub struct HealthMonitor {
    health: Arc<FailureCountingHealthCheck>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(health: Arc<FailureCountingHealthCheck>, config: HealthCheckConfig) -> Self {
        Self { health, config }
    }

    /// Starts the probe loop; it exits when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("health monitor stopped");
                    return;
                }
                _ = interval.tick() => {
                    self.probe_unhealthy().await;
                }
            }
        }
    }

    /// Probes all unhealthy addresses concurrently. Returns how many recovered.
    pub async fn probe_unhealthy(&self) -> usize {
        let timeout = self.config.probe_timeout;
        let probes = self
            .health
            .unhealthy_addresses()
            .into_iter()
            .map(|address| async move {
                let reachable = probe(&address, timeout).await;
                (address, reachable)
            });

        let mut recovered = 0;
        for (address, reachable) in futures_util::future::join_all(probes).await {
            if reachable && self.health.mark_success(&address).await.is_ok() {
                info!(%address, "unhealthy address is reachable again");
                recovered += 1;
            }
        }
        recovered
    }
}

/// `true` if a TCP connection to `address` opens within `timeout`.
async fn probe(address: &Address, timeout: Duration) -> bool {
    let connect = TcpStream::connect((address.host.as_str(), address.port));
    matches!(tokio::time::timeout(timeout, connect).await, Ok(Ok(_)))
}
