//! Client module: the reference collaborators assembled from a [`ClientConfig`].
//!
//! `new()` builds one health service, one static resolver filtering through
//! it, one caching TCP client factory, and a dispatcher over all three. Routes
//! are registered through [`ClientModule::resolver`]; the background prober
//! is started separately with [`ClientModule::spawn_health_monitor`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::dispatcher::InvokeDispatcher;
use crate::health::{FailureCountingHealthCheck, HealthMonitor};
use crate::resolver::StaticAddressResolver;
use crate::transport::TcpTransportClientFactory;

/// Owns the shared collaborators of one client.
pub struct ClientModule {
    config: ClientConfig,
    health: Arc<FailureCountingHealthCheck>,
    resolver: Arc<StaticAddressResolver>,
    transports: Arc<TcpTransportClientFactory>,
    dispatcher: InvokeDispatcher,
}

impl ClientModule {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let health = Arc::new(FailureCountingHealthCheck::new(config.health.clone()));
        let resolver = Arc::new(StaticAddressResolver::new(
            Arc::clone(&health) as _,
            config.selector,
        ));
        let transports = Arc::new(TcpTransportClientFactory::new(config.transport.clone()));
        let dispatcher = InvokeDispatcher::new(
            Arc::clone(&resolver) as _,
            Arc::clone(&transports) as _,
            Arc::clone(&health) as _,
        );

        Self {
            config,
            health,
            resolver,
            transports,
            dispatcher,
        }
    }

    /// The configuration this module was built from.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Dispatcher wired to this module's collaborators. Cheap to clone.
    #[must_use]
    pub fn dispatcher(&self) -> InvokeDispatcher {
        self.dispatcher.clone()
    }

    /// Route table shared with the dispatcher.
    #[must_use]
    pub fn resolver(&self) -> Arc<StaticAddressResolver> {
        Arc::clone(&self.resolver)
    }

    /// Health service fed by the dispatcher's failure reports.
    #[must_use]
    pub fn health(&self) -> Arc<FailureCountingHealthCheck> {
        Arc::clone(&self.health)
    }

    #[must_use]
    pub fn transports(&self) -> Arc<TcpTransportClientFactory> {
        Arc::clone(&self.transports)
    }

    /// Starts probing unhealthy addresses until `shutdown` is cancelled.
    pub fn spawn_health_monitor(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        HealthMonitor::new(Arc::clone(&self.health), self.config.health.clone()).spawn(shutdown)
    }
}

impl std::fmt::Debug for ClientModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientModule")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
