use std::sync::Arc;

use courier_core::Endpoint;
use dashmap::DashMap;

use super::tcp::TcpTransportClient;
use crate::config::TransportConfig;
use crate::traits::{TransportClient, TransportClientFactory};

/// Hands out one shared [`TcpTransportClient`] per endpoint.
///
/// Clients are created on first use and kept until evicted; a client whose
/// connection broke reconnects on its next send.
#[derive(Debug)]
pub struct TcpTransportClientFactory {
    config: TransportConfig,
    clients: DashMap<Endpoint, Arc<TcpTransportClient>>,
}

impl TcpTransportClientFactory {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drops the cached client for `endpoint`, closing its connection once
    /// in-flight calls release it.
    pub fn evict(&self, endpoint: &Endpoint) -> bool {
        self.clients.remove(endpoint).is_some()
    }
}

impl Default for TcpTransportClientFactory {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl TransportClientFactory for TcpTransportClientFactory {
    fn create_client(&self, endpoint: &Endpoint) -> Arc<dyn TransportClient> {
        self.clients
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(TcpTransportClient::new(endpoint.clone(), self.config.clone()))
            })
            .clone()
    }
}
