//! Static route-table address resolution.
//!
//! Routes are held in an `ArcSwap`ed table so that updates are lock-free and
//! visible to the next resolution. Candidates are filtered through the
//! injected health service before a [`SelectorMode`] picks one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use courier_core::Address;
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;

use crate::config::SelectorMode;
use crate::traits::{AddressResolver, HealthCheckService};

/// Service id -> candidate addresses.
pub type RouteTable = HashMap<String, Arc<Vec<Address>>>;

/// [`AddressResolver`] over an in-memory route table.
pub struct StaticAddressResolver {
    routes: ArcSwap<RouteTable>,
    health: Arc<dyn HealthCheckService>,
    mode: SelectorMode,
    /// Round-robin cursor per service id.
    cursors: DashMap<String, AtomicUsize>,
}

impl StaticAddressResolver {
    /// Creates a resolver with an empty route table.
    #[must_use]
    pub fn new(health: Arc<dyn HealthCheckService>, mode: SelectorMode) -> Self {
        Self {
            routes: ArcSwap::from_pointee(RouteTable::new()),
            health,
            mode,
            cursors: DashMap::new(),
        }
    }

    /// Replaces the whole route table.
    pub fn set_routes(&self, routes: RouteTable) {
        self.routes.store(Arc::new(routes));
    }

    /// Replaces the candidates of one service. An empty list removes it.
    pub fn update_route(&self, service_id: &str, addresses: Vec<Address>) {
        let addresses = Arc::new(addresses);
        self.routes.rcu(|current| {
            let mut next = RouteTable::clone(current);
            if addresses.is_empty() {
                next.remove(service_id);
            } else {
                next.insert(service_id.to_string(), Arc::clone(&addresses));
            }
            next
        });
    }

    /// Candidates currently registered for `service_id`, healthy or not.
    #[must_use]
    pub fn addresses(&self, service_id: &str) -> Vec<Address> {
        self.routes
            .load()
            .get(service_id)
            .map(|a| a.as_ref().clone())
            .unwrap_or_default()
    }

    fn select(&self, service_id: &str, routing_key: u32, candidates: &[Address]) -> Address {
        let index = match self.mode {
            SelectorMode::Polling => {
                let cursor = self
                    .cursors
                    .entry(service_id.to_string())
                    .or_insert_with(|| AtomicUsize::new(0));
                cursor.fetch_add(1, Ordering::Relaxed) % candidates.len()
            }
            SelectorMode::Random => rand::rng().random_range(0..candidates.len()),
            SelectorMode::Hash => routing_key as usize % candidates.len(),
        };
        candidates[index].clone()
    }
}

#[async_trait]
impl AddressResolver for StaticAddressResolver {
    async fn resolve(&self, service_id: &str, routing_key: u32) -> anyhow::Result<Option<Address>> {
        let Some(registered) = self.routes.load().get(service_id).cloned() else {
            debug!(service_id, "no route registered");
            return Ok(None);
        };

        let mut healthy = Vec::with_capacity(registered.len());
        for address in registered.iter() {
            if self.health.is_healthy(address).await {
                healthy.push(address.clone());
            }
        }

        if healthy.is_empty() {
            debug!(service_id, candidates = registered.len(), "no healthy address");
            return Ok(None);
        }
        Ok(Some(self.select(service_id, routing_key, &healthy)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::HealthCheckConfig;
    use crate::health::FailureCountingHealthCheck;

    fn addresses() -> Vec<Address> {
        vec![
            Address::new("10.0.0.1", 5000).with_token("a"),
            Address::new("10.0.0.2", 5000).with_token("b"),
            Address::new("10.0.0.3", 5000).with_token("c"),
        ]
    }

    fn resolver(mode: SelectorMode) -> (StaticAddressResolver, Arc<FailureCountingHealthCheck>) {
        let health = Arc::new(FailureCountingHealthCheck::new(HealthCheckConfig {
            failure_threshold: 1,
            ..HealthCheckConfig::default()
        }));
        let resolver = StaticAddressResolver::new(
            Arc::clone(&health) as Arc<dyn HealthCheckService>,
            mode,
        );
        resolver.update_route("OrderService", addresses());
        (resolver, health)
    }

    #[tokio::test]
    async fn unknown_service_resolves_to_none() {
        let (resolver, _) = resolver(SelectorMode::Polling);
        assert!(resolver.resolve("UserService", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn polling_cycles_through_candidates() {
        let (resolver, _) = resolver(SelectorMode::Polling);

        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(resolver.resolve("OrderService", 0).await.unwrap().unwrap());
        }

        let hosts: Vec<&str> = picked.iter().map(|a| a.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn resolved_address_keeps_its_token() {
        let (resolver, _) = resolver(SelectorMode::Polling);
        let address = resolver.resolve("OrderService", 0).await.unwrap().unwrap();
        assert_eq!(address.token.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn hash_mode_is_stable_for_equal_keys() {
        let (resolver, _) = resolver(SelectorMode::Hash);

        let first = resolver.resolve("OrderService", 12_345).await.unwrap();
        for _ in 0..10 {
            assert_eq!(resolver.resolve("OrderService", 12_345).await.unwrap(), first);
        }
        let all = addresses();
        assert_eq!(first.as_ref(), Some(&all[12_345 % 3]));
    }

    #[tokio::test]
    async fn random_mode_only_returns_candidates() {
        let (resolver, _) = resolver(SelectorMode::Random);
        let known: HashSet<Address> = addresses().into_iter().collect();

        for _ in 0..50 {
            let address = resolver.resolve("OrderService", 0).await.unwrap().unwrap();
            assert!(known.contains(&address));
        }
    }

    #[tokio::test]
    async fn unhealthy_addresses_are_skipped() {
        let (resolver, health) = resolver(SelectorMode::Polling);
        health.mark_failure(&addresses()[0]).await.unwrap();
        health.mark_failure(&addresses()[2]).await.unwrap();

        for _ in 0..5 {
            let address = resolver.resolve("OrderService", 0).await.unwrap().unwrap();
            assert_eq!(address.host, "10.0.0.2");
        }
    }

    #[tokio::test]
    async fn all_unhealthy_resolves_to_none() {
        let (resolver, health) = resolver(SelectorMode::Polling);
        for address in addresses() {
            health.mark_failure(&address).await.unwrap();
        }
        assert!(resolver.resolve("OrderService", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn route_updates_are_visible_to_next_call() {
        let (resolver, _) = resolver(SelectorMode::Polling);

        resolver.update_route("OrderService", vec![Address::new("10.0.0.9", 6000)]);
        let address = resolver.resolve("OrderService", 0).await.unwrap().unwrap();
        assert_eq!(address.host, "10.0.0.9");

        resolver.update_route("OrderService", Vec::new());
        assert!(resolver.resolve("OrderService", 0).await.unwrap().is_none());
        assert!(resolver.addresses("OrderService").is_empty());
    }

    #[tokio::test]
    async fn set_routes_replaces_table() {
        let (resolver, _) = resolver(SelectorMode::Polling);

        let mut table = RouteTable::new();
        table.insert(
            "UserService".to_string(),
            Arc::new(vec![Address::new("10.1.0.1", 7000)]),
        );
        resolver.set_routes(table);

        assert!(resolver.resolve("OrderService", 0).await.unwrap().is_none());
        assert!(resolver.resolve("UserService", 0).await.unwrap().is_some());
    }
}
