use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Address, Endpoint, InvocationContext, InvokeMessage, ResultMessage};
use tokio_util::sync::CancellationToken;

use crate::error::{InvokeError, TransportError};

/// Maps a service id and routing key to a concrete address.
/// Implementations own load balancing, replication, and health filtering.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve an address for `service_id`.
    ///
    /// `Ok(None)` means no usable address exists; it is not an error.
    async fn resolve(&self, service_id: &str, routing_key: u32) -> anyhow::Result<Option<Address>>;
}

/// Produces transport clients bound to an endpoint.
/// Expected to be cheap; implementations pool or cache clients per endpoint.
pub trait TransportClientFactory: Send + Sync {
    /// Returns a client for `endpoint`.
    fn create_client(&self, endpoint: &Endpoint) -> Arc<dyn TransportClient>;
}

/// Sends invoke messages to one endpoint.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Send `message` and wait for its result.
    ///
    /// `cancel` fires when the caller stopped waiting. Implementations may
    /// observe it to release per-call resources early; the caller does not
    /// wait for them to do so.
    async fn send(
        &self,
        message: InvokeMessage,
        cancel: &CancellationToken,
    ) -> Result<ResultMessage, TransportError>;
}

/// Tracks address health from reported call failures.
#[async_trait]
pub trait HealthCheckService: Send + Sync {
    /// Record a failed call against `address`.
    async fn mark_failure(&self, address: &Address) -> anyhow::Result<()>;

    /// Record a successful interaction with `address`.
    async fn mark_success(&self, _address: &Address) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns `true` if `address` should receive traffic.
    async fn is_healthy(&self, address: &Address) -> bool;
}

/// Caller-facing invocation surface.
/// Implemented by [`InvokeDispatcher`](crate::dispatcher::InvokeDispatcher);
/// callers depend on this trait so they can substitute a fake.
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    /// Invoke without a bound: waits until the transport completes or fails.
    async fn invoke(&self, context: &InvocationContext) -> Result<ResultMessage, InvokeError>;

    /// Invoke, giving up when `cancel` fires.
    async fn invoke_with_cancellation(
        &self,
        context: &InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<ResultMessage, InvokeError>;

    /// Invoke, giving up after `timeout`.
    async fn invoke_with_timeout(
        &self,
        context: &InvocationContext,
        timeout: Duration,
    ) -> Result<ResultMessage, InvokeError>;
}
