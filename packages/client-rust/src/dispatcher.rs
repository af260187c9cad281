//! Invocation dispatcher: turns one logical call into one network attempt.
//!
//! For every call the dispatcher re-resolves an address, binds the address
//! token onto a fresh outbound message, sends it through a client for the
//! address's endpoint, and races the whole attempt against the caller's
//! cancellation token or timeout. Communication faults are reported to the
//! health service before they are returned; other faults are only logged.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{routing_key, Address, InvocationContext, InvokeMessage, ResultMessage};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::error::{FaultKind, InvokeError, TransportError};
use crate::traits::{AddressResolver, HealthCheckService, RemoteInvoker, TransportClientFactory};

// ---------------------------------------------------------------------------
// Bound
// ---------------------------------------------------------------------------

/// What an attempt is raced against.
enum Bound<'a> {
    /// Caller-owned token; also handed to the transport.
    Cancel(&'a CancellationToken),
    /// Deadline derived from a timeout. `token` is handed to the transport and
    /// cancelled when the deadline wins.
    Deadline {
        deadline: Instant,
        timeout_ms: u64,
        token: CancellationToken,
    },
}

impl Bound<'_> {
    fn token(&self) -> &CancellationToken {
        match self {
            Self::Cancel(token) => *token,
            Self::Deadline { token, .. } => token,
        }
    }

    /// Runs `fut` until it completes or the bound fires, whichever is first.
    /// The losing future is dropped, never awaited.
    async fn race<F: Future>(&self, fut: F) -> Result<F::Output, InvokeError> {
        match self {
            Self::Cancel(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(InvokeError::Cancelled),
                out = fut => Ok(out),
            },
            Self::Deadline {
                deadline,
                timeout_ms,
                token,
            } => tokio::select! {
                biased;
                () = tokio::time::sleep_until(*deadline) => {
                    token.cancel();
                    Err(InvokeError::TimedOut { timeout_ms: *timeout_ms })
                }
                out = fut => Ok(out),
            },
        }
    }
}

/// Why a bounded attempt did not produce a result.
enum AttemptError {
    /// Failed before anything was sent.
    Invoke(InvokeError),
    /// The transport failed while talking to `address`.
    Transport {
        address: Address,
        fault: TransportError,
    },
}

// ---------------------------------------------------------------------------
// InvokeDispatcher
// ---------------------------------------------------------------------------

/// Orchestrates address resolution, transport, and failure attribution for
/// single call attempts.
///
/// Holds no per-call state: concurrent invocations share only the injected
/// collaborators.
#[derive(Clone)]
pub struct InvokeDispatcher {
    resolver: Arc<dyn AddressResolver>,
    clients: Arc<dyn TransportClientFactory>,
    health: Arc<dyn HealthCheckService>,
}

impl InvokeDispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        clients: Arc<dyn TransportClientFactory>,
        health: Arc<dyn HealthCheckService>,
    ) -> Self {
        Self {
            resolver,
            clients,
            health,
        }
    }

    /// Checks the context and returns its message.
    fn validate(context: &InvocationContext) -> Result<&InvokeMessage, InvokeError> {
        let message = context
            .invoke_message
            .as_ref()
            .ok_or(InvokeError::InvalidArgument {
                field: "invoke_message",
                reason: "an invoke message is required",
            })?;
        if message.service_id.is_empty() {
            return Err(InvokeError::InvalidArgument {
                field: "invoke_message.service_id",
                reason: "service id must not be empty",
            });
        }
        Ok(message)
    }

    /// Validates, runs the bounded attempt, and attributes transport faults.
    async fn dispatch(
        &self,
        context: &InvocationContext,
        bound: Bound<'_>,
    ) -> Result<ResultMessage, InvokeError> {
        let message = Self::validate(context)?;

        let span = info_span!(
            "invoke",
            service_id = %message.service_id,
            routing_key = tracing::field::Empty,
            endpoint = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = match bound.race(self.attempt(message, bound.token())).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(AttemptError::Invoke(err))) | Err(err) => Err(err),
                Ok(Err(AttemptError::Transport { address, fault })) => {
                    Err(self.attribute(&message.service_id, &address, fault).await)
                }
            };
            record_outcome(&result, start.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    /// Resolves an address and sends the message to it.
    async fn attempt(
        &self,
        message: &InvokeMessage,
        cancel: &CancellationToken,
    ) -> Result<ResultMessage, AttemptError> {
        let address = self.resolve(message).await.map_err(AttemptError::Invoke)?;

        let endpoint = address.create_endpoint();
        let outbound = message.with_token(address.token.clone());
        tracing::Span::current().record("endpoint", tracing::field::display(&endpoint));
        debug!(%endpoint, service_id = %message.service_id, "invoking remote service");

        let client = self.clients.create_client(&endpoint);
        client
            .send(outbound, cancel)
            .await
            .map_err(|fault| AttemptError::Transport { address, fault })
    }

    async fn resolve(&self, message: &InvokeMessage) -> Result<Address, InvokeError> {
        let key = routing_key(&message.parameters);
        tracing::Span::current().record("routing_key", key);

        match self.resolver.resolve(&message.service_id, key).await {
            Ok(Some(address)) => Ok(address),
            Ok(None) => Err(InvokeError::AddressResolutionFailed {
                service_id: message.service_id.clone(),
            }),
            Err(source) => Err(InvokeError::Resolver {
                service_id: message.service_id.clone(),
                source,
            }),
        }
    }

    /// Reports communication faults against `address`, logs everything else.
    async fn attribute(
        &self,
        service_id: &str,
        address: &Address,
        fault: TransportError,
    ) -> InvokeError {
        match fault.kind() {
            FaultKind::Communication => {
                warn!(%address, service_id, error = %fault, "communication fault, marking address as failed");
                match self.health.mark_failure(address).await {
                    Ok(()) => InvokeError::Transport(fault),
                    Err(report_error) => {
                        error!(%address, service_id, error = %report_error, "failed to report address failure");
                        InvokeError::HealthReportFailed {
                            fault,
                            report_error,
                        }
                    }
                }
            }
            FaultKind::Other => {
                error!(service_id, error = %fault, "error while invoking remote service");
                InvokeError::Transport(fault)
            }
        }
    }
}

impl std::fmt::Debug for InvokeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeDispatcher").finish_non_exhaustive()
    }
}

/// Records duration and outcome on the current span and in the metrics facade.
fn record_outcome(result: &Result<ResultMessage, InvokeError>, elapsed: Duration) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.outcome(),
    };

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = elapsed.as_millis() as u64;
    let span = tracing::Span::current();
    span.record("duration_ms", duration_ms);
    span.record("outcome", outcome);

    metrics::counter!("courier_invocations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("courier_invocation_duration_seconds").record(elapsed.as_secs_f64());
}

#[async_trait]
impl RemoteInvoker for InvokeDispatcher {
    async fn invoke(&self, context: &InvocationContext) -> Result<ResultMessage, InvokeError> {
        let never = CancellationToken::new();
        self.dispatch(context, Bound::Cancel(&never)).await
    }

    async fn invoke_with_cancellation(
        &self,
        context: &InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<ResultMessage, InvokeError> {
        self.dispatch(context, Bound::Cancel(cancel)).await
    }

    async fn invoke_with_timeout(
        &self,
        context: &InvocationContext,
        timeout: Duration,
    ) -> Result<ResultMessage, InvokeError> {
        if timeout.is_zero() {
            return Err(InvokeError::InvalidArgument {
                field: "timeout",
                reason: "timeout must be greater than zero",
            });
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            debug!(?timeout, "timeout exceeds the clock range, invoking without a deadline");
            let never = CancellationToken::new();
            return self.dispatch(context, Bound::Cancel(&never)).await;
        };
        let bound = Bound::Deadline {
            deadline,
            timeout_ms: whole_millis_rounded_up(timeout),
            token: CancellationToken::new(),
        };
        self.dispatch(context, bound).await
    }
}

/// Milliseconds in `timeout`, rounded up so that a sub-millisecond timeout
/// never reports as `0ms`.
fn whole_millis_rounded_up(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
