//! Error taxonomy for invocations and transports.

use std::io;

/// Failure class of a [`TransportError`].
///
/// The dispatcher branches on this discriminant alone: only
/// [`FaultKind::Communication`] is attributed to the resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The endpoint is unreachable, reset, or the connection broke.
    Communication,
    /// Anything else: codec, remote exception, protocol violation, ...
    Other,
}

/// Errors returned by a [`TransportClient`](crate::traits::TransportClient).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {endpoint} closed before a response arrived")]
    ConnectionClosed { endpoint: String },
    #[error("i/o error on connection to {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("codec error: {0}")]
    Codec(#[from] courier_core::CodecError),
    #[error("remote call failed with status {status_code}: {message}")]
    Remote { status_code: i32, message: String },
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("send cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Classifies this error for failure attribution.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Connect { .. } | Self::ConnectionClosed { .. } | Self::Io { .. } => {
                FaultKind::Communication
            }
            Self::Codec(_)
            | Self::Remote { .. }
            | Self::Protocol(_)
            | Self::Cancelled
            | Self::Other(_) => FaultKind::Other,
        }
    }

    /// Shorthand for `kind() == FaultKind::Communication`.
    #[must_use]
    pub fn is_communication(&self) -> bool {
        self.kind() == FaultKind::Communication
    }
}

/// Errors returned by the invocation dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Caller misuse, detected before any I/O.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: &'static str,
    },
    /// The resolver found no usable address.
    #[error("unable to resolve an address for service `{service_id}`")]
    AddressResolutionFailed { service_id: String },
    /// The resolver itself failed.
    #[error("address resolver failed for service `{service_id}`: {source}")]
    Resolver {
        service_id: String,
        #[source]
        source: anyhow::Error,
    },
    /// The transport failed; passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A communication fault occurred and reporting it to the health service
    /// failed as well. `fault` is the original transport error.
    #[error("health report failed after communication fault: {report_error}")]
    HealthReportFailed {
        #[source]
        fault: TransportError,
        report_error: anyhow::Error,
    },
    /// The caller's cancellation token fired first.
    #[error("invocation cancelled")]
    Cancelled,
    /// The caller's timeout elapsed first.
    #[error("invocation timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl InvokeError {
    /// `true` for the cancelled and timed-out outcomes.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut { .. })
    }

    /// The transport error behind this failure, if any.
    #[must_use]
    pub fn transport_fault(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(fault) | Self::HealthReportFailed { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Short outcome label for logs and metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::AddressResolutionFailed { .. } | Self::Resolver { .. } => "unresolved",
            Self::Transport(fault) | Self::HealthReportFailed { fault, .. } => match fault.kind() {
                FaultKind::Communication => "communication_fault",
                FaultKind::Other => "fault",
            },
            Self::Cancelled => "cancelled",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}
