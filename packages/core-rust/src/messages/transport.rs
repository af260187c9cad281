//! Wire envelope exchanged between a transport client and a remote endpoint.

use serde::{Deserialize, Serialize};

use super::invoke::{InvokeMessage, ResultMessage};

/// A framed message on the wire.
///
/// Internally tagged by `type`; the payload is nested under a `payload` key.
/// Every request carries a client-assigned `id` that the matching response
/// echoes back, so several calls can share one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportMessage {
    #[serde(rename = "INVOKE")]
    Invoke { id: u64, payload: InvokeMessage },

    #[serde(rename = "RESULT")]
    Result { id: u64, payload: ResultMessage },
}

impl TransportMessage {
    /// Correlation id of this message.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Invoke { id, .. } | Self::Result { id, .. } => *id,
        }
    }

    /// Short variant name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoke { .. } => "INVOKE",
            Self::Result { .. } => "RESULT",
        }
    }
}
