//! Invoke and result payloads.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are encoded with
//! `rmp_serde::to_vec_named()` so field names travel on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named call parameters.
///
/// Ordered by name so that equal parameter sets iterate, encode, and hash
/// identically.
pub type Parameters = BTreeMap<String, rmpv::Value>;

/// Status code carried by a successful [`ResultMessage`].
pub const STATUS_OK: i32 = 200;

/// Status code used when the remote side failed to execute the call.
pub const STATUS_INTERNAL_ERROR: i32 = 500;

// ---------------------------------------------------------------------------
// InvokeMessage
// ---------------------------------------------------------------------------

/// Payload of one remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeMessage {
    /// Logical service identifier. Must be non-empty to be dispatched.
    pub service_id: String,
    /// Optional discriminator between several implementations of one service.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service_key: Option<String>,
    /// Call arguments; also the input of the routing key.
    #[serde(default)]
    pub parameters: Parameters,
    /// Out-of-band values propagated with the call (trace ids, tenant, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub attachments: Parameters,
    /// Per-address auth/session token, bound by the dispatcher after address
    /// resolution.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<String>,
}

impl InvokeMessage {
    /// Creates a message for `service_id` with the given parameters.
    pub fn new(service_id: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            service_id: service_id.into(),
            service_key: None,
            parameters,
            attachments: Parameters::new(),
            token: None,
        }
    }

    /// Sets the service key.
    #[must_use]
    pub fn with_service_key(mut self, service_key: impl Into<String>) -> Self {
        self.service_key = Some(service_key.into());
        self
    }

    /// Adds a single parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<rmpv::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds a single attachment.
    #[must_use]
    pub fn with_attachment(mut self, name: impl Into<String>, value: impl Into<rmpv::Value>) -> Self {
        self.attachments.insert(name.into(), value.into());
        self
    }

    /// Returns a copy of this message bound to `token`.
    ///
    /// The receiver is left untouched, so one message may be dispatched by
    /// several concurrent invocations.
    #[must_use]
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// ResultMessage
// ---------------------------------------------------------------------------

fn nil() -> rmpv::Value {
    rmpv::Value::Nil
}

/// Outcome of a completed remote call as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    /// Returned value; `Nil` when the call returned nothing.
    #[serde(skip_serializing_if = "rmpv::Value::is_nil", default = "nil")]
    pub result: rmpv::Value,
    /// Remote failure description, if the call failed remotely.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception_message: Option<String>,
    /// HTTP-like status code.
    pub status_code: i32,
}

impl ResultMessage {
    /// A successful result carrying `value`.
    pub fn ok(value: impl Into<rmpv::Value>) -> Self {
        Self {
            result: value.into(),
            exception_message: None,
            status_code: STATUS_OK,
        }
    }

    /// A remote failure with the given status code and message.
    pub fn failure(status_code: i32, message: impl Into<String>) -> Self {
        Self {
            result: rmpv::Value::Nil,
            exception_message: Some(message.into()),
            status_code,
        }
    }

    /// `true` when the remote side reported no exception.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exception_message.is_none()
    }
}
