//! Message schemas for the Courier protocol.
//!
//! - [`invoke`]: call payloads (`InvokeMessage`) and outcomes (`ResultMessage`)
//! - [`transport`]: the id-correlated wire envelope
//!
//! All types use named `MsgPack` serialization (`rmp_serde::to_vec_named()`)
//! with camelCase field names.

pub mod invoke;
pub mod transport;

pub use invoke::{InvokeMessage, Parameters, ResultMessage, STATUS_INTERNAL_ERROR, STATUS_OK};
pub use transport::TransportMessage;
