//! `MsgPack` encoding of [`TransportMessage`] frames.
//!
//! Framing (length prefixes) is the transport's job; this module only turns a
//! message into frame bytes and back.

use bytes::Bytes;

use crate::messages::TransportMessage;

/// Default upper bound for a single frame (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Errors from encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a message as a named `MsgPack` frame body.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_frame(message: &TransportMessage) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(message)?))
}

/// Decodes a frame body produced by [`encode_frame`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid message.
pub fn decode_frame(frame: &[u8]) -> Result<TransportMessage, CodecError> {
    Ok(rmp_serde::from_slice(frame)?)
}

#[cfg(test)]
mod tests {
    use rmpv::Value;

    use super::*;
    use crate::messages::{InvokeMessage, Parameters, ResultMessage};

    #[test]
    fn invoke_frame_survives_encoding() {
        let msg = TransportMessage::Invoke {
            id: 42,
            payload: InvokeMessage::new("OrderService", Parameters::new())
                .with_parameter("orderId", 42)
                .with_token(Some("abc".to_string())),
        };

        let frame = encode_frame(&msg).unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn result_frame_keeps_nested_values() {
        let value = Value::Map(vec![(Value::from("status"), Value::from("OK"))]);
        let msg = TransportMessage::Result {
            id: 1,
            payload: ResultMessage::ok(value),
        };

        let frame = encode_frame(&msg).unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_frame(&[0xc1, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
