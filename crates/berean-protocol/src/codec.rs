//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The protocol layer doesn't care how messages become bytes — it only
//! needs something implementing [`Codec`]. [`JsonCodec`] is the provided
//! implementation (human-readable, trivially consumed by browser clients);
//! a binary codec can slot in later without touching any other layer.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust types to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the codec is shared by every
/// connection-handler task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientRequest, Envelope, PROTOCOL_VERSION};

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec;
        let envelope = Envelope {
            seq: 1,
            timestamp: 42,
            payload: ClientRequest::Hello { version: PROTOCOL_VERSION },
        };

        let bytes = codec.encode(&envelope).unwrap();
        let decoded: Envelope<ClientRequest> = codec.decode(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_json_codec_decode_wrong_shape_errors() {
        let codec = JsonCodec;
        let result: Result<Envelope<ClientRequest>, _> =
            codec.decode(br#"{"name": "hello"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
