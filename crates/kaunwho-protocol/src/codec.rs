//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Nothing above this module cares HOW a value is serialized; it only
//! needs something that implements [`Codec`].
//!
//! Two codecs ship:
//!
//! - [`BincodeCodec`]: compact binary, the default on the wire.
//! - [`JsonCodec`]: human-readable, handy when inspecting traffic.
//!
//! [`WireFormat`] picks one of them at runtime from configuration.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-running tokio
/// tasks and are shared between them.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns an encode variant of [`ProtocolError`] if serialization
    /// fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns a decode variant of [`ProtocolError`] if the bytes are
    /// malformed, truncated, or don't describe a `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use kaunwho_protocol::{Codec, Envelope, JsonCodec, MessageType};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::signal(MessageType::GameOver);
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::JsonEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::JsonDecode)
    }
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses bincode.
///
/// Bincode is not self-describing: the reader must know the exact type,
/// and internally tagged serde enums are not supported. Every wire type in
/// KaunWho sticks to plain structs and unit or externally tagged enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value).map_err(ProtocolError::BincodeEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        bincode::deserialize(data).map_err(ProtocolError::BincodeDecode)
    }
}

// ---------------------------------------------------------------------------
// WireFormat
// ---------------------------------------------------------------------------

/// Runtime choice of codec, as it appears in configuration files
/// (`wire_format = "bincode"`).
///
/// Both peers must agree; a mismatch shows up as decode errors that the
/// receiver logs and drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Bincode,
    Json,
}

impl Codec for WireFormat {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Bincode => BincodeCodec.encode(value),
            Self::Json => JsonCodec.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        match self {
            Self::Bincode => BincodeCodec.decode(data),
            Self::Json => JsonCodec.decode(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, MessageType};

    fn sample() -> Envelope {
        Envelope {
            kind: MessageType::GameStateUpdate,
            data: Some(vec![1, 2, 3, 250]),
            timestamp: 99,
        }
    }

    #[test]
    fn test_json_codec_encodes_readable_text() {
        let bytes = JsonCodec.encode(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"type\":\"game_state\""));
    }

    #[test]
    fn test_bincode_codec_is_smaller_than_json() {
        let json = JsonCodec.encode(&sample()).unwrap();
        let bin = BincodeCodec.encode(&sample()).unwrap();
        assert!(bin.len() < json.len());
    }

    #[test]
    fn test_wire_format_default_is_bincode() {
        assert_eq!(WireFormat::default(), WireFormat::Bincode);
    }

    #[test]
    fn test_wire_format_dispatches_to_matching_codec() {
        let via_format = WireFormat::Json.encode(&sample()).unwrap();
        let direct = JsonCodec.encode(&sample()).unwrap();
        assert_eq!(via_format, direct);

        let decoded: Envelope = WireFormat::Bincode
            .decode(&BincodeCodec.encode(&sample()).unwrap())
            .unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_wire_format_reads_snake_case_names() {
        let format: WireFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, WireFormat::Json);
    }

    #[test]
    fn test_bincode_decode_truncated_returns_error() {
        let bytes = BincodeCodec.encode(&sample()).unwrap();
        let result: Result<Envelope, _> = BincodeCodec.decode(&bytes[..3]);
        assert!(matches!(result, Err(ProtocolError::BincodeDecode(_))));
    }

    #[test]
    fn test_json_bytes_fed_to_bincode_fail_to_decode() {
        let bytes = JsonCodec.encode(&sample()).unwrap();
        let result: Result<Envelope, _> = BincodeCodec.decode(&bytes);
        assert!(result.is_err());
    }
}
