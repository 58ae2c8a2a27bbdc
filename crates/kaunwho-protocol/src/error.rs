//! Error types for the protocol layer.
//!
//! Each KaunWho crate defines its own error enum. A `ProtocolError` always
//! means the problem is in turning values into bytes or back, never in
//! networking or game rules.

use crate::MessageType;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("json encode failed: {0}")]
    JsonEncode(serde_json::Error),

    /// JSON deserialization failed: malformed input, missing fields or
    /// wrong types.
    #[error("json decode failed: {0}")]
    JsonDecode(serde_json::Error),

    /// Bincode serialization failed.
    #[error("bincode encode failed: {0}")]
    BincodeEncode(bincode::Error),

    /// Bincode deserialization failed. Bincode is not self-describing, so
    /// this is also what a peer using the other wire format produces.
    #[error("bincode decode failed: {0}")]
    BincodeDecode(bincode::Error),

    /// The envelope was expected to carry a payload but `data` is empty.
    #[error("{0} envelope carries no payload")]
    MissingPayload(MessageType),

    /// The message decoded fine but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
