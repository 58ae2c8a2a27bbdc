use kaunwho_protocol::ProtocolError;

use crate::PeerId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening an outbound connection failed.
    #[error("dial {addr} failed: {source}")]
    DialFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A configured socket address did not parse.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// The session hello was malformed or refused.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A sealed frame failed authentication.
    #[error("frame failed to decrypt")]
    Decrypt,

    /// An operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The peer has not been discovered.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// Encoding or decoding a frame failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
