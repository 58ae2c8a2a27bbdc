//! Wire protocol for KaunWho.
//!
//! This crate defines what two peers say to each other:
//!
//! - **Types** ([`Envelope`], [`MessageType`]): the single message unit
//!   that crosses the peer session. Every envelope is built for one
//!   transmission and discarded after the receiver applies it.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`BincodeCodec`],
//!   [`WireFormat`]): how envelopes and their payloads become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer is a leaf. It knows nothing about sockets, peers or
//! game rules; the payload of an envelope is opaque bytes that only the
//! game layer interprets.
//!
//! ```text
//! Game session ──encode──▶ Envelope { type, data, timestamp } ──codec──▶ bytes
//! ```

mod codec;
mod error;
mod types;

pub use codec::{BincodeCodec, Codec, JsonCodec, WireFormat};
pub use error::ProtocolError;
pub use types::{Envelope, MessageType, unix_millis};

/// Protocol version exchanged in the session hello. Peers running a
/// different version refuse the session.
pub const PROTOCOL_VERSION: u32 = 1;
