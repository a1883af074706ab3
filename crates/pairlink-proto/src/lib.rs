//! Wire protocol for the pairlink signaling relay.
//!
//! Messages are tagged JSON objects exchanged over a WebSocket. Inbound
//! requests ([`ClientRequest`]) and outbound notifications ([`ServerMessage`])
//! are separate enums: the relay never echoes a request back, and clients
//! never see each other's request shapes.
//!
//! Signaling payloads (`offer`/`answer`/`ice-candidate` bodies) are opaque
//! [`serde_json::Value`]s relayed verbatim. The relay does not parse,
//! validate, or buffer them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod ids;
mod match_key;
mod message;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, Identity, RoomId};
pub use match_key::{MatchKey, Stance};
pub use message::{ClientRequest, ServerMessage, SignalKind};

/// Decode a client request from its JSON wire form.
pub fn decode_request(text: &str) -> Result<ClientRequest, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Encode a server message into its JSON wire form.
pub fn encode_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}
