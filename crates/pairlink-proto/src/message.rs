//! Request and notification message types.
//!
//! Both enums carry a `type` tag on the wire. Field shapes for the paired
//! and relayed notifications are part of the client contract and must stay
//! stable: `start-call`/`reconnect-ready` drive the downstream peer-to-peer
//! negotiation, and the relayed signaling kinds carry `{payload, from}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ids::{ConnectionId, Identity, RoomId},
    match_key::MatchKey,
};

/// Kind of relayed signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// Transport candidate.
    IceCandidate,
}

/// Inbound request from a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
    /// Enter the matchmaking queue (or pair immediately).
    Join {
        /// Matching criterion.
        match_key: MatchKey,
        /// Durable identity to register, if the client wants reconnect
        /// support.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<Identity>,
    },
    /// Ask to be reunited with a specific former peer.
    Reconnect {
        /// The caller's durable identity.
        identity: Identity,
        /// The peer identity the caller wants back.
        target: Identity,
    },
    /// Withdraw this connection's recorded reconnect intent.
    LeaveReconnect,
    /// Relay an offer to the room peer.
    Offer {
        /// Opaque signaling body.
        payload: Value,
    },
    /// Relay an answer to the room peer.
    Answer {
        /// Opaque signaling body.
        payload: Value,
    },
    /// Relay a transport candidate to the room peer.
    IceCandidate {
        /// Opaque signaling body.
        payload: Value,
    },
}

impl ClientRequest {
    /// If this request is a signaling relay, its kind and payload.
    pub fn as_signal(&self) -> Option<(SignalKind, &Value)> {
        match self {
            Self::Offer { payload } => Some((SignalKind::Offer, payload)),
            Self::Answer { payload } => Some((SignalKind::Answer, payload)),
            Self::IceCandidate { payload } => Some((SignalKind::IceCandidate, payload)),
            _ => None,
        }
    }
}

/// Outbound notification to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The request was accepted but no pairing is possible yet.
    Waiting,
    /// A queue pairing completed; start the peer-to-peer negotiation.
    StartCall {
        /// Whether this side should initiate the negotiation. The side
        /// that was already waiting is always the initiator.
        is_initiator: bool,
        /// The new room.
        room_id: RoomId,
        /// The peer's connection id.
        peer_connection_id: ConnectionId,
        /// The peer's durable identity, if it registered one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_identity: Option<Identity>,
    },
    /// A reconnection completed; start the peer-to-peer negotiation.
    ReconnectReady {
        /// Whether this side should initiate. The side whose reconnect
        /// call completed the reunification is the initiator.
        is_initiator: bool,
        /// The new room.
        room_id: RoomId,
        /// The peer's connection id.
        peer_connection_id: ConnectionId,
        /// The peer's durable identity.
        peer_identity: Identity,
    },
    /// The room peer disconnected; the room is gone.
    UserDisconnected {
        /// The departed peer's identity, if it had registered one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        departed_identity: Option<Identity>,
    },
    /// The request failed.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Relayed offer from the room peer.
    Offer {
        /// Opaque signaling body, forwarded verbatim.
        payload: Value,
        /// Sender's connection id.
        from: ConnectionId,
    },
    /// Relayed answer from the room peer.
    Answer {
        /// Opaque signaling body, forwarded verbatim.
        payload: Value,
        /// Sender's connection id.
        from: ConnectionId,
    },
    /// Relayed transport candidate from the room peer.
    IceCandidate {
        /// Opaque signaling body, forwarded verbatim.
        payload: Value,
        /// Sender's connection id.
        from: ConnectionId,
    },
}

impl ServerMessage {
    /// Build the relayed form of a signaling message.
    pub fn relayed(kind: SignalKind, payload: Value, from: ConnectionId) -> Self {
        match kind {
            SignalKind::Offer => Self::Offer { payload, from },
            SignalKind::Answer => Self::Answer { payload, from },
            SignalKind::IceCandidate => Self::IceCandidate { payload, from },
        }
    }

    /// Build an error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::match_key::Stance;

    #[test]
    fn join_request_wire_form() {
        let text = r#"{"type":"join","match_key":{"kind":"zone","name":"starter_zone"},"identity":"u1"}"#;
        let req: ClientRequest = serde_json::from_str(text).unwrap();
        assert_eq!(req, ClientRequest::Join {
            match_key: MatchKey::Zone { name: "starter_zone".into() },
            identity: Some(Identity::from("u1")),
        });
    }

    #[test]
    fn join_identity_is_optional() {
        let text = r#"{"type":"join","match_key":{"kind":"debate","question":"q","stance":"for"}}"#;
        let req: ClientRequest = serde_json::from_str(text).unwrap();
        assert_eq!(req, ClientRequest::Join {
            match_key: MatchKey::Debate { question: "q".into(), stance: Stance::For },
            identity: None,
        });
    }

    #[test]
    fn signal_requests_expose_kind_and_payload() {
        let req = ClientRequest::IceCandidate { payload: json!({"candidate": "c0"}) };
        let (kind, payload) = req.as_signal().unwrap();
        assert_eq!(kind, SignalKind::IceCandidate);
        assert_eq!(payload, &json!({"candidate": "c0"}));

        let req = ClientRequest::LeaveReconnect;
        assert!(req.as_signal().is_none());
    }

    #[test]
    fn waiting_wire_form_has_no_payload() {
        let json = serde_json::to_string(&ServerMessage::Waiting).unwrap();
        assert_eq!(json, r#"{"type":"waiting"}"#);
    }

    #[test]
    fn start_call_omits_absent_peer_identity() {
        let msg = ServerMessage::StartCall {
            is_initiator: true,
            room_id: RoomId::new("z_1_2"),
            peer_connection_id: ConnectionId::new(7),
            peer_identity: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("peer_identity"));
    }

    #[test]
    fn relayed_signal_round_trips_payload_verbatim() {
        let payload = json!({"sdp": {"deeply": ["nested", 1, null]}});
        let msg = ServerMessage::relayed(SignalKind::Offer, payload.clone(), ConnectionId::new(3));
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServerMessage::Offer { payload, from: ConnectionId::new(3) });
    }
}
