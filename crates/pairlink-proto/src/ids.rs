//! Identifier newtypes.
//!
//! Three distinct id spaces exist and must never be confused: ephemeral
//! connection ids (assigned by the transport, die with the socket), durable
//! identities (client-chosen, survive reconnects), and room ids (generated
//! per pairing). Newtypes keep them apart at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ephemeral identifier for one live transport connection.
///
/// Assigned by the runtime when a socket is accepted, unique per live
/// connection, never reused for a reconnecting participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw connection id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Durable, client-chosen identity token.
///
/// Opaque to the relay. At most one live connection is bound to an identity
/// at a time; re-binding evicts the previous connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// Identifier of an active two-party room.
///
/// Generated from the match-key prefix plus a timestamp and random suffix,
/// so repeated pairings under the same key still get unique rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a generated room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
