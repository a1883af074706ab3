//! Connection and identity registries.
//!
//! [`ConnectionRegistry`] tracks which transport connections are live and
//! which room, if any, each one belongs to. [`IdentityRegistry`] maps
//! durable identities to their current live connection and back, keeping
//! the two maps in sync so reverse lookups never scan.

use std::collections::HashMap;

use pairlink_proto::{ConnectionId, Identity, RoomId};

/// Registry of live connections and their room membership.
///
/// The driver references connections; the transport owns them. A
/// connection is a member of at most one room at a time.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection id → assigned room (`None` while unpaired)
    connections: HashMap<ConnectionId, Option<RoomId>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection.
    ///
    /// Returns `false` if the id is already registered.
    pub fn register(&mut self, connection: ConnectionId) -> bool {
        if self.connections.contains_key(&connection) {
            return false;
        }
        self.connections.insert(connection, None);
        true
    }

    /// Remove a connection entirely. Returns its room, if it had one.
    pub fn unregister(&mut self, connection: ConnectionId) -> Option<RoomId> {
        self.connections.remove(&connection).flatten()
    }

    /// Whether the connection is currently live.
    pub fn is_live(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Assign a connection to a room.
    ///
    /// Returns `false` if the connection is not registered. Overwrites any
    /// previous assignment; callers tear down the old room first.
    pub fn assign_room(&mut self, connection: ConnectionId, room: RoomId) -> bool {
        match self.connections.get_mut(&connection) {
            Some(slot) => {
                *slot = Some(room);
                true
            },
            None => false,
        }
    }

    /// Clear a connection's room membership, returning the old room.
    pub fn clear_room(&mut self, connection: ConnectionId) -> Option<RoomId> {
        self.connections.get_mut(&connection).and_then(Option::take)
    }

    /// The room a connection belongs to, if any.
    pub fn room_of(&self, connection: ConnectionId) -> Option<&RoomId> {
        self.connections.get(&connection).and_then(Option::as_ref)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

/// Bidirectional index between durable identities and live connections.
///
/// At most one live connection per identity and one identity per
/// connection. Both directions are O(1); the maps are only ever mutated
/// together.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// Identity → current live connection
    by_identity: HashMap<Identity, ConnectionId>,
    /// Connection → bound identity (reverse index)
    by_connection: HashMap<ConnectionId, Identity>,
}

impl IdentityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a connection, replacing both the identity's old
    /// connection and the connection's old identity.
    ///
    /// Returns the connection previously bound to this identity when it
    /// differs from `connection` — the caller decides what to do with the
    /// displaced connection.
    pub fn bind(&mut self, identity: Identity, connection: ConnectionId) -> Option<ConnectionId> {
        let displaced = match self.by_identity.get(&identity) {
            Some(&old) if old != connection => Some(old),
            _ => None,
        };

        if let Some(old) = displaced {
            self.by_connection.remove(&old);
        }
        if let Some(old_identity) = self.by_connection.remove(&connection) {
            self.by_identity.remove(&old_identity);
        }

        self.by_identity.insert(identity.clone(), connection);
        self.by_connection.insert(connection, identity);
        displaced
    }

    /// The live connection bound to an identity.
    pub fn connection_of(&self, identity: &Identity) -> Option<ConnectionId> {
        self.by_identity.get(identity).copied()
    }

    /// The identity bound to a connection.
    pub fn identity_of(&self, connection: ConnectionId) -> Option<&Identity> {
        self.by_connection.get(&connection)
    }

    /// Remove the binding for a connection, returning its identity.
    pub fn unbind_connection(&mut self, connection: ConnectionId) -> Option<Identity> {
        let identity = self.by_connection.remove(&connection)?;
        self.by_identity.remove(&identity);
        Some(identity)
    }

    /// Number of bound identities.
    pub fn count(&self) -> usize {
        self.by_identity.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn register_and_room_assignment() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(conn(1)));
        assert!(!registry.register(conn(1)));
        assert!(registry.is_live(conn(1)));
        assert!(registry.room_of(conn(1)).is_none());

        let room = RoomId::new("zone_1_abc");
        assert!(registry.assign_room(conn(1), room.clone()));
        assert_eq!(registry.room_of(conn(1)), Some(&room));

        assert_eq!(registry.clear_room(conn(1)), Some(room));
        assert!(registry.room_of(conn(1)).is_none());
        assert!(registry.is_live(conn(1)));
    }

    #[test]
    fn assign_room_to_unknown_connection_fails() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.assign_room(conn(9), RoomId::new("r")));
    }

    #[test]
    fn unregister_returns_room() {
        let mut registry = ConnectionRegistry::new();
        registry.register(conn(1));
        registry.assign_room(conn(1), RoomId::new("r"));

        assert_eq!(registry.unregister(conn(1)), Some(RoomId::new("r")));
        assert!(!registry.is_live(conn(1)));
        assert_eq!(registry.unregister(conn(1)), None);
    }

    #[test]
    fn bind_and_lookup_both_directions() {
        let mut registry = IdentityRegistry::new();
        let alice = Identity::from("alice");

        assert_eq!(registry.bind(alice.clone(), conn(1)), None);
        assert_eq!(registry.connection_of(&alice), Some(conn(1)));
        assert_eq!(registry.identity_of(conn(1)), Some(&alice));
    }

    #[test]
    fn rebind_reports_displaced_connection() {
        let mut registry = IdentityRegistry::new();
        let alice = Identity::from("alice");

        registry.bind(alice.clone(), conn(1));
        assert_eq!(registry.bind(alice.clone(), conn(2)), Some(conn(1)));

        assert_eq!(registry.connection_of(&alice), Some(conn(2)));
        assert_eq!(registry.identity_of(conn(1)), None);
    }

    #[test]
    fn rebind_same_connection_is_not_a_displacement() {
        let mut registry = IdentityRegistry::new();
        let alice = Identity::from("alice");

        registry.bind(alice.clone(), conn(1));
        assert_eq!(registry.bind(alice, conn(1)), None);
    }

    #[test]
    fn binding_new_identity_to_connection_replaces_old_identity() {
        let mut registry = IdentityRegistry::new();
        let alice = Identity::from("alice");
        let alicia = Identity::from("alicia");

        registry.bind(alice.clone(), conn(1));
        registry.bind(alicia.clone(), conn(1));

        assert_eq!(registry.connection_of(&alice), None);
        assert_eq!(registry.identity_of(conn(1)), Some(&alicia));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unbind_connection_cleans_both_maps() {
        let mut registry = IdentityRegistry::new();
        let alice = Identity::from("alice");

        registry.bind(alice.clone(), conn(1));
        assert_eq!(registry.unbind_connection(conn(1)), Some(alice.clone()));
        assert_eq!(registry.connection_of(&alice), None);
        assert_eq!(registry.identity_of(conn(1)), None);
    }
}
