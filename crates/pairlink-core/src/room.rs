//! Active two-party rooms.
//!
//! A room always has exactly two members while it exists; it is deleted,
//! never transitioned, when either member leaves. Room ids embed the
//! match-key prefix, a wall-clock timestamp, and a random suffix so
//! repeated pairings under one key stay distinct.

use std::collections::HashMap;

use pairlink_proto::{ConnectionId, RoomId};

use crate::env::Environment;

/// Table of active two-party sessions.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, [ConnectionId; 2]>,
}

impl RoomTable {
    /// Create a new empty room table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room for two members under a freshly generated id.
    pub fn create<E: Environment>(
        &mut self,
        prefix: &str,
        env: &E,
        first: ConnectionId,
        second: ConnectionId,
    ) -> RoomId {
        // Suffix collisions are astronomically unlikely but cheap to rule out.
        loop {
            let id = RoomId::new(format!(
                "{}_{}_{:016x}",
                prefix,
                env.wall_clock_millis(),
                env.random_u64()
            ));
            if !self.rooms.contains_key(&id) {
                self.rooms.insert(id.clone(), [first, second]);
                return id;
            }
        }
    }

    /// Delete a room, returning its members.
    pub fn remove(&mut self, room: &RoomId) -> Option<[ConnectionId; 2]> {
        self.rooms.remove(room)
    }

    /// Members of a room.
    pub fn members(&self, room: &RoomId) -> Option<[ConnectionId; 2]> {
        self.rooms.get(room).copied()
    }

    /// The other member of a room, given one member.
    pub fn other_member(&self, room: &RoomId, connection: ConnectionId) -> Option<ConnectionId> {
        let [first, second] = self.rooms.get(room)?;
        if *first == connection {
            Some(*second)
        } else if *second == connection {
            Some(*first)
        } else {
            None
        }
    }

    /// Whether a room exists.
    pub fn contains(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of active rooms.
    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}
