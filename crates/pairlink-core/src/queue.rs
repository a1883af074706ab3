//! FIFO waiting lists keyed by match criterion.
//!
//! One queue per [`MatchKey`]. Pairing always pops the head of the
//! complementary queue (oldest waiter wins, no priority or weighting). A
//! connection sits in at most one queue at a time; callers prune before
//! enqueueing. Queues are removed as soon as they empty so the map never
//! accumulates dead keys.

use std::collections::{HashMap, VecDeque};

use pairlink_proto::{ConnectionId, MatchKey};

/// Ordered waiting lists for each match criterion.
#[derive(Debug, Default)]
pub struct QueueManager {
    waiting: HashMap<MatchKey, VecDeque<ConnectionId>>,
}

impl QueueManager {
    /// Create a new empty queue manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection to the key's own waiting list.
    ///
    /// Returns the 0-indexed queue position.
    pub fn enqueue(&mut self, key: MatchKey, connection: ConnectionId) -> usize {
        let queue = self.waiting.entry(key).or_default();
        queue.push_back(connection);
        queue.len() - 1
    }

    /// Pop the longest-waiting entry from the key's complementary queue.
    pub fn pop_complement(&mut self, key: &MatchKey) -> Option<ConnectionId> {
        let complement = key.complement();
        let queue = self.waiting.get_mut(&complement)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.waiting.remove(&complement);
        }
        head
    }

    /// Remove a connection from every waiting list it sits in, dropping
    /// queues that empty.
    pub fn prune(&mut self, connection: ConnectionId) {
        self.waiting.retain(|_, queue| {
            queue.retain(|&waiting| waiting != connection);
            !queue.is_empty()
        });
    }

    /// Whether a connection is waiting under any key.
    pub fn is_waiting(&self, connection: ConnectionId) -> bool {
        self.waiting.values().any(|queue| queue.contains(&connection))
    }

    /// 0-indexed position of a connection in the key's own queue.
    pub fn position(&self, key: &MatchKey, connection: ConnectionId) -> Option<usize> {
        self.waiting.get(key)?.iter().position(|&waiting| waiting == connection)
    }

    /// Number of waiters under a key.
    pub fn len(&self, key: &MatchKey) -> usize {
        self.waiting.get(key).map_or(0, VecDeque::len)
    }

    /// Whether no one is waiting under any key.
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
