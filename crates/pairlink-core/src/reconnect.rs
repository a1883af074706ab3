//! Reconnection intents and grace-period bookkeeping.
//!
//! A broken pair is reunited through a two-phase handshake: each identity
//! records a directed intent toward the other, and pairing completes only
//! when both directions exist. Intents are pre-seeded in both directions
//! when a room breaks, so the surviving side's reconnect call finds mutual
//! intent immediately. A per-identity attempt counter tracks retries while
//! the peer has not yet reappeared.
//!
//! Generic over `I` (Instant type) to support virtual time in tests.

use std::{collections::HashMap, time::Duration};

use pairlink_proto::Identity;

/// One directed reconnect intent.
#[derive(Debug, Clone)]
struct Intent<I> {
    target: Identity,
    recorded_at: I,
}

/// Tracks broken-pair intents and retry counters.
#[derive(Debug, Default)]
pub struct ReconnectCoordinator<I = std::time::Instant> {
    /// Identity → its declared reconnect target
    intents: HashMap<Identity, Intent<I>>,
    /// Identity → retries made while the peer was unreachable
    attempts: HashMap<Identity, u32>,
}

impl<I: Copy + Ord + std::ops::Sub<Output = Duration>> ReconnectCoordinator<I> {
    /// Create a new empty coordinator.
    pub fn new() -> Self {
        Self { intents: HashMap::new(), attempts: HashMap::new() }
    }

    /// Record a directed intent, overwriting any prior intent from `from`.
    pub fn record(&mut self, from: Identity, target: Identity, now: I) {
        self.intents.insert(from, Intent { target, recorded_at: now });
    }

    /// Pre-seed both directions of intent for a pair whose room broke.
    pub fn seed_pair(&mut self, first: &Identity, second: &Identity, now: I) {
        self.record(first.clone(), second.clone(), now);
        self.record(second.clone(), first.clone(), now);
    }

    /// The target an identity has declared, if any.
    pub fn target_of(&self, from: &Identity) -> Option<&Identity> {
        self.intents.get(from).map(|intent| &intent.target)
    }

    /// Whether both `a → b` and `b → a` are recorded.
    pub fn is_mutual(&self, a: &Identity, b: &Identity) -> bool {
        self.target_of(a) == Some(b) && self.target_of(b) == Some(a)
    }

    /// Clear both directions of intent and both retry counters after a
    /// completed reunification.
    pub fn clear_pair(&mut self, first: &Identity, second: &Identity) {
        self.intents.remove(first);
        self.intents.remove(second);
        self.attempts.remove(first);
        self.attempts.remove(second);
    }

    /// Clear one identity's intent and retry counter (explicit withdrawal).
    pub fn clear_identity(&mut self, identity: &Identity) -> bool {
        let had_intent = self.intents.remove(identity).is_some();
        self.attempts.remove(identity);
        had_intent
    }

    /// Drop the retry counter for an identity, keeping its intent.
    pub fn clear_attempts(&mut self, identity: &Identity) {
        self.attempts.remove(identity);
    }

    /// Increment and return an identity's retry counter.
    pub fn bump_attempts(&mut self, identity: &Identity) -> u32 {
        let counter = self.attempts.entry(identity.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Current retry count for an identity.
    pub fn attempts(&self, identity: &Identity) -> u32 {
        self.attempts.get(identity).copied().unwrap_or(0)
    }

    /// Remove intents older than `grace`, with their retry counters.
    ///
    /// Returns how many intents expired. An intent left resident forever
    /// would otherwise pin its identity strings for the process lifetime.
    pub fn sweep(&mut self, now: I, grace: Duration) -> usize {
        let before = self.intents.len();
        self.intents.retain(|_, intent| now - intent.recorded_at < grace);
        self.attempts.retain(|identity, _| self.intents.contains_key(identity));
        before - self.intents.len()
    }

    /// Number of resident intents.
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }
}
