//! Relay driver.
//!
//! Ties together the waiting queues, room table, connection and identity
//! registries, and the reconnection coordinator. The driver is the single
//! owning state container: every mutation flows through
//! [`RelayDriver::process_event`], which reacts to one inbound event at a
//! time and returns the actions a runtime must execute. Notifications are
//! fire-and-forget; the only retry path is a client re-issuing its request.

use std::time::Duration;

use pairlink_proto::{
    ClientRequest, ConnectionId, Identity, MatchKey, RoomId, ServerMessage, SignalKind,
};
use serde_json::Value;

use crate::{
    env::Environment,
    error::RelayError,
    queue::QueueManager,
    reconnect::ReconnectCoordinator,
    registry::{ConnectionRegistry, IdentityRegistry},
    room::RoomTable,
};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a reconnect intent stays resident before the sweep drops it.
    pub reconnect_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, reconnect_grace: Duration::from_secs(300) }
    }
}

/// Events the relay driver processes.
///
/// Produced by the runtime (transport accept loop, read loops, tick timer).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted by the transport.
    ConnectionOpened {
        /// Connection id assigned by the runtime.
        connection: ConnectionId,
    },
    /// A decoded request arrived from a connection.
    RequestReceived {
        /// Connection that sent the request.
        connection: ConnectionId,
        /// The request.
        request: ClientRequest,
    },
    /// A connection was closed (by peer or transport error).
    ConnectionClosed {
        /// Connection that was closed.
        connection: ConnectionId,
    },
    /// Periodic tick for the stale-intent sweep.
    Tick,
}

/// Actions the relay driver produces.
///
/// Executed by runtime-specific code; the driver never performs I/O.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Send a message to a specific connection.
    Send {
        /// Target connection.
        connection: ConnectionId,
        /// Message to deliver.
        message: ServerMessage,
    },
    /// Deliver a message to every room member except `exclude`.
    BroadcastToRoom {
        /// Target room.
        room_id: RoomId,
        /// Message to deliver.
        message: ServerMessage,
        /// Member to skip (the sender).
        exclude: ConnectionId,
    },
    /// Close a connection.
    CloseConnection {
        /// Connection to close.
        connection: ConnectionId,
        /// Reason for closure.
        reason: String,
    },
    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
}

/// Action-based relay driver.
///
/// Orchestrates matchmaking, reconnection, room lifecycle, and signal
/// relay. Holds no locks itself; a runtime serializes calls into it.
pub struct RelayDriver<E: Environment> {
    /// Live connections and room membership
    connections: ConnectionRegistry,
    /// Durable identity bindings
    identities: IdentityRegistry,
    /// FIFO waiting lists
    queues: QueueManager,
    /// Active two-party rooms
    rooms: RoomTable,
    /// Broken-pair reconnection bookkeeping
    reconnect: ReconnectCoordinator<E::Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Driver configuration
    config: RelayConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            identities: IdentityRegistry::new(),
            queues: QueueManager::new(),
            rooms: RoomTable::new(),
            reconnect: ReconnectCoordinator::new(),
            env,
            config,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the only mutation entry point.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::ConnectionOpened { connection } => {
                Ok(self.handle_connection_opened(connection))
            },
            RelayEvent::RequestReceived { connection, request } => {
                if !self.connections.is_live(connection) {
                    return Err(RelayError::ConnectionNotFound(connection));
                }
                Ok(self.handle_request(connection, request))
            },
            RelayEvent::ConnectionClosed { connection } => Ok(self.handle_disconnect(connection)),
            RelayEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_connection_opened(&mut self, connection: ConnectionId) -> Vec<RelayAction> {
        if self.connections.count() >= self.config.max_connections {
            return vec![RelayAction::CloseConnection {
                connection,
                reason: "max connections exceeded".to_string(),
            }];
        }

        if !self.connections.register(connection) {
            // A transport bug: ids come from the runtime RNG and must not
            // repeat while the first connection is live.
            return vec![log(
                LogLevel::Warn,
                format!("duplicate open for already-registered connection {connection}"),
            )];
        }
        vec![log(LogLevel::Debug, format!("connection {connection} accepted"))]
    }

    fn handle_request(
        &mut self,
        connection: ConnectionId,
        request: ClientRequest,
    ) -> Vec<RelayAction> {
        if let Some((kind, payload)) = request.as_signal() {
            let payload = payload.clone();
            return self.handle_signal(connection, kind, payload);
        }

        match request {
            ClientRequest::Join { match_key, identity } => {
                self.handle_join(connection, match_key, identity)
            },
            ClientRequest::Reconnect { identity, target } => {
                self.handle_reconnect(connection, identity, target)
            },
            ClientRequest::LeaveReconnect => self.handle_leave_reconnect(connection),
            // Signal kinds were dispatched above
            ClientRequest::Offer { .. }
            | ClientRequest::Answer { .. }
            | ClientRequest::IceCandidate { .. } => Vec::new(),
        }
    }

    /// Queue Manager: pair against the complementary queue or start waiting.
    fn handle_join(
        &mut self,
        connection: ConnectionId,
        match_key: MatchKey,
        identity: Option<Identity>,
    ) -> Vec<RelayAction> {
        // A participant is in at most one room/queue at a time: tear down
        // any current room as a voluntary leave and drop stale queue spots.
        let mut actions = self.teardown_room(connection, false);
        self.queues.prune(connection);

        if let Some(identity) = identity {
            actions.extend(self.bind_identity(connection, identity));
        }

        match self.queues.pop_complement(&match_key) {
            Some(waiter) if !self.connections.is_live(waiter) => {
                // Ghost entry: the waiter's connection died without pruning.
                // Signal failure, drop the entry, do not requeue either side.
                actions.push(send(connection, ServerMessage::error("failed to connect with peer")));
                actions.push(log(
                    LogLevel::Warn,
                    format!("dropped ghost waiter {waiter} while pairing {connection}"),
                ));
            },
            Some(waiter) => {
                actions.extend(self.complete_queue_pairing(waiter, connection, &match_key));
            },
            None => {
                let position = self.queues.enqueue(match_key, connection);
                actions.push(send(connection, ServerMessage::Waiting));
                actions.push(log(
                    LogLevel::Debug,
                    format!("connection {connection} waiting at position {position}"),
                ));
            },
        }

        actions
    }

    /// Create a room for a popped waiter and the requester, notify both.
    ///
    /// The waiter has been in the queue longest and is always the
    /// initiator of the downstream negotiation.
    fn complete_queue_pairing(
        &mut self,
        waiter: ConnectionId,
        requester: ConnectionId,
        match_key: &MatchKey,
    ) -> Vec<RelayAction> {
        let room_id = self.rooms.create(&match_key.room_prefix(), &self.env, waiter, requester);
        self.connections.assign_room(waiter, room_id.clone());
        self.connections.assign_room(requester, room_id.clone());

        let waiter_identity = self.identities.identity_of(waiter).cloned();
        let requester_identity = self.identities.identity_of(requester).cloned();

        // An identified pair is reconnect-eligible from the start: record
        // the pairing both ways so a drop straight after pairing can still
        // be reunited.
        if let (Some(waiting_id), Some(requesting_id)) = (&waiter_identity, &requester_identity) {
            self.reconnect.seed_pair(waiting_id, requesting_id, self.env.now());
        }

        vec![
            send(waiter, ServerMessage::StartCall {
                is_initiator: true,
                room_id: room_id.clone(),
                peer_connection_id: requester,
                peer_identity: requester_identity,
            }),
            send(requester, ServerMessage::StartCall {
                is_initiator: false,
                room_id: room_id.clone(),
                peer_connection_id: waiter,
                peer_identity: waiter_identity,
            }),
            log(LogLevel::Info, format!("paired {waiter} with {requester} in room {room_id}")),
        ]
    }

    /// Reconnection Coordinator: complete the mutual-intent handshake or
    /// record waiting intent.
    fn handle_reconnect(
        &mut self,
        connection: ConnectionId,
        identity: Identity,
        target: Identity,
    ) -> Vec<RelayAction> {
        let mut actions = self.teardown_room(connection, false);
        self.queues.prune(connection);
        actions.extend(self.bind_identity(connection, identity.clone()));

        self.reconnect.record(identity.clone(), target.clone(), self.env.now());

        // A self-targeted intent would trivially satisfy the mutual check
        // without a second party; it can only ever wait.
        if identity == target || !self.reconnect.is_mutual(&identity, &target) {
            actions.push(send(connection, ServerMessage::Waiting));
            actions.push(log(
                LogLevel::Debug,
                format!("{identity} waiting for {target} to ask back"),
            ));
            return actions;
        }

        let Some(peer_connection) = self.identities.connection_of(&target) else {
            // Mutual, but the peer has not come back online yet.
            let attempt = self.reconnect.bump_attempts(&identity);
            actions.push(send(connection, ServerMessage::Waiting));
            actions.push(log(
                LogLevel::Debug,
                format!("{identity} waiting for {target} to reappear (attempt {attempt})"),
            ));
            return actions;
        };

        if self.connections.room_of(peer_connection).is_some() {
            // The peer is mid-session elsewhere; never steal it out.
            actions.push(send(connection, ServerMessage::Waiting));
            actions.push(log(LogLevel::Debug, format!("{target} is busy in another room")));
            return actions;
        }

        // The peer may have queued for a fresh match in the meantime; the
        // reunion supersedes any waiting-list entry it holds.
        self.queues.prune(peer_connection);

        let room_id = self.rooms.create("reconnect", &self.env, connection, peer_connection);
        self.connections.assign_room(connection, room_id.clone());
        self.connections.assign_room(peer_connection, room_id.clone());
        self.reconnect.clear_pair(&identity, &target);

        actions.push(send(connection, ServerMessage::ReconnectReady {
            is_initiator: true,
            room_id: room_id.clone(),
            peer_connection_id: peer_connection,
            peer_identity: target.clone(),
        }));
        actions.push(send(peer_connection, ServerMessage::ReconnectReady {
            is_initiator: false,
            room_id: room_id.clone(),
            peer_connection_id: connection,
            peer_identity: identity.clone(),
        }));
        actions.push(log(
            LogLevel::Info,
            format!("reunited {identity} with {target} in room {room_id}"),
        ));
        actions
    }

    /// Withdraw the caller's recorded intent without disconnecting.
    fn handle_leave_reconnect(&mut self, connection: ConnectionId) -> Vec<RelayAction> {
        match self.identities.identity_of(connection).cloned() {
            Some(identity) => {
                let had_intent = self.reconnect.clear_identity(&identity);
                vec![log(
                    LogLevel::Debug,
                    format!(
                        "{identity} withdrew reconnect intent (was recorded: {had_intent})"
                    ),
                )]
            },
            None => {
                // No identity registered for this connection: nothing to
                // withdraw.
                vec![log(
                    LogLevel::Debug,
                    format!("leave-reconnect from unidentified connection {connection}"),
                )]
            },
        }
    }

    /// Relay Dispatcher: forward a signaling payload to the room peer.
    fn handle_signal(
        &mut self,
        connection: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> Vec<RelayAction> {
        let Some(room_id) = self.connections.room_of(connection).cloned() else {
            // Room-less senders are silently dropped.
            return vec![log(
                LogLevel::Debug,
                format!("dropped signal from room-less connection {connection}"),
            )];
        };

        vec![RelayAction::BroadcastToRoom {
            room_id,
            message: ServerMessage::relayed(kind, payload, connection),
            exclude: connection,
        }]
    }

    /// Transport-level disconnect: room teardown plus full cleanup.
    fn handle_disconnect(&mut self, connection: ConnectionId) -> Vec<RelayAction> {
        let mut actions = self.teardown_room(connection, true);

        self.queues.prune(connection);
        if let Some(identity) = self.identities.unbind_connection(connection) {
            // The intent survives (it is what makes the pair reunitable);
            // only the retry counter dies with the connection.
            self.reconnect.clear_attempts(&identity);
            actions.push(log(LogLevel::Debug, format!("identity {identity} went offline")));
        }
        self.connections.unregister(connection);
        actions.push(log(LogLevel::Info, format!("connection {connection} closed")));
        actions
    }

    /// Periodic sweep of reconnect intents past the grace period.
    fn handle_tick(&mut self) -> Vec<RelayAction> {
        let swept = self.reconnect.sweep(self.env.now(), self.config.reconnect_grace);
        if swept == 0 {
            Vec::new()
        } else {
            vec![log(LogLevel::Debug, format!("swept {swept} expired reconnect intents"))]
        }
    }

    /// Tear down the connection's room, if any.
    ///
    /// Pre-seeds both directions of reconnect intent when both members
    /// carry durable identities, then notifies the remaining member and
    /// deletes the room. `disconnecting` only affects logging wording; the
    /// caller does identity/queue cleanup for real disconnects.
    fn teardown_room(&mut self, connection: ConnectionId, disconnecting: bool) -> Vec<RelayAction> {
        let Some(room_id) = self.connections.clear_room(connection) else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        if let Some(other) = self.rooms.other_member(&room_id, connection) {
            let departed_identity = self.identities.identity_of(connection).cloned();
            let remaining_identity = self.identities.identity_of(other).cloned();

            // Pre-seed both directions so the survivor's reconnect call
            // finds mutual intent without the departed side asking first.
            if let (Some(departed), Some(remaining)) = (&departed_identity, &remaining_identity) {
                self.reconnect.seed_pair(departed, remaining, self.env.now());
                actions.push(log(
                    LogLevel::Info,
                    format!("reconnect pair stored: {departed} <-> {remaining}"),
                ));
            }

            actions.push(send(other, ServerMessage::UserDisconnected {
                departed_identity,
            }));
            self.connections.clear_room(other);
        }

        self.rooms.remove(&room_id);
        let cause = if disconnecting { "disconnect" } else { "leave" };
        actions.push(log(LogLevel::Debug, format!("room {room_id} deleted ({cause})")));
        actions
    }

    /// Bind a durable identity to a connection.
    ///
    /// Re-registration from a second live connection evicts the old one:
    /// the stale connection is treated as implicitly disconnected and then
    /// closed, so the identity never has two live bindings.
    fn bind_identity(&mut self, connection: ConnectionId, identity: Identity) -> Vec<RelayAction> {
        let mut actions = Vec::new();

        if let Some(displaced) = self.identities.connection_of(&identity) {
            if displaced != connection && self.connections.is_live(displaced) {
                actions.push(log(
                    LogLevel::Warn,
                    format!("identity {identity} re-registered; evicting connection {displaced}"),
                ));
                actions.extend(self.handle_disconnect(displaced));
                actions.push(RelayAction::CloseConnection {
                    connection: displaced,
                    reason: "identity re-registered from a new connection".to_string(),
                });
            }
        }

        self.identities.bind(identity, connection);
        actions
    }

    /// Members of a room, for the runtime's broadcast primitive.
    pub fn room_members(&self, room_id: &RoomId) -> Option<[ConnectionId; 2]> {
        self.rooms.members(room_id)
    }

    /// The room a connection belongs to.
    pub fn room_of(&self, connection: ConnectionId) -> Option<&RoomId> {
        self.connections.room_of(connection)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.count()
    }

    /// Whether a connection is waiting in any queue.
    pub fn is_waiting(&self, connection: ConnectionId) -> bool {
        self.queues.is_waiting(connection)
    }

    /// 0-indexed queue position under a key.
    pub fn waiting_position(&self, key: &MatchKey, connection: ConnectionId) -> Option<usize> {
        self.queues.position(key, connection)
    }

    /// The declared reconnect target of an identity.
    pub fn reconnect_target(&self, identity: &Identity) -> Option<&Identity> {
        self.reconnect.target_of(identity)
    }

    /// Retry count for an identity.
    pub fn reconnect_attempts(&self, identity: &Identity) -> u32 {
        self.reconnect.attempts(identity)
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.count()
    }
}

impl<E: Environment> std::fmt::Debug for RelayDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.connections.count())
            .field("room_count", &self.rooms.count())
            .field("intent_count", &self.reconnect.intent_count())
            .finish()
    }
}

fn send(connection: ConnectionId, message: ServerMessage) -> RelayAction {
    RelayAction::Send { connection, message }
}

fn log(level: LogLevel, message: String) -> RelayAction {
    RelayAction::Log { level, message }
}
