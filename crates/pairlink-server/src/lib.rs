//! Pairlink production server.
//!
//! Production runtime wrapping [`pairlink_core`]'s action-based relay
//! driver with real I/O: an axum WebSocket endpoint for the signaling
//! protocol, an HTTP health route, and a periodic sweep timer.
//!
//! # Architecture
//!
//! The [`RelayDriver`] is sans-IO (see [`pairlink_core`]); this crate is
//! the glue that executes its actions. All driver access is serialized
//! through a single `tokio::sync::Mutex`, preserving the one-mutation-
//! at-a-time model the core relies on. Outbound delivery goes through a
//! per-connection unbounded channel so a slow peer never blocks the
//! driver; sends are fire-and-forget.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod system_env;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
pub use error::ServerError;
use futures::{SinkExt, StreamExt};
use pairlink_core::{Environment, LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use pairlink_proto::{ConnectionId, ServerMessage};
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock, mpsc};

/// Fixed response of the health route.
const HEALTH_BANNER: &str = "pairlink relay is running";

/// How often the stale-intent sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000").
    pub bind_address: String,
    /// Relay driver configuration (limits, grace period).
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:3000".to_string(), relay: RelayConfig::default() }
    }
}

/// Shared state for all connections.
struct Inner {
    /// The action-based relay driver; the mutex is the serialization point
    driver: Mutex<RelayDriver<SystemEnv>>,
    /// Outbound channel per live connection
    peers: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    /// Environment (time, RNG)
    env: SystemEnv,
}

#[derive(Clone)]
struct AppState(Arc<Inner>);

/// Production pairlink server.
///
/// Wraps `RelayDriver` with an axum WebSocket transport.
pub struct Server {
    listener: tokio::net::TcpListener,
    state: AppState,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = RelayDriver::new(env.clone(), config.relay);
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

        let state = AppState(Arc::new(Inner {
            driver: Mutex::new(driver),
            peers: RwLock::new(HashMap::new()),
            env,
        }));

        Ok(Self { listener, state })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections and relaying messages.
    ///
    /// Runs until the listener fails or the process is shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/", get(health))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone());

        let sweep_state = self.state.clone();
        tokio::spawn(async move {
            sweep_loop(sweep_state).await;
        });

        axum::serve(self.listener, app).await?;
        Ok(())
    }
}

/// Liveness acknowledgment for load balancers and humans.
async fn health() -> &'static str {
    HEALTH_BANNER
}

/// Periodically fire the stale-intent sweep.
async fn sweep_loop(state: AppState) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    // First tick completes immediately; skip it.
    interval.tick().await;
    loop {
        interval.tick().await;
        dispatch(&state, RelayEvent::Tick).await;
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Handle a single WebSocket connection.
///
/// Socket errors are isolated: a failed read tears down only this
/// connection, through the same path as a clean close.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let connection = ConnectionId::new(state.0.env.random_u64());
    tracing::debug!(%connection, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    state.0.peers.write().await.insert(connection, tx);
    dispatch(&state, RelayEvent::ConnectionOpened { connection }).await;

    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => match pairlink_proto::decode_request(&text) {
                Ok(request) => {
                    dispatch(&state, RelayEvent::RequestReceived { connection, request }).await;
                },
                Err(error) => {
                    tracing::warn!(%connection, %error, "malformed request");
                    send_to(&state, connection, &ServerMessage::error("malformed request")).await;
                },
            },
            Ok(Message::Close(_)) => break,
            // Binary frames are not part of the protocol; ping/pong are
            // answered by the websocket layer.
            Ok(_) => {},
            Err(error) => {
                tracing::debug!(%connection, %error, "websocket error");
                break;
            },
        }
    }

    state.0.peers.write().await.remove(&connection);
    dispatch(&state, RelayEvent::ConnectionClosed { connection }).await;
    writer.abort();
    tracing::debug!(%connection, "websocket closed");
}

/// Feed one event through the driver and execute the resulting actions.
///
/// The driver mutex is held across both steps so events are processed to
/// completion in arrival order.
async fn dispatch(state: &AppState, event: RelayEvent) {
    let mut driver = state.0.driver.lock().await;
    match driver.process_event(event) {
        Ok(actions) => execute_actions(&driver, state, actions).await,
        Err(error) => {
            // Request attributed to a connection the driver evicted; the
            // socket is already on its way down.
            tracing::warn!(%error, "event dropped");
        },
    }
}

/// Execute relay actions.
async fn execute_actions(
    driver: &RelayDriver<SystemEnv>,
    state: &AppState,
    actions: Vec<RelayAction>,
) {
    for action in actions {
        match action {
            RelayAction::Send { connection, message } => {
                send_to(state, connection, &message).await;
            },

            RelayAction::BroadcastToRoom { room_id, message, exclude } => {
                let Some(members) = driver.room_members(&room_id) else {
                    tracing::warn!(%room_id, "broadcast to unknown room");
                    continue;
                };
                for member in members {
                    if member != exclude {
                        send_to(state, member, &message).await;
                    }
                }
            },

            RelayAction::CloseConnection { connection, reason } => {
                tracing::info!(%connection, reason, "closing connection");
                let mut peers = state.0.peers.write().await;
                if let Some(tx) = peers.remove(&connection) {
                    // Dropping the channel ends the writer task; the close
                    // frame lets well-behaved clients shut down cleanly.
                    let _ = tx.send(Message::Close(None));
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }
}

/// Fire-and-forget delivery to one connection.
async fn send_to(state: &AppState, connection: ConnectionId, message: &ServerMessage) {
    let json = match pairlink_proto::encode_message(message) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(%error, "failed to encode message");
            return;
        },
    };

    let peers = state.0.peers.read().await;
    match peers.get(&connection) {
        Some(tx) => {
            if tx.send(Message::Text(json)).is_err() {
                tracing::debug!(%connection, "peer channel closed, message dropped");
            }
        },
        None => {
            tracing::debug!(%connection, "peer gone, message dropped");
        },
    }
}
