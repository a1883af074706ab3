//! Pairlink core: the matchmaking and reconnection state machine.
//!
//! # Architecture
//!
//! This crate is sans-IO. [`RelayDriver`] owns every piece of shared state
//! (waiting queues, room table, connection and identity registries,
//! reconnect intents) and exposes exactly one mutation entry point:
//! [`RelayDriver::process_event`], which consumes a [`RelayEvent`] and
//! returns the [`RelayAction`]s a runtime must execute. Nothing in here
//! blocks, suspends, or touches a socket, so a runtime that feeds events
//! one at a time gets the single-mutator semantics the protocol requires
//! for free.
//!
//! # Components
//!
//! - [`RelayDriver`]: event/action orchestrator (pure logic, no I/O)
//! - [`QueueManager`]: FIFO waiting lists keyed by match criterion
//! - [`RoomTable`]: active two-party sessions
//! - [`ConnectionRegistry`] / [`IdentityRegistry`]: live connections and
//!   durable identities, with bidirectional indexes
//! - [`ReconnectCoordinator`]: mutual-intent handshake and grace-period
//!   bookkeeping for broken pairs
//! - [`Environment`]: time and randomness abstraction for deterministic
//!   tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;

mod driver;
mod error;
mod queue;
mod reconnect;
mod registry;
mod room;

pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use env::Environment;
pub use error::RelayError;
pub use queue::QueueManager;
pub use reconnect::ReconnectCoordinator;
pub use registry::{ConnectionRegistry, IdentityRegistry};
pub use room::RoomTable;
