//! Core error types.
//!
//! The taxonomy is deliberately small: expected matchmaking conditions
//! (nobody waiting, peer not mutual yet, peer busy) are `waiting`
//! notifications, not errors, and a stale waiting peer is an `error`
//! notification to the requester. The only hard error the driver can
//! return is a request attributed to a connection it has never seen.

use pairlink_proto::ConnectionId;

/// Errors from driver event processing.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A request arrived for a connection the driver does not know.
    ///
    /// Happens when a runtime keeps reading from a socket after the driver
    /// evicted or closed it. The runtime should drop the request and tear
    /// the socket down.
    #[error("connection not registered: {0}")]
    ConnectionNotFound(ConnectionId),
}
