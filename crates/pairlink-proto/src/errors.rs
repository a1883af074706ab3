//! Protocol error types.

/// Errors from encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound text was not a valid request.
    ///
    /// Fatal for that message only; the connection stays up and the sender
    /// is told via an `error` notification.
    #[error("failed to decode request: {0}")]
    Decode(#[source] serde_json::Error),

    /// A server message could not be serialized.
    ///
    /// Should never happen for well-formed messages; indicates a bug.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
