//! Errors surfaced by the chain clients.

use thiserror::Error;

/// Failure talking to a chain node.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed or dropped before an answer arrived.
    #[error("transport: {0}")]
    Transport(String),

    /// The node answered the call with an error.
    #[error("rpc: {0}")]
    Rpc(String),

    /// The node returned something that does not decode.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The event subscription was closed by the remote end.
    #[error("subscription closed")]
    SubscriptionClosed,
}

impl ClientError {
    /// Whether retrying the same call can reasonably succeed.
    ///
    /// Connection-level faults clear once the node is reachable again; an
    /// explicit node error or an undecodable answer will just repeat.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SubscriptionClosed)
    }
}

impl From<jsonrpsee::core::client::Error> for ClientError {
    fn from(err: jsonrpsee::core::client::Error) -> Self {
        use jsonrpsee::core::client::Error as RpcError;

        match err {
            RpcError::Call(e) => Self::Rpc(e.to_string()),
            RpcError::ParseError(e) => Self::MalformedResponse(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Result type for chain client calls.
pub type ClientResult<T> = Result<T, ClientError>;
