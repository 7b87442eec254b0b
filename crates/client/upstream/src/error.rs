use tokio_tungstenite::tungstenite;

/// Errors returned to consumers of a [`crate::LinkHandle`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Upstream link is not connected yet")]
    NotConnected,
    #[error("Upstream link is closed")]
    Closed,
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to establish a connection.
///
/// An [`ConnectError::InvalidEndpoint`] is never reported as a link failure on its own: the link waits for its
/// connect timeout instead, so every "never connected" case goes through the same path.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid upstream endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Binary frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Connection closed by peer")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown upstream role {0:?}, expected one of fullhistory, currentledger, pathfinding or submission")]
pub struct UnknownRole(pub String);
