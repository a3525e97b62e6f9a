//! Error types for the hub client

use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by [`HassClient`](crate::HassClient)
#[derive(Debug, Error)]
pub enum ClientError {
    /// The websocket could not be opened or failed during the handshake
    #[error("connection error: {0}")]
    Connection(String),

    /// The hub rejected (or could not be offered) credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The hub answered a command with `success: false`
    #[error("command failed ({code}): {message}")]
    Command { code: String, message: String },

    /// The connection went away while the command was outstanding
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A frame could not be serialized or parsed
    #[error("invalid frame: {0}")]
    Codec(#[from] serde_json::Error),

    /// The hub sent something the protocol does not allow at this point
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller passed an argument the client cannot turn into a command
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether the hub refused a subscription because it already exists
    pub fn is_already_subscribed(&self) -> bool {
        match self {
            ClientError::Command { code, message } => {
                let message = message.to_lowercase();
                code == "already_subscribed"
                    || message.contains("already subscribed")
                    || message.contains("already exists")
            }
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_subscribed_detection() {
        let dup = ClientError::Command {
            code: "unknown_error".into(),
            message: "Subscription already exists".into(),
        };
        assert!(dup.is_already_subscribed());

        let other = ClientError::Command {
            code: "not_found".into(),
            message: "Service not found.".into(),
        };
        assert!(!other.is_already_subscribed());
        assert!(!ClientError::Auth("nope".into()).is_already_subscribed());
    }
}
