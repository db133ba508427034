//! Error types for the client.

use dolphin_model::ModelError;
use dolphin_protocol::CodecError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the client side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response message.
        message: String,
    },

    /// The server does not know our session, or handed us a different one.
    #[error("session error: {message}")]
    Session {
        /// Error message.
        message: String,
    },

    /// Request or response body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A server command could not be applied to the local store.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A controller action failed on the server.
    #[error("action '{action_name}' failed on controller {controller_id}")]
    ControllerAction {
        /// Controller id.
        controller_id: String,
        /// Action name.
        action_name: String,
    },

    /// The server violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A blocking call did not complete within the connection timeout.
    #[error("operation timed out")]
    Timeout,

    /// The context is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The controller proxy was already destroyed.
    #[error("controller {controller_id} was already destroyed")]
    ControllerDestroyed {
        /// Controller id.
        controller_id: String,
    },

    /// A background thread could not be started.
    #[error("failed to start thread: {message}")]
    Thread {
        /// Error message.
        message: String,
    },
}

impl ClientError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Http { .. } | ClientError::Session { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(ClientError::transport("connection refused").is_transport());
        assert!(ClientError::Http {
            status: 500,
            message: "boom".into()
        }
        .is_transport());
        assert!(ClientError::session("unknown client id").is_transport());
        assert!(!ClientError::Timeout.is_transport());
    }

    #[test]
    fn error_display() {
        let err = ClientError::ControllerAction {
            controller_id: "c-1".into(),
            action_name: "save".into(),
        };
        assert_eq!(err.to_string(), "action 'save' failed on controller c-1");
        assert_eq!(ClientError::NotConnected.to_string(), "not connected to server");
    }
}
