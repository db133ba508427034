//! Error types for the Dolphin server.

use dolphin_model::ModelError;
use dolphin_protocol::CodecError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the Dolphin server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Request body could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A model store or bean schema operation failed.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A platform command arrived before `CreateContext`.
    #[error("{command} received before the context was initialized")]
    NotInitialized {
        /// Wire id of the offending command.
        command: String,
    },

    /// The client id header names no live session.
    #[error("unknown session: {id}")]
    UnknownSession {
        /// The unknown session id.
        id: String,
    },

    /// The configured session limit is reached.
    #[error("session limit of {max} reached")]
    SessionLimit {
        /// The configured limit.
        max: usize,
    },

    /// No controller type with this name is registered.
    #[error("no controller registered under '{name}'")]
    ControllerTypeNotFound {
        /// Controller name.
        name: String,
    },

    /// Two controller types were registered under one name.
    #[error("controller '{name}' is already registered")]
    DuplicateController {
        /// Controller name.
        name: String,
    },

    /// No live controller with this id.
    #[error("controller '{id}' not found")]
    ControllerNotFound {
        /// Controller id.
        id: String,
    },

    /// The controller has no action with this name.
    #[error("controller '{controller}' has no action '{action}'")]
    ActionNotFound {
        /// Controller name.
        controller: String,
        /// Action name.
        action: String,
    },

    /// Two actions with the same name were defined on one controller.
    #[error("controller '{controller}' defines action '{action}' twice")]
    DuplicateAction {
        /// Controller name.
        controller: String,
        /// Action name.
        action: String,
    },

    /// A declared action parameter was not supplied.
    #[error("action '{action}' is missing parameter '{param}'")]
    MissingParameter {
        /// Action name.
        action: String,
        /// Parameter name.
        param: String,
    },

    /// An action or hook reported a failure.
    #[error("action '{action}' failed: {message}")]
    ActionFailed {
        /// Action name.
        action: String,
        /// Failure description.
        message: String,
    },

    /// The bean is not managed by this session.
    #[error("bean '{id}' is not managed")]
    BeanNotManaged {
        /// Bean id.
        id: String,
    },

    /// A reference would close a cycle in the bean graph.
    #[error("reference from '{from}' to '{to}' would create a circular dependency")]
    CircularDependency {
        /// Referencing bean id.
        from: String,
        /// Referenced bean id.
        to: String,
    },

    /// A queued session task failed.
    #[error("task failed in session {session}: {message}")]
    Task {
        /// Session id.
        session: String,
        /// Failure description.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates an action failure from any displayable error.
    pub fn action_failed(action: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ActionFailed {
            action: action.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Codec(_)
                | ServerError::UnknownSession { .. }
                | ServerError::SessionLimit { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::UnknownSession { id: "s".into() }.is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::Codec(CodecError::invalid_json("eof")).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::CircularDependency {
            from: "a".into(),
            to: "b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'a'"));
        assert!(msg.contains("'b'"));

        let err = ServerError::action_failed("save", "disk full");
        assert_eq!(err.to_string(), "action 'save' failed: disk full");
    }
}
