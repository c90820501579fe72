//! Error types for the game server.

use world_core::WorldError;

/// Failures surfaced by the networking layer and packet handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket creation, binding or I/O problems
    #[error("Network error: {0}")]
    Network(String),

    /// A packet that cannot be decoded or does not fit its opcode
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failures inside the world simulation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorldError> for ServerError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::Malformed(msg) => ServerError::Protocol(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Network(err.to_string())
    }
}
