//! Error types for Niri IPC operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when communicating with the niri compositor
#[derive(Debug, Error)]
pub enum NiriError {
    /// The socket path does not exist
    #[error("Niri socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to the niri socket
    #[error("Failed to connect to niri socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to send request to niri
    #[error("Failed to send request to niri: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to receive response from niri
    #[error("Failed to receive response from niri: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Failed to serialize request to JSON
    #[error("Failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize a message from JSON
    #[error("Failed to deserialize message: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// Valid JSON that is neither a reply envelope nor an event
    #[error("Unexpected message from niri: {message}")]
    UnexpectedMessage { message: String },

    /// Niri returned an error response
    #[error("Niri returned error: {message}")]
    Compositor { message: String },

    /// Connection was closed unexpectedly
    #[error("Connection to niri closed unexpectedly")]
    ConnectionClosed,

    /// A request referenced a workspace id absent from the store
    #[error("Unknown workspace id {id}")]
    UnknownWorkspace { id: u64 },

    /// The workspace manager task is no longer running
    #[error("Workspace manager has stopped")]
    ManagerStopped,
}
