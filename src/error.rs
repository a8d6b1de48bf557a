//! Error types for dockerpc.

use thiserror::Error;

/// Main error type for all dockerpc operations.
#[derive(Debug, Error)]
pub enum DockerpcError {
    /// I/O error on the attached stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (RPC codec).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level connection could not be established.
    #[error("Failed to dial {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded or is invalid.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Upgrade handshake rejected, or the endpoint is malformed.
    #[error("Attach failed: {0}")]
    AttachFailed(String),

    /// Short header read or unknown stream tag on the attach stream.
    #[error("Protocol framing error: {0}")]
    ProtocolFraming(String),

    /// The remote procedure returned an application-level error.
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(String),

    /// Container creation or start failed.
    #[error("Container lifecycle failed: {0}")]
    LifecycleFailed(String),

    /// Peer closed the attach stream.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation requires a started client.
    #[error("Client is not started")]
    NotStarted,

    /// `start` called on a client that is already active.
    #[error("Client is already started")]
    AlreadyStarted,
}

/// Result type alias using DockerpcError.
pub type Result<T> = std::result::Result<T, DockerpcError>;
