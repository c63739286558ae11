//! Error types for the deskhub daemon.

use deskhub_rpc::MalformedFrame;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No app registered under this name
    #[error("App not found: {0}")]
    AppNotFound(String),

    /// App is registered but has no live connection
    #[error("App not running: {0}")]
    AppNotRunning(String),

    /// No client connected under this id
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Frame body that did not parse; the connection stays open
    #[error("Malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),

    /// App is disabled and may not run
    #[error("App disabled: {0}")]
    AppDisabled(String),

    /// App process could not be launched
    #[error("Launch error: {0}")]
    Launch(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] deskhub_core::Error),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(#[from] deskhub_rpc::CodecError),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
