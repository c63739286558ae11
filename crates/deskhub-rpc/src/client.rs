//! Connection helper for peers of the hub socket.
//!
//! Apps written in Rust, test harnesses and UI shells use [`HubConnection`]
//! to perform the `hello`/`welcome` handshake and exchange frames.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{Frame, Role};
use crate::transport::{CodecError, FrameCodec, MalformedFrame};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR").map_or_else(|_| std::env::temp_dir(), PathBuf::from)
}

/// Get the socket path for the hub.
///
/// Prefers `$XDG_RUNTIME_DIR`, falling back to the system temp directory.
#[must_use]
pub fn socket_path() -> PathBuf {
    runtime_dir().join("deskhub.sock")
}

/// Errors that can occur on a hub connection
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Handshake timeout")]
    Timeout,

    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    #[error("Malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),
}

/// A registered connection to the hub.
pub struct HubConnection {
    framed: Framed<UnixStream, FrameCodec>,
    session_id: String,
}

impl HubConnection {
    /// Connect to the hub at `path` and register with `role`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be reached or the hub does not
    /// answer the `hello` frame with `welcome`.
    pub async fn connect(path: &Path, role: Role) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path).await?;
        let mut framed = Framed::new(stream, FrameCodec::new());

        framed.send(Frame::Hello(role)).await?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next())
            .await
            .map_err(|_| ClientError::Timeout)?
            .ok_or(ClientError::ConnectionClosed)???;

        match reply {
            Frame::Welcome { session_id } => {
                debug!("Registered with hub as session {}", session_id);
                Ok(Self { framed, session_id })
            }
            other => Err(ClientError::UnexpectedFrame(other.kind())),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a frame to the hub.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the frame cannot be written.
    pub async fn send(&mut self, frame: Frame) -> Result<(), ClientError> {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Receive the next frame, `None` once the hub closes the connection.
    ///
    /// A `ClientError::Malformed` leaves the connection usable.
    pub async fn recv(&mut self) -> Option<Result<Frame, ClientError>> {
        self.framed
            .next()
            .await
            .map(|result| -> Result<Frame, ClientError> { Ok(result??) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        assert!(socket_path().ends_with("deskhub.sock"));
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(ClientError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(ClientError::Timeout.to_string(), "Handshake timeout");
        assert_eq!(
            ClientError::UnexpectedFrame("app").to_string(),
            "Unexpected frame: app"
        );
    }

    #[test]
    fn test_client_error_from_codec() {
        let err: ClientError = CodecError::FrameTooLarge(100_000_000).into();
        assert!(matches!(err, ClientError::Codec(_)));
        assert!(err.to_string().contains("100000000"));
    }

    #[test]
    fn test_client_error_from_malformed() {
        let err: ClientError = MalformedFrame {
            kind: Some("ui_event".to_string()),
            reason: "missing field `event`".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Malformed frame: ui_event frame: missing field `event`"
        );
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let path = std::env::temp_dir().join("deskhub-no-such-socket.sock");
        let result = HubConnection::connect(&path, Role::Client { name: None }).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
