//! Wire protocol for the deskhub socket.
//!
//! - [`protocol`]: frame types (`hello`, `welcome`, app/client/ui frames)
//! - [`transport`]: length-prefixed codec for frame delimitation
//! - [`client`]: connection helper performing the handshake

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{ClientError, HubConnection, socket_path};
pub use protocol::{AppLogLevel, Frame, Role, UiCommand, UiEvent};
pub use transport::{CodecError, FrameCodec, MalformedFrame};

pub use deskhub_types::{AppEnvelope, AppManifest, ClientMessage};
