//! deskhub daemon library: app host, message router and client hub.
//!
//! Apps, hardware clients and UI sessions all connect to one Unix socket.
//! The hub routes app envelopes to clients, client messages to apps, and
//! prompts to the UI.

pub mod clients;
pub mod error;
pub mod input;
pub mod launcher;
pub mod poller;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub(crate) mod settings_watcher;
pub mod ui;

pub use clients::{ClientBroadcaster, ClientState, HUB_APP};
pub use error::{DaemonError, Result};
pub use registry::{App, AppRegistry};
pub use router::{MessageRouter, SERVER_APP};
pub use server::{HubState, ServerOptions, SharedHub, run};
pub use session::{Session, SessionId};
