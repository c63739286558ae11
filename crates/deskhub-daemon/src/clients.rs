//! Connected client devices and message fan-out.
//!
//! Each client connection registers a sender and a cancellation token. A
//! client only receives broadcasts once its connection is open, which the
//! server marks after the `welcome` frame has been written.

use std::collections::HashMap;

use deskhub_core::{DataStore, KeyMapRegistry};
use deskhub_types::ClientMessage;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{DaemonError, Result};
use crate::registry::AppRegistry;

/// Sender field used for messages the hub itself originates.
pub const HUB_APP: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Open,
}

#[derive(Debug)]
struct ConnectedClient {
    sender: mpsc::UnboundedSender<ClientMessage>,
    state: ClientState,
    token: CancellationToken,
}

impl ConnectedClient {
    fn deliver(&self, msg: ClientMessage) -> bool {
        self.state == ClientState::Open && self.sender.send(msg).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ClientBroadcaster {
    clients: HashMap<String, ConnectedClient>,
}

impl ClientBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(
        &mut self,
        id: &str,
        sender: mpsc::UnboundedSender<ClientMessage>,
        token: CancellationToken,
    ) {
        debug!("[{}] Client connecting", id);
        self.clients.insert(
            id.to_string(),
            ConnectedClient {
                sender,
                state: ClientState::Connecting,
                token,
            },
        );
    }

    /// Returns `false` for unknown clients.
    pub fn mark_ready(&mut self, id: &str) -> bool {
        let Some(client) = self.clients.get_mut(id) else {
            return false;
        };
        client.state = ClientState::Open;
        info!("[{}] Client connected", id);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.clients.remove(id).is_some();
        if removed {
            info!("[{}] Client disconnected", id);
        }
        removed
    }

    /// Send to every open client. Returns how many received it.
    pub fn broadcast(&self, msg: &ClientMessage) -> usize {
        let delivered = self
            .clients
            .values()
            .filter(|client| client.deliver(msg.clone()))
            .count();
        trace!(
            "Broadcast {}/{} to {} of {} clients",
            msg.app,
            msg.kind,
            delivered,
            self.clients.len()
        );
        delivered
    }

    /// Send to one client, or to everyone if that client is unknown.
    pub fn unicast(&self, id: &str, msg: ClientMessage) -> usize {
        match self.clients.get(id) {
            Some(client) => usize::from(client.deliver(msg)),
            None => {
                debug!("[{}] Unknown client, broadcasting {} instead", id, msg.kind);
                self.broadcast(&msg)
            }
        }
    }

    fn send(&self, target: Option<&str>, msg: ClientMessage) -> usize {
        match target {
            Some(id) => self.unicast(id, msg),
            None => self.broadcast(&msg),
        }
    }

    /// Force a client off the hub. Its connection task drops the transport
    /// once the token fires.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::ClientNotFound` if no client has this id.
    pub fn disconnect(&mut self, id: &str) -> Result<()> {
        match self.clients.remove(id) {
            Some(client) => {
                client.token.cancel();
                info!("[{}] Client disconnected by request", id);
                Ok(())
            }
            None => {
                warn!("[{}] Cannot disconnect: client not found", id);
                Err(DaemonError::ClientNotFound(id.to_string()))
            }
        }
    }

    pub fn send_error(&self, target: Option<&str>, text: &str) {
        self.send(
            target,
            ClientMessage::new(HUB_APP, "error", Value::String(text.to_string())),
        );
    }

    /// Summaries of the apps that have a web UI on the client.
    pub fn send_config_data(&self, apps: &AppRegistry, target: Option<&str>) {
        let summaries: Vec<_> = apps
            .list_all()
            .filter(|app| app.manifest.is_web_app)
            .map(crate::registry::App::summary)
            .collect();

        match serde_json::to_value(summaries) {
            Ok(payload) => {
                self.send(target, ClientMessage::new(HUB_APP, "config", payload));
            }
            Err(e) => {
                error!("Failed to assemble app config for clients: {}", e);
                self.send_error(target, &format!("Failed to assemble app config: {e}"));
            }
        }
    }

    /// The `settings` entry of each registered app's stored data.
    pub fn send_settings_data(
        &self,
        apps: &AppRegistry,
        store: &dyn DataStore,
        target: Option<&str>,
    ) {
        let mut settings = Map::new();
        for app in apps.list_all() {
            match store.get_data(&app.name) {
                Ok(Some(data)) => {
                    if let Some(app_settings) = data.get("settings") {
                        settings.insert(app.name.clone(), app_settings.clone());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("[{}] Failed to read app settings: {}", app.name, e);
                    self.send_error(target, &format!("Failed to read settings: {e}"));
                    return;
                }
            }
        }

        self.send(
            target,
            ClientMessage::new(HUB_APP, "settings", Value::Object(settings)),
        );
    }

    pub fn send_mappings(&self, keymap: &KeyMapRegistry, target: Option<&str>) {
        match serde_json::to_value(keymap.get_mapping()) {
            Ok(payload) => {
                self.send(target, ClientMessage::new(HUB_APP, "button_mappings", payload));
            }
            Err(e) => {
                error!("Failed to assemble button mappings: {}", e);
                self.send_error(target, &format!("Failed to assemble mappings: {e}"));
            }
        }
    }
}
