//! Dispatch of app envelopes and client messages.
//!
//! [`MessageRouter`] borrows the pieces of hub state one envelope can touch.
//! The server builds it under the hub write lock, so a dispatch always runs
//! to completion before the next one starts.

use std::time::Duration;

use deskhub_core::{ConfigStore, DataStore, KeyMapRegistry};
use deskhub_rpc::AppLogLevel;
use deskhub_types::{AppEnvelope, AppMessage, ClientMessage, payload_text};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clients::{ClientBroadcaster, HUB_APP};
use crate::input::InputRequests;
use crate::poller::PlaybackPoller;
use crate::registry::AppRegistry;
use crate::server::SharedHub;
use crate::ui::UiBridge;

/// App name clients use to address the hub itself.
pub const SERVER_APP: &str = "server";

pub struct MessageRouter<'a> {
    pub apps: &'a AppRegistry,
    pub keymap: &'a mut KeyMapRegistry,
    pub clients: &'a ClientBroadcaster,
    pub data: &'a mut dyn DataStore,
    pub config: &'a dyn ConfigStore,
    pub inputs: &'a InputRequests,
    pub ui: &'a UiBridge,
    pub input_timeout: Duration,
}

impl MessageRouter<'_> {
    /// Handle one envelope sent by `origin`.
    ///
    /// Never fails: every problem is logged, and `get` requests that cannot
    /// be served answer the origin with an `error` envelope.
    pub fn dispatch(&mut self, origin: &str, envelope: AppEnvelope) {
        debug!(
            "[{}] Dispatching {} {}",
            origin,
            envelope.kind,
            envelope.request.as_deref().unwrap_or("-")
        );

        match AppMessage::parse(envelope) {
            Ok(message) => self.handle(origin, message),
            Err(malformed) => {
                warn!("[{}] Malformed envelope: {}", origin, malformed);
                if malformed.expects_reply() {
                    self.reply(origin, AppEnvelope::error(malformed.reason));
                }
            }
        }
    }

    // One arm per message type keeps the dispatch table in one place
    #[allow(clippy::too_many_lines)]
    fn handle(&mut self, origin: &str, message: AppMessage) {
        match message {
            AppMessage::Message(payload) => {
                let text = payload_text(&payload);
                info!("[{}] {}", origin, text);
                self.ui.app_log(origin, AppLogLevel::Message, &text);
            }
            AppMessage::Log(payload) => {
                let text = payload_text(&payload);
                info!("[{}] {}", origin, text);
                self.ui.app_log(origin, AppLogLevel::Log, &text);
            }
            AppMessage::Error(payload) => {
                let text = payload_text(&payload);
                error!("[{}] {}", origin, text);
                self.ui.app_log(origin, AppLogLevel::Error, &text);
            }
            AppMessage::GetData => match self.data.get_data(origin) {
                Ok(data) => {
                    self.reply(origin, AppEnvelope::new("data", data.unwrap_or(Value::Null)));
                }
                Err(e) => {
                    error!("[{}] Failed to read app data: {}", origin, e);
                    self.reply(origin, AppEnvelope::error(format!("Failed to read data: {e}")));
                }
            },
            AppMessage::GetConfig { key } => match self.config.get_config(&key) {
                Ok(value) => {
                    self.reply(origin, AppEnvelope::new("config", value.unwrap_or(Value::Null)));
                }
                Err(e) => {
                    error!("[{}] Failed to read config {}: {}", origin, key, e);
                    self.reply(
                        origin,
                        AppEnvelope::error(format!("Failed to read config {key}: {e}")),
                    );
                }
            },
            AppMessage::GetInput { scopes } => self.request_user_input(origin, &scopes),
            AppMessage::Set(value) => {
                if let Err(e) = self.data.set_data(origin, value) {
                    error!("[{}] Failed to store data: {}", origin, e);
                }
            }
            AppMessage::Add(fields) => {
                if let Err(e) = self.data.add_data(origin, fields) {
                    error!("[{}] Failed to merge data: {}", origin, e);
                }
            }
            AppMessage::Open { url } => {
                info!("[{}] Opening {}", origin, url);
                self.ui.open_url(origin, &url);
            }
            AppMessage::Data { relay, request } => {
                if relay.payload.is_none() {
                    debug!("[{}] Data relay has no inner payload, sending null", origin);
                }
                let msg = relay.into_client_message(origin, request.as_deref());
                let delivered = self.clients.broadcast(&msg);
                debug!(
                    "[{}] Relayed {} to {} clients",
                    origin, msg.kind, delivered
                );
            }
            AppMessage::ToApp { target, envelope } => {
                debug!("[{}] Relaying {} to {}", origin, envelope.kind, target);
                // push logs its own failures
                let _ = self.apps.push(&target, envelope);
            }
            AppMessage::ButtonAdd(draft) => {
                let key = draft.into_key(origin);
                info!("[{}] Added button {}", origin, key.id);
                self.keymap.add_key(key);
                self.clients.send_mappings(self.keymap, None);
            }
            AppMessage::ButtonRemove { id } => {
                if self.keymap.remove_key(&id) {
                    info!("[{}] Removed button {}", origin, id);
                    self.clients.send_mappings(self.keymap, None);
                }
            }
            AppMessage::ActionAdd(draft) => {
                let action = draft.into_action(origin);
                info!("[{}] Added action {}", origin, action.id);
                self.keymap.add_action(action);
                self.clients.send_mappings(self.keymap, None);
            }
            AppMessage::ActionRemove { id } => {
                if self.keymap.remove_action(&id) {
                    info!("[{}] Removed action {}", origin, id);
                    self.clients.send_mappings(self.keymap, None);
                }
            }
            AppMessage::ActionUpdate { id, icon } => {
                if self.keymap.update_action_icon(&id, icon) {
                    self.clients.send_mappings(self.keymap, None);
                } else {
                    debug!("[{}] Icon update for unknown action {}", origin, id);
                }
            }
            AppMessage::Unsupported { kind, request } => {
                warn!(
                    "[{}] Unsupported request {} {}",
                    origin,
                    kind,
                    request.as_deref().unwrap_or("(none)")
                );
            }
            AppMessage::Unknown { kind } => {
                error!("[{}] Unknown data type: {}", origin, kind);
            }
        }
    }

    fn request_user_input(&self, origin: &str, scopes: &Value) {
        self.inputs.begin(origin, self.input_timeout);
        if !self.ui.request_user_input(origin, scopes) {
            self.inputs.cancel(origin);
            self.reply(
                origin,
                AppEnvelope::error("No UI session available for user input"),
            );
        }
    }

    /// Deliver the UI's answer to a pending input request.
    pub fn complete_user_input(&self, app: &str, data: Value) -> bool {
        if !self.inputs.complete(app) {
            warn!("[{}] User input received but no request is pending", app);
            return false;
        }
        self.apps.push(app, AppEnvelope::new("input", data)).is_ok()
    }

    fn reply(&self, origin: &str, envelope: AppEnvelope) {
        // push logs its own failures
        let _ = self.apps.push(origin, envelope);
    }
}

/// Handle a message from a connected client.
///
/// Messages for the hub itself (`app == "server"`) are answered here,
/// playback requests go to the poller, and everything else is pushed to the
/// named app.
pub async fn route_client_message(
    hub: &SharedHub,
    poller: &Mutex<PlaybackPoller>,
    client_id: &str,
    msg: ClientMessage,
) {
    match msg.app.as_str() {
        SERVER_APP => handle_server_request(hub, poller, client_id, msg).await,
        "music" | "utility" => poller.lock().await.handle_client_request(&msg).await,
        _ => {
            let state = hub.read().await;
            let target = msg.app.clone();
            let envelope = AppEnvelope {
                kind: msg.kind,
                request: msg.request,
                payload: Some(msg.payload),
            };
            if let Err(e) = state.apps.push(&target, envelope) {
                state.clients.send_error(Some(client_id), &e.to_string());
            }
        }
    }
}

async fn handle_server_request(
    hub: &SharedHub,
    poller: &Mutex<PlaybackPoller>,
    client_id: &str,
    msg: ClientMessage,
) {
    let target = Some(client_id);
    match (msg.kind.as_str(), msg.request.as_deref()) {
        ("get", Some("config")) => {
            let state = hub.read().await;
            state.clients.send_config_data(&state.apps, target);
        }
        ("get", Some("settings")) => {
            let state = hub.read().await;
            state
                .clients
                .send_settings_data(&state.apps, &*state.data, target);
        }
        ("get", Some("mappings")) => {
            let state = hub.read().await;
            state.clients.send_mappings(&state.keymap, target);
        }
        ("ping", _) => {
            let state = hub.read().await;
            state
                .clients
                .unicast(client_id, ClientMessage::new(HUB_APP, "pong", msg.payload));
        }
        ("set", Some("playback")) => {
            let Some(app) = msg.payload.as_str().filter(|a| !a.is_empty()) else {
                let state = hub.read().await;
                state
                    .clients
                    .send_error(target, "Playback app must be a non-empty string");
                return;
            };

            poller.lock().await.set_current_app(Some(app.to_string()));

            let state = hub.read().await;
            let mut settings = state.settings.get();
            settings.playback_location = Some(app.to_string());
            if let Err(e) = state.settings.set(settings) {
                error!("Failed to save playback location: {}", e);
            }
        }
        (kind, request) => {
            warn!(
                "[{}] Unknown server request {} {}",
                client_id,
                kind,
                request.unwrap_or("(none)")
            );
            let state = hub.read().await;
            state
                .clients
                .send_error(target, &format!("Unknown server request: {kind}"));
        }
    }
}
