//! Wire protocol for the hub socket.
//!
//! Every frame is a JSON object `{"kind": ..., "body": ...}`. The first
//! frame a peer sends must be `hello`, naming its role; the hub answers with
//! `welcome`. After that each role exchanges its own frame kind.

use deskhub_types::{AppEnvelope, AppManifest, AppSummary, ClientMessage, Settings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role a peer declares in its `hello` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// Hardware client device
    Client {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// App process registering itself
    App { manifest: AppManifest },

    /// Presentation layer that answers prompts and issues lifecycle commands
    Ui { name: String },
}

/// Commands a UI session sends to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    /// Answer to a `request_user_input` event
    UserInput { app: String, data: Value },
    CancelUserInput { app: String },
    StartApp { name: String },
    StopApp { name: String },
    EnableApp { name: String },
    DisableApp { name: String },
    PurgeApp { name: String },
    DisconnectClient { connection_id: String },
    SendToApp { app: String, envelope: AppEnvelope },
    SaveSettings { settings: Settings },
    /// Re-send config, settings and mappings to every client
    RefreshClients,
}

/// Severity of an app log line forwarded to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLogLevel {
    Message,
    Log,
    Error,
}

/// Events the hub sends to UI sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    RequestUserInput { app: String, scopes: Value },
    OpenUrl { app: String, url: String },
    AppLog {
        app: String,
        level: AppLogLevel,
        message: String,
    },
    Apps { apps: Vec<AppSummary> },
}

/// A single frame on the hub socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Frame {
    Hello(Role),
    Welcome { session_id: String },
    App(AppEnvelope),
    Client(ClientMessage),
    Ui(UiCommand),
    UiEvent(UiEvent),
}

impl Frame {
    /// Short name used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "hello",
            Frame::Welcome { .. } => "welcome",
            Frame::App(_) => "app",
            Frame::Client(_) => "client",
            Frame::Ui(_) => "ui",
            Frame::UiEvent(_) => "ui_event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_client_wire_format() {
        let frame = Frame::Hello(Role::Client { name: None });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, json!({"kind": "hello", "body": {"role": "client"}}));
    }

    #[test]
    fn test_hello_app_parses_manifest() {
        let frame: Frame = serde_json::from_value(json!({
            "kind": "hello",
            "body": {"role": "app", "manifest": {"id": "spotify", "label": "Spotify"}}
        }))
        .unwrap();

        match frame {
            Frame::Hello(Role::App { manifest }) => {
                assert_eq!(manifest.id, "spotify");
                assert_eq!(manifest.display_label(), "Spotify");
            }
            other => panic!("Expected app hello, got {other:?}"),
        }
    }

    #[test]
    fn test_app_frame_keeps_envelope_type_field() {
        let frame = Frame::App(AppEnvelope::new("log", json!("hi")));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            json!({"kind": "app", "body": {"type": "log", "payload": "hi"}})
        );
    }

    #[test]
    fn test_client_frame_parses() {
        let frame: Frame = serde_json::from_value(json!({
            "kind": "client",
            "body": {"app": "music", "type": "get", "request": "refresh"}
        }))
        .unwrap();

        let Frame::Client(msg) = frame else {
            panic!("Expected client frame");
        };
        assert_eq!(msg.app, "music");
        assert_eq!(msg.request.as_deref(), Some("refresh"));
        assert!(msg.payload.is_null());
    }

    #[test]
    fn test_ui_command_wire_format() {
        let frame = Frame::Ui(UiCommand::UserInput {
            app: "spotify".to_string(),
            data: json!({"client_id": "abc"}),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["body"]["command"], "user_input");
        assert_eq!(json["body"]["data"]["client_id"], "abc");
    }

    #[test]
    fn test_ui_refresh_clients_has_no_fields() {
        let frame: Frame = serde_json::from_value(json!({
            "kind": "ui",
            "body": {"command": "refresh_clients"}
        }))
        .unwrap();
        assert_eq!(frame, Frame::Ui(UiCommand::RefreshClients));
    }

    #[test]
    fn test_ui_event_app_log() {
        let event = UiEvent::AppLog {
            app: "weather".to_string(),
            level: AppLogLevel::Error,
            message: "offline".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "app_log");
        assert_eq!(json["level"], "error");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = serde_json::from_value::<Frame>(json!({"kind": "bogus", "body": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_kind_names() {
        assert_eq!(Frame::Welcome { session_id: "x".into() }.kind(), "welcome");
        assert_eq!(Frame::Ui(UiCommand::RefreshClients).kind(), "ui");
    }
}
