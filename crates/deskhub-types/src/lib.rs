//! Shared types for deskhub components.
//!
//! This crate provides the types exchanged between apps, the hub, connected
//! clients and the UI session. Everything here is serializable so it can be
//! carried over the hub socket unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Fallback values used when an app registers a button or action with
/// missing (or empty) fields.
pub mod defaults {
    pub const KEY_ID: &str = "unsetid";
    pub const KEY_DESCRIPTION: &str = "Default Description";
    pub const ACTION_NAME: &str = "Default Name";
    pub const ACTION_DESCRIPTION: &str = "No description provided";
    pub const VERSION: &str = "0.0.0";
}

/// Error text sent back to an app that asked for config without a key.
pub const MISSING_CONFIG_KEY: &str = "The type of config to retrieve was undefined!";

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    defaults::VERSION.to_string()
}

/// Render a payload the way it should appear in a log line.
#[must_use]
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Message unit exchanged between an app and the hub.
///
/// The origin app is never part of the envelope; the hub knows which
/// connection the envelope arrived on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl AppEnvelope {
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            request: None,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }

    /// The `get refresh` envelope the playback poller sends on every tick.
    #[must_use]
    pub fn refresh() -> Self {
        Self::new("get", Value::String(String::new())).with_request("refresh")
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", Value::String(message.into()))
    }
}

/// Message sent to (or received from) a connected client device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub app: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl ClientMessage {
    #[must_use]
    pub fn new(app: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            app: app.into(),
            kind: kind.into(),
            payload,
            request: None,
        }
    }

    #[must_use]
    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }
}

/// Input gesture a key binding reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventMode {
    KeyUp,
    KeyDown,
    ScrollUp,
    ScrollDown,
    ScrollLeft,
    ScrollRight,
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    PressShort,
    PressLong,
}

/// A physical button registered by an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub description: String,
    pub source: String,
    pub version: String,
    pub enabled: bool,
    #[serde(rename = "Modes", default)]
    pub modes: Vec<EventMode>,
}

/// An invocable capability registered by an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub value_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub version: String,
    pub enabled: bool,
    pub source: String,
}

/// Key fields as an app sends them; missing fields are defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "Modes", default)]
    pub modes: Option<Vec<EventMode>>,
}

impl KeyDraft {
    #[must_use]
    pub fn into_key(self, source: &str) -> Key {
        Key {
            id: or_default(self.id, defaults::KEY_ID),
            description: or_default(self.description, defaults::KEY_DESCRIPTION),
            source: source.to_string(),
            version: or_default(self.version, defaults::VERSION),
            enabled: true,
            modes: self.modes.unwrap_or_default(),
        }
    }
}

/// Action fields as an app sends them; missing fields are defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_options: Option<Vec<String>>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl ActionDraft {
    #[must_use]
    pub fn into_action(self, source: &str) -> Action {
        Action {
            id: or_default(self.id, defaults::KEY_ID),
            name: or_default(self.name, defaults::ACTION_NAME),
            description: or_default(self.description, defaults::ACTION_DESCRIPTION),
            value: self.value.filter(|v| !v.is_empty()),
            value_options: self.value_options.unwrap_or_default(),
            icon: self.icon.filter(|v| !v.is_empty()),
            version: or_default(self.version, defaults::VERSION),
            enabled: true,
            source: source.to_string(),
        }
    }
}

/// The full button/action catalog as sent to clients and persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    #[serde(default)]
    pub keys: Vec<Key>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// App manifest, read from `manifest.json` or sent by the app when it
/// connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default = "default_true")]
    pub is_web_app: bool,
    /// Command that launches the app; it connects back to the hub socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_platforms: Option<Vec<String>>,
}

impl AppManifest {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            version: default_version(),
            description: None,
            author: None,
            is_web_app: true,
            command: None,
            supported_platforms: None,
        }
    }

    #[must_use]
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// An app without a platform list runs everywhere.
    #[must_use]
    pub fn supports_platform(&self, platform: &str) -> bool {
        match &self.supported_platforms {
            None => true,
            Some(platforms) => platforms.iter().any(|p| p.eq_ignore_ascii_case(platform)),
        }
    }
}

/// App state as reported to clients and the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub name: String,
    pub enabled: bool,
    pub running: bool,
    pub manifest: AppManifest,
}

fn default_refresh_interval() -> i64 {
    15_000
}

fn default_input_timeout() -> u64 {
    300
}

/// Hub settings. A negative refresh interval disables playback polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_location: Option<String>,

    #[serde(default, rename = "globalADB")]
    pub global_adb: bool,

    /// How long a user-input prompt waits for an answer.
    #[serde(default = "default_input_timeout")]
    pub input_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            playback_location: None,
            global_adb: false,
            input_timeout_secs: default_input_timeout(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }
}

/// Payload of a `data` envelope, relayed to clients.
///
/// An object payload is read as `{app?, type?, request?, payload}` and only
/// its inner `payload` reaches clients; an object without that key relays
/// `null`. Any other JSON value is relayed as-is. Fields the app leaves out
/// are filled from the envelope at relay time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataRelay {
    #[serde(default)]
    pub app: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl DataRelay {
    #[must_use]
    pub fn into_client_message(self, origin: &str, envelope_request: Option<&str>) -> ClientMessage {
        ClientMessage {
            app: or_default(self.app, origin),
            kind: or_default(self.kind, "data"),
            payload: self.payload.unwrap_or(Value::Null),
            request: self
                .request
                .filter(|r| !r.is_empty())
                .or_else(|| envelope_request.map(String::from)),
        }
    }
}

/// An app envelope after validation, one variant per supported
/// `type`/`request` combination.
#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    Message(Value),
    GetData,
    GetConfig { key: String },
    GetInput { scopes: Value },
    Set(Value),
    Add(Map<String, Value>),
    Open { url: String },
    Data {
        relay: DataRelay,
        request: Option<String>,
    },
    ToApp {
        target: String,
        envelope: AppEnvelope,
    },
    Error(Value),
    Log(Value),
    ButtonAdd(KeyDraft),
    ButtonRemove { id: String },
    ActionAdd(ActionDraft),
    ActionRemove { id: String },
    ActionUpdate { id: String, icon: Option<String> },
    /// Known type with a request the hub does not handle.
    Unsupported { kind: String, request: Option<String> },
    Unknown { kind: String },
}

/// Why an envelope was rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEnvelope {
    pub kind: String,
    pub request: Option<String>,
    pub reason: String,
}

impl MalformedEnvelope {
    /// `get` requests have an origin waiting for an answer.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.kind == "get"
    }
}

impl std::fmt::Display for MalformedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.request {
            Some(request) => write!(f, "{} {}: {}", self.kind, request, self.reason),
            None => write!(f, "{}: {}", self.kind, self.reason),
        }
    }
}

impl std::error::Error for MalformedEnvelope {}

fn payload_id(payload: Option<&Value>) -> Option<String> {
    payload
        .and_then(|p| p.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
}

impl AppMessage {
    /// Validate an envelope into its typed form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEnvelope` when a required request or payload field
    /// is missing or has the wrong shape.
    // One arm per envelope type keeps the table readable
    #[allow(clippy::too_many_lines)]
    pub fn parse(envelope: AppEnvelope) -> Result<Self, MalformedEnvelope> {
        let AppEnvelope {
            kind,
            request,
            payload,
        } = envelope;
        let payload = payload.filter(|p| !p.is_null());

        let malformed = |reason: &str| MalformedEnvelope {
            kind: kind.clone(),
            request: request.clone(),
            reason: reason.to_string(),
        };

        let message = match kind.as_str() {
            "message" => Self::Message(payload.unwrap_or(Value::Null)),
            "error" => Self::Error(payload.unwrap_or(Value::Null)),
            "log" => Self::Log(payload.unwrap_or(Value::Null)),
            "get" => match request.as_deref() {
                Some("data") => Self::GetData,
                Some("config") => match payload {
                    Some(Value::String(key)) if !key.is_empty() => Self::GetConfig { key },
                    Some(Value::String(_)) | None => return Err(malformed(MISSING_CONFIG_KEY)),
                    Some(_) => return Err(malformed("config key must be a string")),
                },
                Some("input") => match payload {
                    Some(scopes) => Self::GetInput { scopes },
                    None => return Err(malformed("missing input scopes")),
                },
                _ => Self::Unsupported {
                    kind: kind.clone(),
                    request: request.clone(),
                },
            },
            "set" => match payload {
                Some(value) => Self::Set(value),
                None => return Err(malformed("missing payload")),
            },
            "add" => match payload {
                Some(Value::Object(map)) => Self::Add(map),
                Some(_) => return Err(malformed("payload must be an object")),
                None => return Err(malformed("missing payload")),
            },
            "open" => match payload {
                Some(Value::String(url)) if !url.is_empty() => Self::Open { url },
                _ => return Err(malformed("missing url")),
            },
            "data" => match payload {
                Some(value) => {
                    let relay = if value.is_object() {
                        serde_json::from_value::<DataRelay>(value)
                            .map_err(|e| malformed(&e.to_string()))?
                    } else {
                        DataRelay {
                            payload: Some(value),
                            ..DataRelay::default()
                        }
                    };
                    Self::Data {
                        relay,
                        request: request.clone(),
                    }
                }
                None => return Err(malformed("App data malformed")),
            },
            "toApp" => match (request.as_deref(), payload) {
                (Some(target), Some(value)) if !target.is_empty() => {
                    let envelope = serde_json::from_value::<AppEnvelope>(value)
                        .map_err(|e| malformed(&format!("App data malformed: {e}")))?;
                    Self::ToApp {
                        target: target.to_string(),
                        envelope,
                    }
                }
                _ => return Err(malformed("App data malformed")),
            },
            "button" => match request.as_deref() {
                Some("add") => match payload {
                    Some(value @ Value::Object(_)) => Self::ButtonAdd(
                        serde_json::from_value(value).map_err(|e| malformed(&e.to_string()))?,
                    ),
                    _ => return Err(malformed("button payload must be an object")),
                },
                Some("remove") => match payload_id(payload.as_ref()) {
                    Some(id) => Self::ButtonRemove { id },
                    None => return Err(malformed("missing button id")),
                },
                _ => Self::Unsupported {
                    kind: kind.clone(),
                    request: request.clone(),
                },
            },
            "action" => match request.as_deref() {
                Some("add") => match payload {
                    Some(value @ Value::Object(_)) => Self::ActionAdd(
                        serde_json::from_value(value).map_err(|e| malformed(&e.to_string()))?,
                    ),
                    _ => return Err(malformed("action payload must be an object")),
                },
                Some("remove") => match payload_id(payload.as_ref()) {
                    Some(id) => Self::ActionRemove { id },
                    None => return Err(malformed("missing action id")),
                },
                Some("update") => match payload_id(payload.as_ref()) {
                    Some(id) => {
                        let icon = payload
                            .as_ref()
                            .and_then(|p| p.get("icon"))
                            .and_then(Value::as_str)
                            .map(String::from);
                        Self::ActionUpdate { id, icon }
                    }
                    None => return Err(malformed("missing action id")),
                },
                _ => Self::Unsupported {
                    kind: kind.clone(),
                    request: request.clone(),
                },
            },
            _ => Self::Unknown { kind: kind.clone() },
        };

        Ok(message)
    }
}


/// Property-based tests for envelope validation.
#[cfg(test)]
mod proptest_parse_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn arb_id() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[a-zA-Z0-9_\\-]{1,32}")
            .unwrap()
            .boxed()
    }

    proptest! {
        #[test]
        fn button_add_keeps_id_and_source(id in arb_id(), source in arb_id()) {
            let env: AppEnvelope = serde_json::from_value(json!({
                "type": "button",
                "request": "add",
                "payload": {"id": id.clone()}
            })).unwrap();

            let Ok(AppMessage::ButtonAdd(draft)) = AppMessage::parse(env) else {
                return Err(TestCaseError::fail("expected ButtonAdd"));
            };
            let key = draft.into_key(&source);
            prop_assert_eq!(key.id, id);
            prop_assert_eq!(key.source, source);
            prop_assert!(key.enabled);
        }

        #[test]
        fn unknown_types_never_fail(kind in "[a-z]{1,12}") {
            let known = [
                "message", "get", "set", "add", "open", "data", "toApp",
                "error", "log", "button", "action",
            ];
            prop_assume!(!known.contains(&kind.as_str()));
            let env = AppEnvelope::new(kind.clone(), json!(null));
            prop_assert_eq!(AppMessage::parse(env), Ok(AppMessage::Unknown { kind }));
        }
    }
}
