//! Session types for hub connections.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a connection registered as in its `hello` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Client { name: Option<String> },
    App { app: String },
    Ui { name: String },
}

impl Session {
    #[must_use]
    pub fn app_name(&self) -> Option<&str> {
        match self {
            Session::App { app } => Some(app),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ui(&self) -> bool {
        matches!(self, Session::Ui { .. })
    }

    #[must_use]
    pub fn is_client(&self) -> bool {
        matches!(self, Session::Client { .. })
    }

    /// Short label for log lines.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Session::Client { name: Some(name) } => format!("client {name}"),
            Session::Client { name: None } => "client".to_string(),
            Session::App { app } => format!("app {app}"),
            Session::Ui { name } => format!("ui {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_from_string() {
        let id = SessionId::from("abc-123".to_string());
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_session_id_equality() {
        assert_eq!(SessionId::from("same"), SessionId::from("same"));
        assert_ne!(SessionId::from("one"), SessionId::from("two"));
    }

    #[test]
    fn test_session_app_name() {
        let session = Session::App {
            app: "spotify".to_string(),
        };
        assert_eq!(session.app_name(), Some("spotify"));
        assert!(!session.is_ui());
        assert_eq!(session.label(), "app spotify");
    }

    #[test]
    fn test_session_kinds() {
        let ui = Session::Ui {
            name: "desktop".to_string(),
        };
        assert!(ui.is_ui());
        assert!(ui.app_name().is_none());

        let client = Session::Client { name: None };
        assert!(client.is_client());
        assert_eq!(client.label(), "client");
    }
}
