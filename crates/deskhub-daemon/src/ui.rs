//! Bridge to connected UI sessions.
//!
//! The UI renders prompts and log lines for the user. The hub fans every
//! event out to all UI sessions; most deployments run exactly one.

use std::collections::HashMap;

use deskhub_rpc::{AppLogLevel, UiEvent};
use deskhub_types::AppSummary;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::SessionId;

#[derive(Debug, Default)]
pub struct UiBridge {
    sessions: HashMap<SessionId, mpsc::UnboundedSender<UiEvent>>,
}

impl UiBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, session: SessionId, sender: mpsc::UnboundedSender<UiEvent>) {
        debug!("UI session connected: {}", session);
        self.sessions.insert(session, sender);
    }

    pub fn remove(&mut self, session: &SessionId) -> bool {
        self.sessions.remove(session).is_some()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Returns how many sessions received the event.
    pub fn emit(&self, event: &UiEvent) -> usize {
        self.sessions
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Ask the user to open `url` on behalf of `app`.
    pub fn open_url(&self, app: &str, url: &str) -> bool {
        let delivered = self.emit(&UiEvent::OpenUrl {
            app: app.to_string(),
            url: url.to_string(),
        });
        if delivered == 0 {
            warn!("[{}] No UI connected to open {}", app, url);
        }
        delivered > 0
    }

    /// Show an input form for `app`. Returns `false` when no UI is
    /// connected to answer it.
    pub fn request_user_input(&self, app: &str, scopes: &Value) -> bool {
        let delivered = self.emit(&UiEvent::RequestUserInput {
            app: app.to_string(),
            scopes: scopes.clone(),
        });
        if delivered == 0 {
            warn!("[{}] No UI connected to answer input request", app);
        }
        delivered > 0
    }

    pub fn app_log(&self, app: &str, level: AppLogLevel, message: &str) {
        self.emit(&UiEvent::AppLog {
            app: app.to_string(),
            level,
            message: message.to_string(),
        });
    }

    pub fn apps_changed(&self, apps: Vec<AppSummary>) {
        self.emit(&UiEvent::Apps { apps });
    }
}
