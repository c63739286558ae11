//! App registry for tracking installed and connected apps.
//!
//! Apps enter the registry either from a `manifest.json` discovered on disk
//! or by connecting to the hub and sending their manifest in `hello`. While
//! connected, the entry holds the sender used to push envelopes to the app.

use std::path::PathBuf;

use deskhub_types::{AppEnvelope, AppManifest, AppSummary};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{DaemonError, Result};
use crate::session::SessionId;

#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub manifest: AppManifest,
    pub enabled: bool,
    pub running: bool,
    pub sender: Option<mpsc::UnboundedSender<AppEnvelope>>,
    pub session: Option<SessionId>,
    /// Cancelled when the hub drops the connection (stop, disable, purge)
    pub cancel: Option<CancellationToken>,
    /// Install directory, `None` for apps that only ever connected
    pub dir: Option<PathBuf>,
}

impl App {
    #[must_use]
    pub fn new(manifest: AppManifest, dir: Option<PathBuf>) -> Self {
        Self {
            name: manifest.id.clone(),
            manifest,
            enabled: true,
            running: false,
            sender: None,
            session: None,
            cancel: None,
            dir,
        }
    }

    /// Drop the live connection, telling its reader loop to stop.
    fn disconnect(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.sender = None;
        self.session = None;
        self.running = false;
    }

    /// Enabled, has a launch command and supports the current OS.
    #[must_use]
    pub fn can_launch(&self) -> bool {
        self.enabled
            && self.manifest.command.is_some()
            && self.manifest.supports_platform(std::env::consts::OS)
    }

    #[must_use]
    pub fn summary(&self) -> AppSummary {
        AppSummary {
            name: self.name.clone(),
            enabled: self.enabled,
            running: self.running,
            manifest: self.manifest.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: Vec<App>,
}

impl AppRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an app. An app with the same name is replaced in place.
    pub fn register(&mut self, app: App) {
        match self.apps.iter_mut().find(|a| a.name == app.name) {
            Some(existing) => {
                debug!("[{}] Replacing registered app", app.name);
                *existing = app;
            }
            None => {
                debug!("[{}] Registering app", app.name);
                self.apps.push(app);
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut App> {
        self.apps
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| DaemonError::AppNotFound(name.to_string()))
    }

    /// Record a live connection for an app, registering it if unknown.
    ///
    /// Returns the token the connection's reader loop watches; it is
    /// cancelled once the hub stops the app or another connection for the
    /// same app replaces this one.
    pub fn attach(
        &mut self,
        name: &str,
        session: SessionId,
        sender: mpsc::UnboundedSender<AppEnvelope>,
        manifest: AppManifest,
    ) -> CancellationToken {
        if self.get(name).is_none() {
            self.register(App::new(manifest.clone(), None));
        }

        let token = CancellationToken::new();
        if let Ok(app) = self.get_mut(name) {
            if app.session.is_some() {
                debug!("[{}] New connection replaces the previous one", name);
            }
            app.disconnect();
            app.manifest = manifest;
            app.sender = Some(sender);
            app.session = Some(session);
            app.cancel = Some(token.clone());
            app.running = true;
            info!("[{}] App connected", name);
        }
        token
    }

    /// Whether `session` is the live connection of an enabled app `name`.
    #[must_use]
    pub fn is_attached(&self, name: &str, session: &SessionId) -> bool {
        self.get(name)
            .is_some_and(|a| a.enabled && a.session.as_ref() == Some(session))
    }

    /// Drop the connection of whichever app owns `session`.
    pub fn detach_session(&mut self, session: &SessionId) -> Option<String> {
        let app = self
            .apps
            .iter_mut()
            .find(|a| a.session.as_ref() == Some(session))?;

        app.disconnect();
        info!("[{}] App disconnected", app.name);
        Some(app.name.clone())
    }

    /// # Errors
    ///
    /// Returns `DaemonError::AppNotFound` if no app has this name.
    pub fn set_running(&mut self, name: &str, running: bool) -> Result<()> {
        let app = self.get_mut(name)?;
        if running {
            app.running = true;
        } else {
            app.disconnect();
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `DaemonError::AppNotFound` if no app has this name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let app = self.get_mut(name)?;
        app.enabled = enabled;
        info!(
            "[{}] App {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Apps in registration order.
    pub fn list_all(&self) -> impl Iterator<Item = &App> {
        self.apps.iter()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<AppSummary> {
        self.apps.iter().map(App::summary).collect()
    }

    pub fn purge(&mut self, name: &str) -> Option<App> {
        let index = self.apps.iter().position(|a| a.name == name)?;
        let mut app = self.apps.remove(index);
        app.disconnect();
        Some(app)
    }

    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.running)
    }

    /// Push an envelope to a connected app.
    ///
    /// # Errors
    ///
    /// Returns `AppNotFound` for unknown apps and `AppNotRunning` when the app
    /// has no live connection. Both are logged here.
    pub fn push(&self, name: &str, envelope: AppEnvelope) -> Result<()> {
        let Some(app) = self.get(name) else {
            warn!("[{}] Cannot send {}: app not found", name, envelope.kind);
            return Err(DaemonError::AppNotFound(name.to_string()));
        };

        let Some(sender) = &app.sender else {
            warn!(
                "[{}] Cannot send {}: app not running (is it connected?)",
                name, envelope.kind
            );
            return Err(DaemonError::AppNotRunning(name.to_string()));
        };

        trace!("[{}] Sending {}", name, envelope.kind);
        sender.send(envelope).map_err(|e| {
            warn!("[{}] Failed to send {}: channel closed", name, e.0.kind);
            DaemonError::AppNotRunning(name.to_string())
        })
    }
}
