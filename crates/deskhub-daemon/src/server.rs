//! Socket server for the deskhub daemon.
//!
//! This module owns the shared hub state and accepts connections from
//! clients, apps and UI sessions. Each connection declares its role in a
//! `hello` frame and is then served by the matching loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use deskhub_core::{
    ConfigStore, DataStore, Directories, JsonConfigStore, JsonDataStore, KeyMapRegistry,
    SettingsStore,
};
use deskhub_rpc::{Frame, FrameCodec, Role, UiCommand, UiEvent};
use deskhub_types::{AppEnvelope, AppManifest, ClientMessage, Settings};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::clients::ClientBroadcaster;
use crate::error::{DaemonError, Result};
use crate::input::InputRequests;
use crate::launcher::{AppLauncher, discover_apps};
use crate::poller::PlaybackPoller;
use crate::registry::AppRegistry;
use crate::router::{MessageRouter, route_client_message};
use crate::session::{Session, SessionId};
use crate::settings_watcher::spawn_settings_watcher;
use crate::ui::UiBridge;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const SETTINGS_RELOAD_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub type SharedHub = Arc<RwLock<HubState>>;

type FrameSink = SplitSink<Framed<UnixStream, FrameCodec>, Frame>;
type FrameStream = SplitStream<Framed<UnixStream, FrameCodec>>;

pub struct HubState {
    pub apps: AppRegistry,
    pub clients: ClientBroadcaster,
    pub keymap: KeyMapRegistry,
    pub data: Box<dyn DataStore>,
    pub config: Box<dyn ConfigStore>,
    pub settings: SettingsStore,
    pub inputs: InputRequests,
    pub ui: UiBridge,
    pub launcher: AppLauncher,
    pub sessions: HashMap<SessionId, Session>,
}

impl HubState {
    /// Open the stores under `dirs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data or settings file exists but cannot be
    /// read.
    pub fn new(dirs: &Directories, socket_path: &Path) -> Result<Self> {
        Ok(Self {
            apps: AppRegistry::new(),
            clients: ClientBroadcaster::new(),
            keymap: KeyMapRegistry::load(&dirs.mappings_file),
            data: Box::new(JsonDataStore::open(&dirs.data_file)?),
            config: Box::new(JsonConfigStore::new(&dirs.config_file)),
            settings: SettingsStore::open(dirs.settings_file.clone())?,
            inputs: InputRequests::new(),
            ui: UiBridge::new(),
            launcher: AppLauncher::new(socket_path.to_path_buf()),
            sessions: HashMap::new(),
        })
    }

    pub fn router(&mut self) -> MessageRouter<'_> {
        let input_timeout = self.settings.get().input_timeout();
        MessageRouter {
            apps: &self.apps,
            keymap: &mut self.keymap,
            clients: &self.clients,
            data: &mut *self.data,
            config: &*self.config,
            inputs: &self.inputs,
            ui: &self.ui,
            input_timeout,
        }
    }

    /// Send app config, app settings and button mappings to one client, or
    /// to all of them.
    pub fn send_client_snapshot(&self, target: Option<&str>) {
        self.clients.send_config_data(&self.apps, target);
        self.clients
            .send_settings_data(&self.apps, &*self.data, target);
        self.clients.send_mappings(&self.keymap, target);
    }

    fn notify_apps_changed(&self) {
        self.ui.apps_changed(self.apps.summaries());
        self.clients.send_config_data(&self.apps, None);
    }

    /// Forget a closed connection.
    pub fn remove_session(&mut self, session_id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        match &session {
            Session::Client { .. } => {
                self.clients.remove(session_id.as_str());
            }
            Session::App { app } => {
                if self.apps.detach_session(session_id).is_some() {
                    self.inputs.cancel(app);
                    self.notify_apps_changed();
                }
            }
            Session::Ui { name } => {
                self.ui.remove(session_id);
                debug!("UI session {} closed", name);
            }
        }
        Some(session)
    }

    async fn stop_app(&mut self, name: &str) -> Result<()> {
        self.launcher.stop(name).await;
        self.apps.set_running(name, false)
    }

    /// Remove an app entirely: registry entry, process, stored data and
    /// mappings.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::AppNotFound` if no app has this name.
    pub async fn purge_app(&mut self, name: &str) -> Result<()> {
        let Some(app) = self.apps.purge(name) else {
            return Err(DaemonError::AppNotFound(name.to_string()));
        };

        self.launcher.stop(name).await;
        self.inputs.cancel(name);
        if let Err(e) = self.data.remove_data(name) {
            error!("[{}] Failed to remove app data: {}", name, e);
        }
        self.keymap.remove_source(name);
        self.clients.send_mappings(&self.keymap, None);
        self.notify_apps_changed();

        info!("[{}] App purged", app.name);
        Ok(())
    }

    /// Apply a command from a UI session.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed lifecycle or delivery step.
    pub async fn handle_ui_command(&mut self, command: UiCommand) -> Result<()> {
        match command {
            UiCommand::UserInput { app, data } => {
                self.router().complete_user_input(&app, data);
            }
            UiCommand::CancelUserInput { app } => {
                self.inputs.cancel(&app);
            }
            UiCommand::StartApp { name } => {
                let app = self
                    .apps
                    .get(&name)
                    .ok_or_else(|| DaemonError::AppNotFound(name.clone()))?;
                self.launcher.launch(app)?;
                self.notify_apps_changed();
            }
            UiCommand::StopApp { name } => {
                self.stop_app(&name).await?;
                self.notify_apps_changed();
            }
            UiCommand::EnableApp { name } => {
                self.apps.set_enabled(&name, true)?;
                self.notify_apps_changed();
            }
            UiCommand::DisableApp { name } => {
                self.apps.set_enabled(&name, false)?;
                self.stop_app(&name).await?;
                self.notify_apps_changed();
            }
            UiCommand::PurgeApp { name } => self.purge_app(&name).await?,
            UiCommand::DisconnectClient { connection_id } => {
                self.clients.disconnect(&connection_id)?;
            }
            UiCommand::SendToApp { app, envelope } => self.apps.push(&app, envelope)?,
            UiCommand::SaveSettings { settings } => self.settings.set(settings)?,
            UiCommand::RefreshClients => self.send_client_snapshot(None),
        }
        Ok(())
    }
}

/// Where the server listens and keeps its files.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub socket_path: PathBuf,
    pub dirs: Directories,
}

async fn settings_reload_task(settings_path: PathBuf, hub: SharedHub) {
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();

    let _watcher = spawn_settings_watcher(settings_path, reload_tx);

    while reload_rx.recv().await.is_some() {
        debug!("Settings reload event received");

        let Ok(state) = tokio::time::timeout(SETTINGS_RELOAD_LOCK_TIMEOUT, hub.read()).await
        else {
            error!("Settings reload timed out waiting for hub lock");
            continue;
        };

        match state.settings.reload() {
            Ok(true) => info!("Settings reloaded successfully"),
            Ok(false) => debug!("Settings file unchanged"),
            Err(e) => error!("Failed to reload settings: {}", e),
        }
    }

    debug!("Settings reload task ended");
}

async fn settings_change_task(
    mut settings_rx: watch::Receiver<Settings>,
    poller: Arc<Mutex<PlaybackPoller>>,
) {
    while settings_rx.changed().await.is_ok() {
        let settings = settings_rx.borrow_and_update().clone();
        debug!("Applying settings change");
        poller.lock().await.on_settings_changed(&settings);
    }
}

async fn app_health_monitor(hub: SharedHub, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        hub.write().await.launcher.check_and_restart();
    }

    debug!("App health monitor stopped");
}

/// Run the hub until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if another hub owns the socket, or socket or store
/// setup fails.
pub async fn run(options: ServerOptions, shutdown: CancellationToken) -> Result<()> {
    let ServerOptions {
        socket_path: path,
        dirs,
    } = options;

    dirs.ensure_exists()?;
    cleanup_stale_socket(&path).await?;

    let listener = UnixListener::bind(&path)?;
    info!("Hub listening on {:?}", path);

    let mut state = HubState::new(&dirs, &path)?;
    let found = discover_apps(&dirs.apps, &mut state.apps);
    info!("Discovered {} apps in {:?}", found, dirs.apps);
    state.launcher.launch_all(&state.apps);

    let settings = state.settings.get();
    let settings_rx = state.settings.subscribe();
    let hub: SharedHub = Arc::new(RwLock::new(state));

    let poller = Arc::new(Mutex::new(PlaybackPoller::new(Arc::clone(&hub))));
    poller.lock().await.on_settings_changed(&settings);

    tokio::spawn(settings_reload_task(
        dirs.settings_file.clone(),
        Arc::clone(&hub),
    ));
    tokio::spawn(settings_change_task(settings_rx, Arc::clone(&poller)));
    tokio::spawn(app_health_monitor(Arc::clone(&hub), shutdown.clone()));

    info!("Ready to accept connections");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested, stopping server");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("Accepted connection");
                    let hub = Arc::clone(&hub);
                    let poller = Arc::clone(&poller);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, hub, poller).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    poller.lock().await.shutdown();
    hub.write().await.launcher.stop_all().await;

    if path.exists()
        && let Err(e) = std::fs::remove_file(&path)
    {
        warn!("Failed to remove socket file {:?}: {}", path, e);
    }

    Ok(())
}

async fn cleanup_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "Another hub is already running",
            )));
        }
        info!("Removing stale socket at {}", path.display());
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn spawn_writer<T, F>(
    session_id: SessionId,
    mut sink: FrameSink,
    mut rx: mpsc::UnboundedReceiver<T>,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> Frame + Send + 'static,
{
    tokio::spawn(async move {
        trace!("[{}] send_task started", session_id);
        while let Some(item) = rx.recv().await {
            let frame = wrap(item);
            trace!("[{}] send_task: sending {}", session_id, frame.kind());
            if let Err(e) = sink.send(frame).await {
                warn!("Failed to send to {}: {}", session_id, e);
                break;
            }
        }
        trace!("[{}] send_task ended", session_id);
    })
}

async fn welcome(sink: &mut FrameSink, session_id: &SessionId) -> Result<()> {
    sink.send(Frame::Welcome {
        session_id: session_id.to_string(),
    })
    .await?;
    Ok(())
}

/// Read the next frame. A malformed body comes back as
/// `DaemonError::Malformed` and the stream stays usable; any other error
/// ends the connection.
async fn next_frame(stream: &mut FrameStream) -> Option<Result<Frame>> {
    stream.next().await.map(|read| match read {
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(malformed)) => Err(DaemonError::Malformed(malformed)),
        Err(e) => Err(DaemonError::Codec(e)),
    })
}

async fn handle_connection(
    stream: UnixStream,
    hub: SharedHub,
    poller: Arc<Mutex<PlaybackPoller>>,
) -> Result<()> {
    let framed = Framed::new(stream, FrameCodec::new());
    let (sink, mut stream) = framed.split();

    let session_id = SessionId::new();
    debug!("New connection: {}", session_id);

    let role = match tokio::time::timeout(HELLO_TIMEOUT, next_frame(&mut stream)).await {
        Ok(Some(Ok(Frame::Hello(role)))) => role,
        Ok(Some(Ok(frame))) => {
            warn!("[{}] Expected hello, got {}", session_id, frame.kind());
            return Ok(());
        }
        Ok(Some(Err(e))) => return Err(e),
        Ok(None) => {
            debug!("[{}] Closed before hello", session_id);
            return Ok(());
        }
        Err(_) => {
            warn!("[{}] No hello within {:?}", session_id, HELLO_TIMEOUT);
            return Ok(());
        }
    };

    match role {
        Role::Client { name } => serve_client(session_id, name, sink, stream, hub, poller).await,
        Role::App { manifest } => serve_app(session_id, manifest, sink, stream, hub).await,
        Role::Ui { name } => serve_ui(session_id, name, sink, stream, hub).await,
    }
}

async fn serve_client(
    session_id: SessionId,
    name: Option<String>,
    mut sink: FrameSink,
    mut stream: FrameStream,
    hub: SharedHub,
    poller: Arc<Mutex<PlaybackPoller>>,
) -> Result<()> {
    let id = session_id.to_string();
    let (tx, rx) = mpsc::unbounded_channel::<ClientMessage>();
    let token = CancellationToken::new();

    {
        let mut state = hub.write().await;
        state.clients.connect(&id, tx, token.clone());
        state
            .sessions
            .insert(session_id.clone(), Session::Client { name });
    }

    if let Err(e) = welcome(&mut sink, &session_id).await {
        hub.write().await.remove_session(&session_id);
        return Err(e);
    }
    let send_task = spawn_writer(session_id.clone(), sink, rx, Frame::Client);

    {
        let mut state = hub.write().await;
        state.clients.mark_ready(&id);
        state.send_client_snapshot(Some(&id));
    }

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!("[{}] Client connection cancelled", id);
                break;
            }
            frame = next_frame(&mut stream) => match frame {
                Some(Ok(Frame::Client(msg))) => {
                    route_client_message(&hub, &poller, &id, msg).await;
                }
                Some(Ok(other)) => {
                    warn!("[{}] Unexpected {} frame from client", id, other.kind());
                }
                Some(Err(e @ DaemonError::Malformed(_))) => {
                    warn!("[{}] {}", id, e);
                    hub.read().await.clients.send_error(Some(&id), &e.to_string());
                }
                Some(Err(e)) => {
                    warn!("Read error from {}: {}", id, e);
                    break;
                }
                None => break,
            }
        }
    }

    debug!("Connection closed: {}", session_id);
    hub.write().await.remove_session(&session_id);
    send_task.abort();

    Ok(())
}

async fn serve_app(
    session_id: SessionId,
    manifest: AppManifest,
    mut sink: FrameSink,
    mut stream: FrameStream,
    hub: SharedHub,
) -> Result<()> {
    let name = manifest.id.clone();
    if name.is_empty() {
        warn!("[{}] App hello without an id, closing", session_id);
        return Ok(());
    }

    {
        let state = hub.read().await;
        if state.apps.get(&name).is_some_and(|app| !app.enabled) {
            warn!("[{}] Rejecting connection from disabled app", name);
            return Err(DaemonError::AppDisabled(name));
        }
    }

    welcome(&mut sink, &session_id).await?;

    let (tx, rx) = mpsc::unbounded_channel::<AppEnvelope>();
    let send_task = spawn_writer(session_id.clone(), sink, rx, Frame::App);

    let token = {
        let mut state = hub.write().await;
        let token = state.apps.attach(&name, session_id.clone(), tx, manifest);
        state
            .sessions
            .insert(session_id.clone(), Session::App { app: name.clone() });
        state.notify_apps_changed();
        token
    };

    loop {
        let frame = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("[{}] App connection dropped by the hub", name);
                break;
            }
            frame = next_frame(&mut stream) => frame,
        };

        match frame {
            Some(Ok(Frame::App(envelope))) => {
                let mut state = hub.write().await;
                // A stop or disable may have landed while this frame was read
                if !state.apps.is_attached(&name, &session_id) {
                    debug!("[{}] Dropping {} from detached connection", name, envelope.kind);
                    break;
                }
                state.router().dispatch(&name, envelope);
            }
            Some(Ok(other)) => {
                warn!("[{}] Unexpected {} frame from app", name, other.kind());
            }
            Some(Err(e @ DaemonError::Malformed(_))) => {
                warn!("[{}] {}", name, e);
                let state = hub.read().await;
                // push logs its own failures
                let _ = state.apps.push(&name, AppEnvelope::error(e.to_string()));
            }
            Some(Err(e)) => {
                warn!("[{}] Read error: {}", name, e);
                break;
            }
            None => break,
        }
    }

    debug!("Connection closed: {}", session_id);
    hub.write().await.remove_session(&session_id);
    send_task.abort();

    Ok(())
}

async fn serve_ui(
    session_id: SessionId,
    name: String,
    mut sink: FrameSink,
    mut stream: FrameStream,
    hub: SharedHub,
) -> Result<()> {
    welcome(&mut sink, &session_id).await?;

    let (tx, rx) = mpsc::unbounded_channel::<UiEvent>();
    let send_task = spawn_writer(session_id.clone(), sink, rx, Frame::UiEvent);

    {
        let mut state = hub.write().await;
        let _ = tx.send(UiEvent::Apps {
            apps: state.apps.summaries(),
        });
        state.ui.connect(session_id.clone(), tx);
        state
            .sessions
            .insert(session_id.clone(), Session::Ui { name: name.clone() });
    }
    info!("UI session {} connected", name);

    while let Some(result) = next_frame(&mut stream).await {
        match result {
            Ok(Frame::Ui(command)) => {
                let mut state = hub.write().await;
                if let Err(e) = state.handle_ui_command(command).await {
                    warn!("[{}] UI command failed: {}", name, e);
                }
            }
            Ok(other) => {
                warn!("[{}] Unexpected {} frame from UI", name, other.kind());
            }
            Err(e @ DaemonError::Malformed(_)) => {
                warn!("[{}] {}", name, e);
            }
            Err(e) => {
                warn!("[{}] Read error: {}", name, e);
                break;
            }
        }
    }

    debug!("Connection closed: {}", session_id);
    hub.write().await.remove_session(&session_id);
    send_task.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhub_types::{ActionDraft, KeyDraft};
    use serde_json::json;
    use tempfile::TempDir;

    fn state() -> (HubState, TempDir) {
        let dir = TempDir::new().unwrap();
        let dirs = Directories::with_base(dir.path().to_path_buf());
        let state = HubState::new(&dirs, &dir.path().join("hub.sock")).unwrap();
        (state, dir)
    }

    fn connect_app(
        state: &mut HubState,
        name: &str,
    ) -> (SessionId, mpsc::UnboundedReceiver<AppEnvelope>) {
        let session = SessionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .apps
            .attach(name, session.clone(), tx, AppManifest::new(name));
        state.sessions.insert(
            session.clone(),
            Session::App {
                app: name.to_string(),
            },
        );
        (session, rx)
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let (mut state, _dir) = state();
        let (_session, _rx) = connect_app(&mut state, "spotify");

        state
            .data
            .set_data("spotify", json!({"token": "x"}))
            .unwrap();
        state.keymap.add_key(
            KeyDraft {
                id: Some("play".to_string()),
                ..KeyDraft::default()
            }
            .into_key("spotify"),
        );
        state.keymap.add_action(
            ActionDraft {
                id: Some("skip".to_string()),
                ..ActionDraft::default()
            }
            .into_action("spotify"),
        );
        state.keymap.add_key(
            KeyDraft {
                id: Some("dial".to_string()),
                ..KeyDraft::default()
            }
            .into_key("volume"),
        );

        state.purge_app("spotify").await.unwrap();

        assert!(state.apps.get("spotify").is_none());
        assert_eq!(state.data.get_data("spotify").unwrap(), None);
        let mapping = state.keymap.get_mapping();
        assert_eq!(mapping.keys.len(), 1);
        assert_eq!(mapping.keys[0].id, "dial");
        assert!(mapping.actions.is_empty());

        assert!(matches!(
            state.purge_app("spotify").await,
            Err(DaemonError::AppNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_app_session_marks_not_running() {
        let (mut state, _dir) = state();
        let (session, _rx) = connect_app(&mut state, "spotify");
        assert!(state.apps.is_running("spotify"));

        let removed = state.remove_session(&session);
        assert_eq!(
            removed,
            Some(Session::App {
                app: "spotify".to_string()
            })
        );
        assert!(!state.apps.is_running("spotify"));
        assert!(state.remove_session(&session).is_none());
    }

    #[tokio::test]
    async fn test_ui_user_input_reaches_app() {
        let (mut state, _dir) = state();
        let (_session, mut rx) = connect_app(&mut state, "spotify");

        state.inputs.begin("spotify", Duration::from_secs(60));
        state
            .handle_ui_command(UiCommand::UserInput {
                app: "spotify".to_string(),
                data: json!({"code": "1234"}),
            })
            .await
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            AppEnvelope::new("input", json!({"code": "1234"}))
        );
    }

    #[tokio::test]
    async fn test_ui_disable_app_stops_it() {
        let (mut state, _dir) = state();
        let (_session, _rx) = connect_app(&mut state, "spotify");

        state
            .handle_ui_command(UiCommand::DisableApp {
                name: "spotify".to_string(),
            })
            .await
            .unwrap();

        let app = state.apps.get("spotify").unwrap();
        assert!(!app.enabled);
        assert!(!app.running);
        assert!(app.sender.is_none());
    }

    #[tokio::test]
    async fn test_ui_unknown_app_errors() {
        let (mut state, _dir) = state();
        let result = state
            .handle_ui_command(UiCommand::StartApp {
                name: "nope".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DaemonError::AppNotFound(_))));
    }

    #[tokio::test]
    async fn test_ui_disconnect_client() {
        let (mut state, _dir) = state();
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        state.clients.connect("c1", tx, token.clone());

        state
            .handle_ui_command(UiCommand::DisconnectClient {
                connection_id: "c1".to_string(),
            })
            .await
            .unwrap();
        assert!(token.is_cancelled());

        let result = state
            .handle_ui_command(UiCommand::DisconnectClient {
                connection_id: "c1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DaemonError::ClientNotFound(_))));
    }

    #[tokio::test]
    async fn test_ui_save_settings_notifies() {
        let (mut state, _dir) = state();
        let mut rx = state.settings.subscribe();

        let settings = Settings {
            refresh_interval: 2500,
            ..Settings::default()
        };
        state
            .handle_ui_command(UiCommand::SaveSettings {
                settings: settings.clone(),
            })
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), settings);
    }

    #[tokio::test]
    async fn test_refresh_clients_sends_snapshot() {
        let (mut state, _dir) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.clients.connect("c1", tx, CancellationToken::new());
        state.clients.mark_ready("c1");

        state
            .handle_ui_command(UiCommand::RefreshClients)
            .await
            .unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.kind)
            .collect();
        assert_eq!(kinds, vec!["config", "settings", "button_mappings"]);
    }

    #[tokio::test]
    async fn test_stale_socket_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, "").unwrap();

        cleanup_stale_socket(&path).await.unwrap();
        assert!(!path.exists());
    }
}
