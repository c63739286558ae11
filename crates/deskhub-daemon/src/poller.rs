//! Periodic now-playing refresh.
//!
//! The hub keeps one playback app selected. Every refresh interval the
//! poller sends that app a `get refresh` envelope; the app answers by
//! relaying its current track to clients as `data`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskhub_types::{AppEnvelope, ClientMessage, Settings};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::server::SharedHub;

pub struct PlaybackPoller {
    hub: SharedHub,
    current_app: Arc<Mutex<Option<String>>>,
    timer: Option<JoinHandle<()>>,
}

fn read_current(current: &Mutex<Option<String>>) -> Option<String> {
    let Ok(guard) = current.lock() else {
        error!("Playback selection poisoned");
        return None;
    };
    guard.clone()
}

async fn refresh(hub: &SharedHub, current: &Mutex<Option<String>>) {
    let Some(app) = read_current(current) else {
        error!("No playback app selected, skipping refresh");
        return;
    };

    let state = hub.read().await;
    if !state.apps.is_running(&app) {
        error!("[{}] Playback app not found or not running", app);
    }

    match state.apps.push(&app, AppEnvelope::refresh()) {
        Ok(()) => debug!("[{}] Refreshing playback data", app),
        Err(e) => error!("[{}] Playback refresh failed: {}", app, e),
    }
}

impl PlaybackPoller {
    #[must_use]
    pub fn new(hub: SharedHub) -> Self {
        Self {
            hub,
            current_app: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Reschedule the refresh timer. A negative interval disables polling;
    /// zero is treated as one millisecond.
    pub fn set_interval(&mut self, ms: i64) {
        self.cancel_timer();

        if ms < 0 {
            info!("Playback refresh cancelled (interval {}ms)", ms);
            return;
        }

        let period = Duration::from_millis(ms.max(1).unsigned_abs());
        let start = Instant::now() + period;
        let hub = Arc::clone(&self.hub);
        let current = Arc::clone(&self.current_app);

        self.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                refresh(&hub, &current).await;
            }
        }));

        debug!("Playback refresh every {:?}", period);
    }

    /// Apply new settings: reschedule, and retarget when the playback
    /// location names a different app.
    pub fn on_settings_changed(&mut self, settings: &Settings) {
        self.set_interval(settings.refresh_interval);

        if let Some(location) = settings
            .playback_location
            .as_deref()
            .filter(|l| !l.is_empty())
            && self.current_app().as_deref() != Some(location)
        {
            self.set_current_app(Some(location.to_string()));
        }
    }

    pub fn set_current_app(&self, app: Option<String>) {
        let Ok(mut current) = self.current_app.lock() else {
            error!("Playback selection poisoned, ignoring change");
            return;
        };
        info!("Playback app set to {:?}", app);
        *current = app;
    }

    #[must_use]
    pub fn current_app(&self) -> Option<String> {
        read_current(&self.current_app)
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.timer.is_some()
    }

    /// Forward a `music` request from a client to the playback app.
    pub async fn handle_client_request(&self, msg: &ClientMessage) {
        match msg.app.as_str() {
            "music" => {}
            "utility" => warn!(
                "Client used the legacy app name 'utility', migrate to 'music'"
            ),
            _ => return,
        }

        let Some(app) = self.current_app() else {
            warn!("No playback app selected, dropping {} request", msg.kind);
            return;
        };

        debug!(
            "[{}] Playback request {} {}",
            app,
            msg.kind,
            msg.request.as_deref().unwrap_or("-")
        );

        let envelope = AppEnvelope {
            kind: msg.kind.clone(),
            request: msg.request.clone(),
            payload: Some(msg.payload.clone()),
        };

        let state = self.hub.read().await;
        // push logs its own failures
        let _ = state.apps.push(&app, envelope);
    }

    pub fn shutdown(&mut self) {
        self.cancel_timer();
        debug!("Playback poller stopped");
    }
}

impl Drop for PlaybackPoller {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
