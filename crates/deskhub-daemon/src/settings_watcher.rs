//! Settings file watcher for hot-reload support.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::Watcher;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info};

use crate::error::{DaemonError, Result};

const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(100);
const SETTINGS_DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

pub struct SettingsWatcher {
    _watcher_thread: std::thread::JoinHandle<()>,
    _bridge_thread: std::thread::JoinHandle<()>,
}

/// Watch `settings_path` and send `()` on `tx` after each settled change.
pub fn spawn_settings_watcher(
    settings_path: PathBuf,
    tx: tokio_mpsc::UnboundedSender<()>,
) -> SettingsWatcher {
    let (sync_tx, sync_rx) = mpsc::channel::<()>();

    let watcher_thread = std::thread::spawn(move || {
        if let Err(e) = watch_settings_file(&settings_path, &sync_tx) {
            error!("Settings watcher error: {e}");
        }
    });

    let bridge_thread = std::thread::spawn(move || {
        while sync_rx.recv().is_ok() {
            debug!("Settings file changed, sending reload notification");
            std::thread::sleep(RELOAD_SETTLE_DELAY);
            if tx.send(()).is_err() {
                debug!("Settings reload receiver dropped, stopping watcher");
                break;
            }
        }
        debug!("Settings watcher channel closed");
    });

    SettingsWatcher {
        _watcher_thread: watcher_thread,
        _bridge_thread: bridge_thread,
    }
}

/// Whether a changed path refers to the watched settings file.
fn is_settings_path(changed: &Path, settings_path: &Path) -> bool {
    changed.file_name().is_some() && changed.file_name() == settings_path.file_name()
}

fn watch_settings_file(settings_path: &Path, tx: &mpsc::Sender<()>) -> Result<()> {
    let Some(parent) = settings_path.parent() else {
        return Err(DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Invalid settings path",
        )));
    };
    std::fs::create_dir_all(parent)?;

    let last_event = StdMutex::new(
        Instant::now()
            .checked_sub(SETTINGS_DEBOUNCE_DURATION)
            .unwrap_or_else(Instant::now),
    );
    let settings_path_for_closure = settings_path.to_owned();
    let (watcher_tx, watcher_rx) = mpsc::channel();

    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) => match event.kind {
                notify::EventKind::Modify(_) | notify::EventKind::Create(_) => {
                    if event
                        .paths
                        .iter()
                        .any(|p| is_settings_path(p, &settings_path_for_closure))
                    {
                        let Ok(mut last) = last_event.lock() else {
                            error!("[settings_watcher] Debounce mutex poisoned, skipping event");
                            return;
                        };
                        let now = Instant::now();
                        if now.duration_since(*last) > SETTINGS_DEBOUNCE_DURATION {
                            *last = now;
                            let _ = watcher_tx.send(());
                        }
                    }
                }
                _ => {}
            },
            Err(e) => {
                error!("Watcher error: {}", e);
            }
        })?;

    watcher.watch(parent, notify::RecursiveMode::NonRecursive)?;
    info!("Watching settings directory: {:?}", parent);

    while watcher_rx.recv().is_ok() {
        let _ = tx.send(());
    }

    Ok(())
}
