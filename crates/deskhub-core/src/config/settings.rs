use std::path::{Path, PathBuf};

use deskhub_types::Settings;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::Result;

/// Load settings from file, falling back to defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&content)?;
    Ok(settings)
}

/// Save settings to file.
///
/// # Errors
///
/// Returns an error if serialization fails or the file cannot be written.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Settings backed by `settings.json`, with change notification.
///
/// Subscribers receive the full settings value every time it changes,
/// whether through [`SettingsStore::set`] or a reload from disk.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open the store, loading the current file contents.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing settings file cannot be parsed.
    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = load_settings(&path)?;
        debug!("Loaded settings from {}", path.display());
        let (tx, _) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    #[must_use]
    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Persist new settings and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; subscribers are not
    /// notified in that case.
    pub fn set(&self, settings: Settings) -> Result<()> {
        save_settings(&settings, &self.path)?;
        self.tx.send_replace(settings);
        Ok(())
    }

    /// Re-read the settings file. Returns `true` when the contents changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed; the previous
    /// settings stay in effect.
    pub fn reload(&self) -> Result<bool> {
        let settings = load_settings(&self.path)?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                *current = settings;
                true
            }
        });
        if changed {
            info!("Settings reloaded from {}", self.path.display());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load_settings(&temp_dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(load_settings(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let settings = Settings {
            refresh_interval: 5000,
            playback_location: Some("spotify".to_string()),
            ..Settings::default()
        };
        save_settings(&settings, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"refreshInterval\": 5000"));
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn test_set_notifies_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::open(temp_dir.path().join("settings.json")).unwrap();
        let mut rx = store.subscribe();

        let settings = Settings {
            refresh_interval: -1,
            ..Settings::default()
        };
        store.set(settings.clone()).unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), settings);
        assert_eq!(store.get(), settings);
    }

    #[test]
    fn test_reload_only_notifies_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"refreshInterval": 1000}"#).unwrap();

        let store = SettingsStore::open(path.clone()).unwrap();
        let mut rx = store.subscribe();

        assert!(!store.reload().unwrap());
        assert!(!rx.has_changed().unwrap());

        std::fs::write(&path, r#"{"refreshInterval": 2000}"#).unwrap();
        assert!(store.reload().unwrap());
        assert_eq!(rx.borrow_and_update().refresh_interval, 2000);
    }

    #[test]
    fn test_reload_error_keeps_previous_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"refreshInterval": 1000}"#).unwrap();

        let store = SettingsStore::open(path.clone()).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.get().refresh_interval, 1000);
    }
}
