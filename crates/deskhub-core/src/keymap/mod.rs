//! Button and action catalog.
//!
//! Apps register keys (physical buttons) and actions (invocable
//! capabilities) by id. Ids are global: re-registering an id overwrites the
//! existing entry in place, whichever app registered it first.

use std::path::{Path, PathBuf};

use deskhub_types::{Action, Key, MappingSnapshot};
use tracing::{debug, info, warn};

use crate::Result;

#[derive(Debug, Default)]
pub struct KeyMapRegistry {
    keys: Vec<Key>,
    actions: Vec<Action>,
    path: Option<PathBuf>,
}

impl KeyMapRegistry {
    /// In-memory registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry persisted to `path`. Existing mappings are loaded; an
    /// unreadable file is logged and the registry starts empty.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let snapshot = match Self::read_snapshot(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load mappings from {}: {}", path.display(), e);
                MappingSnapshot::default()
            }
        };

        debug!(
            "Loaded {} keys and {} actions from {}",
            snapshot.keys.len(),
            snapshot.actions.len(),
            path.display()
        );

        Self {
            keys: snapshot.keys,
            actions: snapshot.actions,
            path: Some(path.to_path_buf()),
        }
    }

    fn read_snapshot(path: &Path) -> Result<MappingSnapshot> {
        if !path.exists() {
            return Ok(MappingSnapshot::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let result = serde_json::to_string_pretty(&self.get_mapping())
            .map_err(crate::Error::from)
            .and_then(|content| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
                Ok(())
            });

        if let Err(e) = result {
            warn!("Failed to save mappings to {}: {}", path.display(), e);
        }
    }

    pub fn add_key(&mut self, key: Key) {
        debug!("[{}] Registering key {}", key.source, key.id);
        match self.keys.iter_mut().find(|k| k.id == key.id) {
            Some(existing) => *existing = key,
            None => self.keys.push(key),
        }
        self.persist();
    }

    /// Returns `true` if a key was removed.
    pub fn remove_key(&mut self, id: &str) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k.id != id);
        let removed = self.keys.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn add_action(&mut self, action: Action) {
        debug!("[{}] Registering action {}", action.source, action.id);
        match self.actions.iter_mut().find(|a| a.id == action.id) {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
        self.persist();
    }

    /// Returns `true` if an action was removed.
    pub fn remove_action(&mut self, id: &str) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.id != id);
        let removed = self.actions.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Change only the icon of an action. Returns `false` if the id is
    /// unknown.
    pub fn update_action_icon(&mut self, id: &str, icon: Option<String>) -> bool {
        let Some(action) = self.actions.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        action.icon = icon;
        self.persist();
        true
    }

    /// Drop every key and action registered by `source`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_source(&mut self, source: &str) -> usize {
        let before = self.keys.len() + self.actions.len();
        self.keys.retain(|k| k.source != source);
        self.actions.retain(|a| a.source != source);
        let removed = before - (self.keys.len() + self.actions.len());
        if removed > 0 {
            info!("[{}] Removed {} mappings", source, removed);
            self.persist();
        }
        removed
    }

    #[must_use]
    pub fn get_mapping(&self) -> MappingSnapshot {
        MappingSnapshot {
            keys: self.keys.clone(),
            actions: self.actions.clone(),
        }
    }

    #[must_use]
    pub fn key(&self, id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.id == id)
    }

    #[must_use]
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }
}
