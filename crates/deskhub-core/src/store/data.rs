use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::DataStore;
use crate::{Error, Result};

/// [`DataStore`] kept in memory and written through to `data.json`.
#[derive(Debug, Default)]
pub struct JsonDataStore {
    path: Option<PathBuf>,
    apps: Map<String, Value>,
}

impl JsonDataStore {
    /// Store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load `data.json`. A missing file starts empty; an unreadable one is
    /// logged and replaced on the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: &Path) -> Result<Self> {
        let apps = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(apps)) => apps,
                Ok(_) => {
                    warn!("{} is not a JSON object, starting empty", path.display());
                    Map::new()
                }
                Err(e) => {
                    warn!(
                        "Failed to parse {}: {} (at line {}, column {})",
                        path.display(),
                        e,
                        e.line(),
                        e.column()
                    );
                    Map::new()
                }
            }
        } else {
            debug!("No data store at {}", path.display());
            Map::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            apps,
        })
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(&self.apps)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        debug!("Saved data for {} apps", self.apps.len());
        Ok(())
    }
}

impl DataStore for JsonDataStore {
    fn get_data(&self, app: &str) -> Result<Option<Value>> {
        Ok(self.apps.get(app).cloned())
    }

    fn set_data(&mut self, app: &str, value: Value) -> Result<()> {
        self.apps.insert(app.to_string(), value);
        self.save()
    }

    fn add_data(&mut self, app: &str, fields: Map<String, Value>) -> Result<()> {
        match self.apps.get_mut(app) {
            Some(Value::Object(existing)) => existing.extend(fields),
            Some(other) if !other.is_null() => {
                return Err(Error::Store(format!(
                    "data for {app} is not an object, cannot merge"
                )));
            }
            _ => {
                self.apps.insert(app.to_string(), Value::Object(fields));
            }
        }
        self.save()
    }

    fn remove_data(&mut self, app: &str) -> Result<()> {
        if self.apps.remove(app).is_some() {
            self.save()?;
        }
        Ok(())
    }
}
