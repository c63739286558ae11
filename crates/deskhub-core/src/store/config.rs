use std::path::{Path, PathBuf};

use serde_json::Value;

use super::ConfigStore;
use crate::{Error, Result};

/// [`ConfigStore`] over `config.json`.
///
/// The file is read on every lookup so edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn get_config(&self, key: &str) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(mut values) => Ok(values.remove(key)),
            _ => Err(Error::Store(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
        }
    }
}
