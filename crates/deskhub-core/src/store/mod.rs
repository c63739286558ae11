//! Persistent stores apps read and write through the hub.
//!
//! The [`DataStore`] holds one JSON value per app; the [`ConfigStore`] is a
//! read-only key/value file apps may query. Both are plain JSON files under
//! the config directory.

mod config;
mod data;

pub use config::JsonConfigStore;
pub use data::JsonDataStore;

use serde_json::{Map, Value};

use crate::Result;

/// Per-app data, keyed by app name.
pub trait DataStore: Send + Sync {
    /// Stored data for `app`, `None` when the app never stored anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get_data(&self, app: &str) -> Result<Option<Value>>;

    /// Replace the data stored for `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn set_data(&mut self, app: &str, value: Value) -> Result<()>;

    /// Shallow-merge `fields` into the data for `app`; new keys win.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn add_data(&mut self, app: &str, fields: Map<String, Value>) -> Result<()>;

    /// Delete everything stored for `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn remove_data(&mut self, app: &str) -> Result<()>;
}

/// Read-only configuration values.
pub trait ConfigStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get_config(&self, key: &str) -> Result<Option<Value>>;
}
