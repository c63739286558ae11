pub mod config;
pub mod keymap;
pub mod store;

mod error;

#[cfg(test)]
mod tests;

pub use config::{Directories, SettingsStore};
pub use error::{Error, Result};
pub use keymap::KeyMapRegistry;
pub use store::{ConfigStore, DataStore, JsonConfigStore, JsonDataStore};

pub use deskhub_types::*;
