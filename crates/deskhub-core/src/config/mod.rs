mod dirs;
mod settings;

pub use dirs::Directories;
pub use settings::{SettingsStore, load_settings, save_settings};
