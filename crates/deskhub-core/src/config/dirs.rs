use directories::ProjectDirs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Hub directories following the XDG layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/deskhub)
    pub config: PathBuf,

    /// Installed apps (~/.config/deskhub/apps)
    pub apps: PathBuf,

    /// Hub settings
    pub settings_file: PathBuf,

    /// Per-app data store
    pub data_file: PathBuf,

    /// Read-only config values apps may query
    pub config_file: PathBuf,

    /// Persisted buttons and actions
    pub mappings_file: PathBuf,
}

impl Directories {
    /// Create a new `Directories` instance with standard XDG paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the system's project directories cannot be
    /// determined (no home directory).
    pub fn new() -> Result<Self> {
        let project = ProjectDirs::from("", "", "deskhub")
            .ok_or_else(|| Error::Config("cannot determine project directories".to_string()))?;

        Ok(Self::with_base(project.config_dir().to_path_buf()))
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            apps: base.join("apps"),
            settings_file: base.join("settings.json"),
            data_file: base.join("data.json"),
            config_file: base.join("config.json"),
            mappings_file: base.join("mappings.json"),
            config: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.apps)?;
        Ok(())
    }
}
