//! App discovery and process launching.
//!
//! Installed apps live in `apps/<id>/manifest.json`. Apps with a `command`
//! are launched in their own directory; once running they connect back to
//! the hub socket (passed in `DESKHUB_SOCKET`) and register themselves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use deskhub_types::AppManifest;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{DaemonError, Result};
use crate::registry::{App, AppRegistry};

/// Environment variable telling a launched app where the hub listens.
pub const SOCKET_ENV: &str = "DESKHUB_SOCKET";

/// Register every app found under `apps_dir`. Returns how many were found.
pub fn discover_apps(apps_dir: &Path, registry: &mut AppRegistry) -> usize {
    if !apps_dir.exists() {
        debug!("Apps directory does not exist: {:?}", apps_dir);
        return 0;
    }

    let entries = match std::fs::read_dir(apps_dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read apps directory {:?}: {}", apps_dir, e);
            return 0;
        }
    };

    let mut found = 0;
    for entry in entries.flatten() {
        let app_dir = entry.path();
        let manifest_path = app_dir.join("manifest.json");
        if !app_dir.is_dir() || !manifest_path.exists() {
            continue;
        }

        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read manifest {:?}: {}", manifest_path, e);
                continue;
            }
        };

        let mut manifest: AppManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse manifest {:?}: {}", manifest_path, e);
                continue;
            }
        };

        if manifest.id.is_empty() {
            manifest.id = app_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
        }

        info!(
            "Discovered app: {} (version {}, command: {:?})",
            manifest.id, manifest.version, manifest.command
        );
        registry.register(App::new(manifest, Some(app_dir)));
        found += 1;
    }

    found
}

fn spawn_stderr_logger(app: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] app stderr: {}", app, line);
        }
    });
}

fn spawn_command(command: &str, working_dir: &Path, socket_path: &Path) -> Result<Child> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| DaemonError::Launch("Empty command".to_string()))?;

    Command::new(program)
        .args(parts)
        .current_dir(working_dir)
        .env(SOCKET_ENV, socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DaemonError::Launch(format!("Failed to spawn: {e}")))
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub max_restart_delay: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(60),
        }
    }
}

impl LaunchConfig {
    /// Backoff before restart attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.restart_delay
            .saturating_mul(factor)
            .min(self.max_restart_delay)
    }
}

#[derive(Debug)]
struct LaunchedApp {
    child: Child,
    restart_count: u32,
    working_dir: PathBuf,
    command: String,
    /// Set once the process has exited and a restart is scheduled
    restart_at: Option<Instant>,
    gave_up: bool,
}

#[derive(Debug)]
pub struct AppLauncher {
    launched: HashMap<String, LaunchedApp>,
    config: LaunchConfig,
    socket_path: PathBuf,
}

impl AppLauncher {
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self::with_config(socket_path, LaunchConfig::default())
    }

    #[must_use]
    pub fn with_config(socket_path: PathBuf, config: LaunchConfig) -> Self {
        Self {
            launched: HashMap::new(),
            config,
            socket_path,
        }
    }

    /// Start an app's process.
    ///
    /// # Errors
    ///
    /// Returns `AppDisabled` for disabled apps and `Launch` when the app has
    /// no command, does not support this platform or fails to spawn.
    pub fn launch(&mut self, app: &App) -> Result<()> {
        if !app.enabled {
            return Err(DaemonError::AppDisabled(app.name.clone()));
        }
        if !app.manifest.supports_platform(std::env::consts::OS) {
            return Err(DaemonError::Launch(format!(
                "{} does not support {}",
                app.name,
                std::env::consts::OS
            )));
        }
        let command = app
            .manifest
            .command
            .as_ref()
            .ok_or_else(|| DaemonError::Launch(format!("{} has no launch command", app.name)))?;

        if self.is_alive(&app.name) {
            debug!("[{}] Already running", app.name);
            return Ok(());
        }
        if self.launched.remove(&app.name).is_some() {
            debug!("[{}] Replacing exited process", app.name);
        }

        let working_dir = match &app.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        debug!("[{}] Launching: {} in {:?}", app.name, command, working_dir);
        let mut child = spawn_command(command, &working_dir, &self.socket_path)?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(app.name.clone(), stderr);
        }

        self.launched.insert(
            app.name.clone(),
            LaunchedApp {
                child,
                restart_count: 0,
                working_dir,
                command: command.clone(),
                restart_at: None,
                gave_up: false,
            },
        );
        info!("[{}] App launched", app.name);
        Ok(())
    }

    /// Launch every registered app that is eligible to run.
    pub fn launch_all(&mut self, registry: &AppRegistry) {
        for app in registry.list_all().filter(|a| a.can_launch()) {
            if let Err(e) = self.launch(app) {
                error!("[{}] Failed to launch: {}", app.name, e);
            }
        }
    }

    /// Restart crashed apps with exponential backoff.
    ///
    /// An exited app is scheduled for restart on the first check that sees
    /// it and restarted on the first check after its delay has passed.
    pub fn check_and_restart(&mut self) {
        let now = Instant::now();

        for (name, launched) in &mut self.launched {
            if launched.gave_up {
                continue;
            }

            if launched.restart_at.is_none() {
                let status = match launched.child.try_wait() {
                    Ok(None) => continue,
                    Ok(Some(status)) => status.to_string(),
                    Err(e) => {
                        warn!("[{}] Failed to get exit status: {}", name, e);
                        "error".to_string()
                    }
                };
                warn!("[{}] App exited with status: {}", name, status);

                if launched.restart_count >= self.config.max_restarts {
                    error!(
                        "[{}] Max restarts ({}) exceeded, not restarting",
                        name, self.config.max_restarts
                    );
                    launched.gave_up = true;
                    continue;
                }

                let delay = self.config.delay_for(launched.restart_count + 1);
                info!(
                    "[{}] Restarting app (attempt {}/{}) after {:?}",
                    name,
                    launched.restart_count + 1,
                    self.config.max_restarts,
                    delay
                );
                launched.restart_at = Some(now + delay);
            }

            if launched.restart_at.is_some_and(|at| at <= now) {
                launched.restart_at = None;
                launched.restart_count += 1;
                match spawn_command(&launched.command, &launched.working_dir, &self.socket_path) {
                    Ok(mut child) => {
                        if let Some(stderr) = child.stderr.take() {
                            spawn_stderr_logger(name.clone(), stderr);
                        }
                        launched.child = child;
                        info!("[{}] App restarted successfully", name);
                    }
                    Err(e) => {
                        error!("[{}] Failed to restart app: {}", name, e);
                    }
                }
            }
        }
    }

    /// Kill an app's process. Returns `false` if it was not launched here.
    pub async fn stop(&mut self, name: &str) -> bool {
        let Some(mut launched) = self.launched.remove(name) else {
            debug!("[{}] App not launched by the hub", name);
            return false;
        };

        info!("[{}] Stopping app", name);
        if let Err(e) = launched.child.kill().await {
            warn!("[{}] Failed to kill app: {}", name, e);
        }
        true
    }

    pub async fn stop_all(&mut self) {
        for (name, mut launched) in self.launched.drain() {
            info!("[{}] Stopping app", name);
            if let Err(e) = launched.child.kill().await {
                warn!("[{}] Failed to kill app: {}", name, e);
            }
        }
    }

    /// Whether a process launched for `name` is still running. Exited
    /// processes waiting on a restart, or given up on, do not count.
    pub fn is_alive(&mut self, name: &str) -> bool {
        self.launched.get_mut(name).is_some_and(|launched| {
            !launched.gave_up
                && launched.restart_at.is_none()
                && matches!(launched.child.try_wait(), Ok(None))
        })
    }
}
