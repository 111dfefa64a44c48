//! Application path management
//!
//! ## Mode Detection
//!
//! - **Dev mode**: `config.yaml` exists in the current working directory; state
//!   and logs live next to it.
//! - **Installed mode** (default): data lives in the platform data directory
//!   (`~/.local/share/ledbridge` on Linux).

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "ledbridge";

/// Application paths for config, state, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the state directory (sled database)
    pub state_dir: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if cwd.join("config.yaml").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in DEV mode (config.yaml found in {})", cwd.display());
            return Self::rooted_at(&cwd);
        }

        let data_dir = dirs::data_dir().unwrap_or_else(|| {
            eprintln!("[paths] WARNING: no platform data directory, falling back to cwd");
            cwd.clone()
        });
        Self::rooted_at(&data_dir.join(APP_NAME))
    }

    /// Paths rooted at `base`
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            config: base.join("config.yaml"),
            state_dir: base.join(".state"),
            logs_dir: base.join("logs"),
        }
    }

    /// Use an explicit configuration file; state and logs go next to it
    pub fn with_config(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let base = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config,
            ..Self::rooted_at(&base)
        }
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Get the sled database path (within state_dir)
    pub fn sled_db_path(&self) -> PathBuf {
        self.state_dir.join("sled")
    }
}
