//! Settings for locating and invoking the package manager.
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "wingetsweep";

pub const ENV_WINGET: &str = "WINGETSWEEP_WINGET";
pub const ENV_SOURCE: &str = "WINGETSWEEP_SOURCE";
pub const ENV_TIMEOUT: &str = "WINGETSWEEP_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Program used to reach winget. A bare name is looked up on PATH.
    pub winget_path: PathBuf,
    /// Arguments placed before the winget arguments, for launchers such as
    /// `cmd /c`.
    pub launcher_args: Vec<String>,
    /// Source passed to `uninstall --source`.
    pub source: String,
    /// Kill winget when a single invocation runs longer than this.
    pub command_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            winget_path: PathBuf::from("winget"),
            launcher_args: Vec::new(),
            source: "winget".to_string(),
            command_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Returns the default settings file location.
    ///
    /// Typically: `C:\Users\USER\AppData\Roaming\wingetsweep\settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Loads settings from `path`, or from the default location when `path`
    /// is `None`. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(CoreError::Config(format!(
                    "Settings file {} does not exist",
                    path.display()
                )));
            }
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            CoreError::Config(format!("Failed to read settings at {:?}: {}", path, e))
        })?;
        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("Failed to parse settings at {:?}: {}", path, e))
        })?;

        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Applies the `WINGETSWEEP_*` environment overrides.
    pub fn with_env_overrides(self) -> CoreResult<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from any key lookup. Blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = value(ENV_WINGET) {
            log::info!("Using winget from {}: {}", ENV_WINGET, path);
            self.winget_path = PathBuf::from(path);
        }
        if let Some(source) = value(ENV_SOURCE) {
            self.source = source;
        }
        if let Some(secs) = value(ENV_TIMEOUT) {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                CoreError::Config(format!("{} must be a whole number of seconds: {}", ENV_TIMEOUT, e))
            })?;
            self.command_timeout_secs = Some(secs);
        }

        Ok(self)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
