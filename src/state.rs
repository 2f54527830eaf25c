use tokio::sync::mpsc;

use crate::commands::cleanup::CleanupEngine;
use crate::commands::process::StreamOutput;
use crate::commands::residuals::ResidualScanner;
use crate::commands::winget::PackageManager;
use crate::settings::Settings;

/// Everything a front end needs to drive the core, built once per run.
pub struct AppState {
    settings: Settings,
    pub manager: PackageManager,
    pub scanner: ResidualScanner,
    pub cleanup: CleanupEngine,
}

impl AppState {
    /// Creates state for this machine. winget output is forwarded to
    /// `progress` when given.
    pub fn new(settings: Settings, progress: Option<mpsc::Sender<StreamOutput>>) -> Self {
        let mut manager = PackageManager::new(&settings);
        if let Some(tx) = progress {
            manager = manager.with_progress(tx);
        }
        Self {
            settings,
            manager,
            scanner: ResidualScanner::detect(),
            cleanup: CleanupEngine::detect(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
