//! Disk cleanup: temp folders, browser caches and the recycle bin.
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::models::{CleanupAnalysis, OperationResult};
use crate::platform::{self, FileSystem, OsFileSystem, RecycleBinFlags};
use crate::utils::KnownFolders;

/// Cache folders of Chromium based browsers, relative to local app data.
const CHROMIUM_PROFILES: [&[&str]; 2] = [
    &["Google", "Chrome", "User Data", "Default"],
    &["Microsoft", "Edge", "User Data", "Default"],
];
const CHROMIUM_CACHE_DIRS: [&str; 2] = ["Cache", "Code Cache"];
const FIREFOX_PROFILES: [&str; 3] = ["Mozilla", "Firefox", "Profiles"];
const FIREFOX_CACHE_DIR: &str = "cache2";

/// Folders the cleanup engine reads and empties.
#[derive(Debug, Clone, Default)]
pub struct CleanupLocations {
    pub user_temp: PathBuf,
    pub system_temp: PathBuf,
    /// Per-user local app data, parent of browser and Explorer caches.
    pub local_data: Option<PathBuf>,
    pub recycle_bins: Vec<PathBuf>,
}

impl CleanupLocations {
    pub fn detect() -> Self {
        let folders = KnownFolders::detect();
        Self {
            user_temp: folders.user_temp,
            system_temp: folders.system_temp,
            local_data: folders.local_data,
            recycle_bins: platform::recycle_bin_roots(),
        }
    }

    /// Explorer's thumbnail and icon cache folder.
    pub fn os_cache_dir(&self) -> Option<PathBuf> {
        self.local_data
            .as_ref()
            .map(|local| local.join("Microsoft").join("Windows").join("Explorer"))
    }
}

#[derive(Clone)]
pub struct CleanupEngine {
    locations: CleanupLocations,
    fs: Arc<dyn FileSystem>,
}

impl CleanupEngine {
    pub fn new(locations: CleanupLocations, fs: Arc<dyn FileSystem>) -> Self {
        Self { locations, fs }
    }

    pub fn detect() -> Self {
        Self::new(CleanupLocations::detect(), Arc::new(OsFileSystem))
    }

    pub fn locations(&self) -> &CleanupLocations {
        &self.locations
    }

    /// Runs `job` on the blocking pool with a clone of this engine.
    async fn blocking<T, F>(&self, job: F) -> CoreResult<T>
    where
        F: FnOnce(&CleanupEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        Ok(tokio::task::spawn_blocking(move || job(&engine)).await?)
    }

    /// Measures every category. Unreadable locations count as zero.
    pub async fn analyze(&self) -> CoreResult<CleanupAnalysis> {
        self.blocking(|engine| engine.analyze_blocking()).await
    }

    pub fn analyze_blocking(&self) -> CleanupAnalysis {
        let analysis = CleanupAnalysis {
            user_temp_bytes: self.fs.dir_size(&self.locations.user_temp),
            system_temp_bytes: self.fs.dir_size(&self.locations.system_temp),
            browser_cache_bytes: self
                .browser_cache_dirs()
                .iter()
                .map(|dir| self.fs.dir_size(dir))
                .sum(),
            os_cache_bytes: self
                .locations
                .os_cache_dir()
                .map(|dir| self.fs.dir_size(&dir))
                .unwrap_or(0),
            recycle_bin_bytes: self.recycle_bin_size(),
        };
        log::info!("Cleanup analysis: {:?}", analysis);
        analysis
    }

    pub async fn clean_user_temp(&self) -> CoreResult<OperationResult> {
        self.blocking(|engine| engine.clean_user_temp_blocking()).await
    }

    pub fn clean_user_temp_blocking(&self) -> OperationResult {
        let root = &self.locations.user_temp;
        log::info!("Cleaning user temp folder {}", root.display());
        match self.delete_files_under(root) {
            Ok(pass) => pass.result,
            Err(e) => {
                log::warn!("Could not read {}: {}", root.display(), e);
                OperationResult::failed(format!("Could not read {}: {}", root.display(), e))
            }
        }
    }

    /// Fails with `PrivilegeRequired` when the folder cannot be read, or when
    /// every file in it was found but access to each was denied.
    pub async fn clean_system_temp(&self) -> CoreResult<OperationResult> {
        self.blocking(|engine| engine.clean_system_temp_blocking())
            .await?
    }

    pub fn clean_system_temp_blocking(&self) -> CoreResult<OperationResult> {
        let root = &self.locations.system_temp;
        log::info!("Cleaning system temp folder {}", root.display());
        match self.delete_files_under(root) {
            Ok(pass) if pass.all_denied() => {
                log::warn!(
                    "Access denied to all {} files under {}",
                    pass.files_found,
                    root.display()
                );
                Err(CoreError::PrivilegeRequired { path: root.clone() })
            }
            Ok(pass) => Ok(pass.result),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log::warn!("Access to {} denied", root.display());
                Err(CoreError::PrivilegeRequired { path: root.clone() })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(OperationResult::failed("System temp folder not found"))
            }
            Err(e) => Ok(OperationResult::failed(format!(
                "Could not read {}: {}",
                root.display(),
                e
            ))),
        }
    }

    pub async fn clean_browser_caches(&self) -> CoreResult<OperationResult> {
        self.blocking(|engine| engine.clean_browser_caches_blocking())
            .await
    }

    /// Browsers that are not installed are skipped silently.
    pub fn clean_browser_caches_blocking(&self) -> OperationResult {
        let mut result = OperationResult::succeeded();
        for dir in self.browser_cache_dirs() {
            log::debug!("Cleaning browser cache {}", dir.display());
            match self.delete_files_under(&dir) {
                Ok(pass) => result.absorb(pass.result),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => result.push_error(format!("Could not read {}: {}", dir.display(), e)),
            }
        }
        log::info!(
            "Browser cache cleanup removed {} files",
            result.items_affected
        );
        result
    }

    /// Empties the recycle bin. `silent` suppresses the shell's confirmation
    /// and progress UI.
    pub async fn empty_recycle_bin(&self, silent: bool) -> CoreResult<OperationResult> {
        self.blocking(move |engine| engine.empty_recycle_bin_blocking(silent))
            .await
    }

    pub fn empty_recycle_bin_blocking(&self, silent: bool) -> OperationResult {
        let before = self.fs.recycle_bin_usage(&self.locations.recycle_bins);

        let flags = RecycleBinFlags::for_mode(silent);
        log::info!(
            "Emptying recycle bin ({} items, {} bytes) with {:?}",
            before.items,
            before.bytes,
            flags
        );

        match self.fs.empty_recycle_bin(flags) {
            Ok(()) => OperationResult {
                success: true,
                space_freed_bytes: before.bytes,
                items_affected: before.items,
                errors: Vec::new(),
            },
            Err(e) if before.items == 0 => {
                log::debug!("Recycle bin already empty ({})", e);
                OperationResult::succeeded()
            }
            Err(e) => {
                log::warn!("Failed to empty recycle bin: {}", e);
                OperationResult::failed(format!("Could not empty the recycle bin: {}", e))
            }
        }
    }

    fn recycle_bin_size(&self) -> u64 {
        self.fs.recycle_bin_usage(&self.locations.recycle_bins).bytes
    }

    /// Cache folders cleaned by `clean_browser_caches` and measured by `analyze`.
    pub fn browser_cache_dirs(&self) -> Vec<PathBuf> {
        let Some(local) = self.locations.local_data.as_ref() else {
            return Vec::new();
        };

        let mut dirs = Vec::new();
        for profile in CHROMIUM_PROFILES {
            let profile_dir = profile.iter().fold(local.clone(), |dir, part| dir.join(part));
            dirs.extend(CHROMIUM_CACHE_DIRS.iter().map(|cache| profile_dir.join(cache)));
        }

        let firefox = FIREFOX_PROFILES
            .iter()
            .fold(local.clone(), |dir, part| dir.join(part));
        if let Ok(profiles) = self.fs.list_dir(&firefox) {
            dirs.extend(
                profiles
                    .into_iter()
                    .filter(|profile| profile.is_dir)
                    .map(|profile| profile.path.join(FIREFOX_CACHE_DIR)),
            );
        }

        dirs
    }

    /// Enumerates the files under `root` first, then deletes them one by one.
    /// An unreadable root is an error; files that cannot be deleted are
    /// reported and skipped.
    fn delete_files_under(&self, root: &Path) -> io::Result<DeletionPass> {
        let files = self.fs.walk_files(root)?;
        let files_found = files.len();
        let mut result = OperationResult::succeeded();
        let mut denied = 0;

        for file in files {
            match self.fs.remove_file(&file.path) {
                Ok(()) => result.record_item(file.len),
                Err(e) => {
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        denied += 1;
                    }
                    let name = file
                        .path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.path.display().to_string());
                    log::debug!("Could not delete {}: {}", file.path.display(), e);
                    result.push_error(format!("Could not delete {}: {}", name, e));
                }
            }
        }

        log::debug!(
            "Deleted {} files ({} bytes) under {}",
            result.items_affected,
            result.space_freed_bytes,
            root.display()
        );
        Ok(DeletionPass {
            result,
            files_found,
            denied,
        })
    }
}

/// Outcome of one enumerate-then-delete pass over a folder.
struct DeletionPass {
    result: OperationResult,
    files_found: usize,
    /// Failures caused by missing access rights.
    denied: usize,
}

impl DeletionPass {
    fn all_denied(&self) -> bool {
        self.files_found > 0 && self.result.items_affected == 0 && self.denied == self.files_found
    }
}
