//! Finds what an uninstaller leaves behind: per-user and machine data folders
//! named after the program, plus shortcuts on the desktop and in the Start Menu.
//!
//! Matching is by name only, so a short program name can match folders that
//! belong to something else. Callers are expected to show a preview before
//! removing anything.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CoreResult;
use crate::models::{OperationResult, ResidualEntry, ResidualKind, UninstallOptions};
use crate::platform::{FileSystem, FsEntry, OsFileSystem};
use crate::utils::KnownFolders;

const SHORTCUT_EXTENSION: &str = ".lnk";

/// Names shorter than this match too many unrelated folders.
const MIN_SPECIFIC_NAME: usize = 3;
/// More matches than this usually means the name is too generic.
const BROAD_MATCH_ENTRIES: usize = 10;

/// Whether a scan result looks like it caught unrelated programs.
pub(crate) fn is_broad_match(program_name: &str, entries: &[ResidualEntry]) -> bool {
    !entries.is_empty()
        && (program_name.chars().count() < MIN_SPECIFIC_NAME
            || entries.len() > BROAD_MATCH_ENTRIES)
}

/// Roots searched for leftovers. A `None` root is skipped.
#[derive(Debug, Clone, Default)]
pub struct ScanRoots {
    pub roaming_data: Option<PathBuf>,
    pub local_data: Option<PathBuf>,
    pub machine_data: Option<PathBuf>,
    pub desktop: Option<PathBuf>,
    pub start_menu: Option<PathBuf>,
}

impl ScanRoots {
    pub fn from_known_folders(folders: &KnownFolders) -> Self {
        Self {
            roaming_data: folders.roaming_data.clone(),
            local_data: folders.local_data.clone(),
            machine_data: folders.machine_data.clone(),
            desktop: folders.desktop.clone(),
            start_menu: folders.start_menu.clone(),
        }
    }

    fn data_roots(&self) -> impl Iterator<Item = (&Path, ResidualKind)> {
        [
            (&self.roaming_data, ResidualKind::RoamingData),
            (&self.local_data, ResidualKind::LocalData),
            (&self.machine_data, ResidualKind::MachineData),
        ]
        .into_iter()
        .filter_map(|(root, kind)| root.as_deref().map(|root| (root, kind)))
    }

    fn shortcut_roots(&self) -> impl Iterator<Item = &Path> {
        [&self.desktop, &self.start_menu]
            .into_iter()
            .filter_map(|root| root.as_deref())
    }
}

#[derive(Clone)]
pub struct ResidualScanner {
    roots: ScanRoots,
    fs: Arc<dyn FileSystem>,
}

impl ResidualScanner {
    pub fn new(roots: ScanRoots, fs: Arc<dyn FileSystem>) -> Self {
        Self { roots, fs }
    }

    /// Scanner over this machine's known folders.
    pub fn detect() -> Self {
        Self::new(
            ScanRoots::from_known_folders(&KnownFolders::detect()),
            Arc::new(OsFileSystem),
        )
    }

    pub fn roots(&self) -> &ScanRoots {
        &self.roots
    }

    /// Lists leftovers for `program_name` without touching them.
    pub async fn scan(&self, program_name: &str) -> CoreResult<Vec<ResidualEntry>> {
        let scanner = self.clone();
        let program_name = program_name.to_string();
        let entries =
            tokio::task::spawn_blocking(move || scanner.scan_blocking(&program_name)).await?;
        Ok(entries)
    }

    /// Blocking body of [`scan`](Self::scan). Never fails; inaccessible roots
    /// contribute nothing.
    pub fn scan_blocking(&self, program_name: &str) -> Vec<ResidualEntry> {
        let program_name = program_name.trim();
        if program_name.is_empty() {
            return Vec::new();
        }
        log::info!("Scanning for leftovers of '{}'", program_name);

        let mut entries = Vec::new();
        for (root, kind) in self.roots.data_roots() {
            entries.extend(self.scan_data_root(root, kind, program_name));
        }
        for root in self.roots.shortcut_roots() {
            entries.extend(self.scan_shortcut_root(root, program_name));
        }

        log::info!(
            "Found {} leftover entries for '{}'",
            entries.len(),
            program_name
        );
        if is_broad_match(program_name, &entries) {
            log::warn!(
                "'{}' matched {} entries; it may be too generic, review them before removing",
                program_name,
                entries.len()
            );
        }
        entries
    }

    fn scan_data_root(
        &self,
        root: &Path,
        kind: ResidualKind,
        program_name: &str,
    ) -> Vec<ResidualEntry> {
        let children = match self.fs.list_dir(root) {
            Ok(children) => children,
            Err(e) => {
                log::debug!("Skipping {} root {}: {}", kind.label(), root.display(), e);
                return Vec::new();
            }
        };

        children
            .into_iter()
            .filter(|child| child.is_dir && file_name(&child.path).contains(program_name))
            .map(|child| ResidualEntry {
                size_bytes: self.fs.dir_size(&child.path),
                last_modified: to_utc(&child),
                path: child.path,
                kind,
                is_directory: true,
            })
            .collect()
    }

    fn scan_shortcut_root(&self, root: &Path, program_name: &str) -> Vec<ResidualEntry> {
        let files = match self.fs.walk_files(root) {
            Ok(files) => files,
            Err(e) => {
                log::debug!("Skipping shortcut root {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        files
            .into_iter()
            .filter(|file| is_matching_shortcut(&file_name(&file.path), program_name))
            .map(|file| ResidualEntry {
                size_bytes: file.len,
                last_modified: to_utc(&file),
                path: file.path,
                kind: ResidualKind::Shortcut,
                is_directory: false,
            })
            .collect()
    }

    /// Removes the entries enabled by `options`.
    pub async fn remove(
        &self,
        entries: Vec<ResidualEntry>,
        options: UninstallOptions,
    ) -> CoreResult<(OperationResult, Vec<PathBuf>)> {
        let scanner = self.clone();
        let outcome =
            tokio::task::spawn_blocking(move || scanner.remove_blocking(&entries, &options))
                .await?;
        Ok(outcome)
    }

    /// Directories go recursively, files one by one. Each failure adds an
    /// error and does not stop the rest.
    pub fn remove_blocking(
        &self,
        entries: &[ResidualEntry],
        options: &UninstallOptions,
    ) -> (OperationResult, Vec<PathBuf>) {
        let mut result = OperationResult::succeeded();
        let mut removed = Vec::new();

        for entry in entries.iter().filter(|entry| options.allows(entry.kind)) {
            let outcome = if entry.is_directory {
                self.fs.remove_dir_all(&entry.path)
            } else {
                self.fs.remove_file(&entry.path)
            };

            match outcome {
                Ok(()) => {
                    log::debug!("Removed {} {}", entry.kind.label(), entry.path.display());
                    result.record_item(entry.size_bytes);
                    removed.push(entry.path.clone());
                }
                Err(e) => {
                    log::warn!("Failed to remove {}: {}", entry.path.display(), e);
                    result.push_error(format!("Could not delete {}: {}", entry.path.display(), e));
                }
            }
        }

        (result, removed)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `*program_name*.lnk`, case-insensitive like the Windows shell.
fn is_matching_shortcut(file_name: &str, program_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    match lower.strip_suffix(SHORTCUT_EXTENSION) {
        Some(stem) => stem.contains(&program_name.to_lowercase()),
        None => false,
    }
}

fn to_utc(entry: &FsEntry) -> Option<DateTime<Utc>> {
    entry.modified.map(DateTime::<Utc>::from)
}
