//! Raw filesystem and shell primitives used by the scanner and cleanup engine.
//!
//! Everything that touches the disk goes through [`FileSystem`] so callers can
//! substitute locked files or denied folders in tests.

#[cfg(windows)]
pub mod windows;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A file or directory as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Flags forwarded to the shell's bulk recycle-bin empty call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecycleBinFlags {
    pub no_confirmation: bool,
    pub no_progress_ui: bool,
    pub no_sound: bool,
}

impl RecycleBinFlags {
    /// Silent mode suppresses every prompt and progress window. Sound is
    /// always suppressed.
    pub fn for_mode(silent: bool) -> Self {
        Self {
            no_confirmation: silent,
            no_progress_ui: silent,
            no_sound: true,
        }
    }
}

/// What the recycle bin currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecycleBinUsage {
    pub bytes: u64,
    pub items: u64,
}

pub trait FileSystem: Send + Sync {
    /// Immediate children of `dir`.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<FsEntry>>;

    /// Every regular file below `root`. An unreadable root is an error,
    /// unreadable subtrees are skipped.
    fn walk_files(&self, root: &Path) -> io::Result<Vec<FsEntry>>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn empty_recycle_bin(&self, flags: RecycleBinFlags) -> io::Result<()>;

    /// Aggregate size of the files below `root`, zero when it cannot be read.
    fn dir_size(&self, root: &Path) -> u64 {
        self.walk_files(root)
            .map(|files| files.iter().map(|f| f.len).sum())
            .unwrap_or(0)
    }

    /// Deleted items held in the recycle bins under `roots`.
    fn recycle_bin_usage(&self, roots: &[PathBuf]) -> RecycleBinUsage {
        measure_recycle_bin(self, roots)
    }
}

/// Counts deleted items by walking the bin folders.
///
/// Per-user `S-1-...` folders are descended into. Their `desktop.ini` and the
/// `$I...` metadata twin of every `$R...` item are not deleted items.
pub fn measure_recycle_bin<F: FileSystem + ?Sized>(fs: &F, roots: &[PathBuf]) -> RecycleBinUsage {
    let mut usage = RecycleBinUsage::default();
    for root in roots {
        measure_bin_folder(fs, root, true, &mut usage);
    }
    usage
}

fn measure_bin_folder<F: FileSystem + ?Sized>(
    fs: &F,
    dir: &Path,
    top_level: bool,
    usage: &mut RecycleBinUsage,
) {
    let Ok(entries) = fs.list_dir(dir) else {
        return;
    };
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.eq_ignore_ascii_case("desktop.ini") || name.starts_with("$I") {
            continue;
        }
        if top_level && entry.is_dir && name.starts_with("S-1-") {
            measure_bin_folder(fs, &entry.path, false, usage);
            continue;
        }
        usage.items += 1;
        usage.bytes += if entry.is_dir {
            fs.dir_size(&entry.path)
        } else {
            entry.len
        };
    }
}

/// [`FileSystem`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<FsEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::debug!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::debug!("No metadata for {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            entries.push(FsEntry {
                path: entry.path(),
                is_dir: metadata.is_dir(),
                len: if metadata.is_file() { metadata.len() } else { 0 },
                modified: metadata.modified().ok(),
            });
        }
        Ok(entries)
    }

    fn walk_files(&self, root: &Path) -> io::Result<Vec<FsEntry>> {
        // Read the root first so missing or denied roots surface as errors.
        fs::read_dir(root)?;

        let files = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("Skipping unreadable path under {}: {}", root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                Some(FsEntry {
                    path: entry.into_path(),
                    is_dir: false,
                    len: metadata.len(),
                    modified: metadata.modified().ok(),
                })
            })
            .collect();

        Ok(files)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    #[cfg(windows)]
    fn empty_recycle_bin(&self, flags: RecycleBinFlags) -> io::Result<()> {
        windows::empty_recycle_bin(flags)
    }

    #[cfg(not(windows))]
    fn empty_recycle_bin(&self, _flags: RecycleBinFlags) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "emptying the recycle bin is only supported on Windows",
        ))
    }

    #[cfg(windows)]
    fn recycle_bin_usage(&self, roots: &[PathBuf]) -> RecycleBinUsage {
        match windows::query_recycle_bin() {
            Ok(usage) => usage,
            Err(e) => {
                log::debug!("SHQueryRecycleBinW failed, walking the bins instead: {}", e);
                measure_recycle_bin(self, roots)
            }
        }
    }
}

/// Folders that hold recycle-bin contents on this machine.
pub fn recycle_bin_roots() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        windows::fixed_drive_roots()
            .into_iter()
            .map(|drive| drive.join("$Recycle.Bin"))
            .collect()
    }
    #[cfg(not(windows))]
    {
        dirs::data_local_dir()
            .map(|dir| vec![dir.join("Trash").join("files")])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn silent_mode_suppresses_all_shell_ui() {
        let flags = RecycleBinFlags::for_mode(true);
        assert!(flags.no_confirmation);
        assert!(flags.no_progress_ui);
        assert!(flags.no_sound);
    }

    #[test]
    fn noisy_mode_keeps_confirmation_and_progress() {
        let flags = RecycleBinFlags::for_mode(false);
        assert!(!flags.no_confirmation);
        assert!(!flags.no_progress_ui);
        assert!(flags.no_sound);
    }

    #[test]
    fn walk_files_reports_nested_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), b"1234").unwrap();
        fs::write(dir.path().join("a/b/deep.bin"), b"123456").unwrap();

        let mut files = OsFileSystem.walk_files(dir.path()).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.is_dir));
        assert_eq!(OsFileSystem.dir_size(dir.path()), 10);
    }

    #[test]
    fn walk_files_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = OsFileSystem
            .walk_files(&dir.path().join("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(OsFileSystem.dir_size(&dir.path().join("missing")), 0);
    }

    #[test]
    fn recycle_bin_usage_counts_deleted_items_only() {
        let dir = tempfile::tempdir().unwrap();
        let sid = dir.path().join("S-1-5-21-1000");
        fs::create_dir_all(sid.join("$RDIR01")).unwrap();
        fs::write(sid.join("desktop.ini"), vec![0u8; 129]).unwrap();
        fs::write(sid.join("$IABC.txt"), vec![0u8; 544]).unwrap();
        fs::write(sid.join("$RABC.txt"), vec![0u8; 300]).unwrap();
        fs::write(sid.join("$IDIR01"), vec![0u8; 544]).unwrap();
        fs::write(sid.join("$RDIR01/inner.bin"), vec![0u8; 50]).unwrap();

        let usage = measure_recycle_bin(&OsFileSystem, &[dir.path().to_path_buf()]);
        assert_eq!(usage, RecycleBinUsage { bytes: 350, items: 2 });
    }

    #[test]
    fn bin_with_only_desktop_ini_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sid = dir.path().join("S-1-5-21-1000");
        fs::create_dir_all(&sid).unwrap();
        fs::write(sid.join("desktop.ini"), vec![0u8; 129]).unwrap();

        let roots = [dir.path().to_path_buf(), dir.path().join("missing")];
        assert_eq!(measure_recycle_bin(&OsFileSystem, &roots), RecycleBinUsage::default());
    }

    #[test]
    fn list_dir_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("child")).unwrap();
        fs::write(dir.path().join("file.txt"), b"abc").unwrap();

        let entries = OsFileSystem.list_dir(dir.path()).unwrap();
        let child = entries.iter().find(|e| e.path.ends_with("child")).unwrap();
        let file = entries.iter().find(|e| e.path.ends_with("file.txt")).unwrap();
        assert!(child.is_dir);
        assert!(!file.is_dir);
        assert_eq!(file.len, 3);
    }
}
