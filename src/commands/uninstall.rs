//! Uninstalling packages, optionally followed by removal of leftovers.
use super::residuals::ResidualScanner;
use super::winget::{PackageManager, WingetOp};
use crate::error::CoreResult;
use crate::models::{OperationResult, UninstallOptions, UninstallPreview, UninstallReport};

const REGISTRY_NOTICE: &str = "Registry cleaning is not supported; no registry keys were touched";

impl PackageManager {
    /// Uninstalls a single package from the configured source.
    pub async fn uninstall_one(&self, id: &str) -> CoreResult<OperationResult> {
        self.execute_mutation(WingetOp::Uninstall(id)).await
    }
}

/// Lists what a clean uninstall of `program_name` would remove. Read-only.
pub async fn preview_uninstall(
    scanner: &ResidualScanner,
    package_id: &str,
    program_name: &str,
) -> CoreResult<UninstallPreview> {
    let entries = scanner.scan(program_name).await?;
    let total_size_bytes = entries.iter().map(|entry| entry.size_bytes).sum();
    Ok(UninstallPreview {
        package_id: package_id.to_string(),
        program_name: program_name.to_string(),
        entries,
        total_size_bytes,
    })
}

/// Uninstalls `package_id` through winget and then removes the leftovers of
/// `program_name` that `options` enables.
///
/// Nothing is removed when winget reports a failure. The registry is never
/// modified; asking for it only adds a notice to the result.
pub async fn uninstall_with_residuals(
    manager: &PackageManager,
    scanner: &ResidualScanner,
    package_id: &str,
    program_name: &str,
    options: &UninstallOptions,
) -> CoreResult<UninstallReport> {
    let mut report = UninstallReport {
        package_id: package_id.to_string(),
        program_name: program_name.to_string(),
        ..Default::default()
    };

    let uninstall = manager.uninstall_one(package_id).await?;
    if !uninstall.success {
        report.result = uninstall;
        return Ok(report);
    }
    report.uninstalled = true;

    let entries = scanner.scan(program_name).await?;
    log::info!(
        "Removing leftovers of '{}' ({} candidates)",
        program_name,
        entries.len()
    );
    let (mut result, removed) = scanner.remove(entries, options.clone()).await?;

    if options.clean_registry {
        log::warn!("{}", REGISTRY_NOTICE);
        result.push_error(REGISTRY_NOTICE);
    }

    report.removed_paths = removed;
    report.result = result;
    Ok(report)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::residuals::ScanRoots;
    use crate::commands::winget::scripted_manager;
    use crate::platform::OsFileSystem;
    use std::fs;
    use std::sync::Arc;

    fn scanner_over(root: &std::path::Path) -> ResidualScanner {
        let roots = ScanRoots {
            roaming_data: Some(root.join("Roaming")),
            local_data: Some(root.join("Local")),
            machine_data: Some(root.join("ProgramData")),
            desktop: Some(root.join("Desktop")),
            start_menu: None,
        };
        ResidualScanner::new(roots, Arc::new(OsFileSystem))
    }

    fn seed(root: &std::path::Path) {
        fs::create_dir_all(root.join("Roaming/FooApp")).unwrap();
        fs::write(root.join("Roaming/FooApp/prefs.json"), vec![1u8; 40]).unwrap();
        fs::create_dir_all(root.join("ProgramData/FooApp")).unwrap();
        fs::create_dir_all(root.join("Desktop")).unwrap();
        fs::write(root.join("Desktop/FooApp.lnk"), b"lnk").unwrap();
    }

    #[tokio::test]
    async fn preview_lists_without_removing() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let preview = preview_uninstall(&scanner_over(dir.path()), "Foo.App", "FooApp")
            .await
            .unwrap();

        assert_eq!(preview.entries.len(), 3);
        assert_eq!(preview.total_size_bytes, 43);
        assert!(dir.path().join("Roaming/FooApp").exists());
    }

    #[tokio::test]
    async fn removes_enabled_leftovers_after_successful_uninstall() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let manager = scripted_manager(
            r#"[ "$1 $2 $3 $4" = "uninstall --id Foo.App --exact" ] || exit 9
echo 'Successfully uninstalled'"#,
        );

        let report = uninstall_with_residuals(
            &manager,
            &scanner_over(dir.path()),
            "Foo.App",
            "FooApp",
            &UninstallOptions::default(),
        )
        .await
        .unwrap();

        assert!(report.uninstalled);
        assert!(report.result.success);
        assert_eq!(report.removed_paths.len(), 2);
        assert_eq!(report.result.space_freed_bytes, 43);
        assert!(!dir.path().join("Roaming/FooApp").exists());
        // Machine data is opt-in.
        assert!(dir.path().join("ProgramData/FooApp").exists());
    }

    #[tokio::test]
    async fn failed_uninstall_leaves_everything_in_place() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let manager = scripted_manager("echo 'Uninstall failed with exit code: 1603' 1>&2; exit 1");

        let report = uninstall_with_residuals(
            &manager,
            &scanner_over(dir.path()),
            "Foo.App",
            "FooApp",
            &UninstallOptions::default(),
        )
        .await
        .unwrap();

        assert!(!report.uninstalled);
        assert!(!report.result.success);
        assert!(report.removed_paths.is_empty());
        assert!(dir.path().join("Roaming/FooApp").exists());
    }

    #[tokio::test]
    async fn registry_option_only_adds_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let manager = scripted_manager("exit 0");
        let options = UninstallOptions {
            clean_registry: true,
            ..UninstallOptions::default()
        };

        let report = uninstall_with_residuals(
            &manager,
            &scanner_over(dir.path()),
            "Foo.App",
            "FooApp",
            &options,
        )
        .await
        .unwrap();

        assert!(report.result.success);
        assert_eq!(report.result.errors, vec![REGISTRY_NOTICE.to_string()]);
    }
}
