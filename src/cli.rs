//! Command line front end over the core.
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::commands::process::{StreamOutput, StreamSource};
use crate::commands::residuals::ResidualScanner;
use crate::commands::uninstall::{preview_uninstall, uninstall_with_residuals};
use crate::commands::updates::merge_updates;
use crate::commands::winget::PackageManager;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    CleanupAnalysis, CleanupCategory, OperationResult, PackageRecord, PackageStatus,
    ResidualEntry, UninstallOptions, UninstallPreview, UninstallReport,
};
use crate::settings::Settings;
use crate::state::AppState;
use crate::utils::{format_bytes, is_elevated};

#[derive(Parser, Debug)]
#[command(
    name = "wingetsweep",
    version,
    about = "Update, uninstall and clean up Windows software through winget"
)]
pub struct Cli {
    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed packages
    List {
        /// Also query available upgrades and fill in the Available column
        #[arg(long)]
        updates: bool,
    },

    /// List packages with an available upgrade
    Updates,

    /// Upgrade the given packages one after another
    Update {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,

        /// Upgrade everything in a single winget run
        #[arg(long)]
        all: bool,
    },

    /// Uninstall packages one after another and remove what they leave behind
    Uninstall {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Program name used to find leftover folders and shortcuts. Defaults
        /// to the name in the installed listing; only valid with a single id
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Only show what would be removed
        #[arg(long)]
        preview: bool,

        #[arg(long)]
        keep_roaming: bool,

        #[arg(long)]
        keep_local: bool,

        /// Also remove machine-wide data under ProgramData
        #[arg(long)]
        machine_data: bool,

        #[arg(long)]
        keep_shortcuts: bool,

        /// Accepted for compatibility, the registry is never modified
        #[arg(long)]
        clean_registry: bool,
    },

    /// Look for leftovers of a program without removing anything
    Scan { name: String },

    /// Measure how much space each cleanup category would free
    Analyze,

    /// Clean one category
    Clean {
        #[arg(value_enum)]
        target: CleanTarget,

        /// Let the shell show its confirmation and progress UI
        #[arg(long)]
        noisy: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    UserTemp,
    SystemTemp,
    Browser,
    RecycleBin,
}

impl CleanTarget {
    fn category(self) -> CleanupCategory {
        match self {
            CleanTarget::UserTemp => CleanupCategory::UserTemp,
            CleanTarget::SystemTemp => CleanupCategory::SystemTemp,
            CleanTarget::Browser => CleanupCategory::BrowserCache,
            CleanTarget::RecycleBin => CleanupCategory::RecycleBin,
        }
    }
}

/// Runs the parsed command. `Ok(false)` means the command ran but reported
/// a failure.
pub async fn run(cli: Cli) -> CoreResult<bool> {
    let settings = Settings::load(cli.config.as_deref())?.with_env_overrides()?;

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx, cli.json));

    let state = AppState::new(settings, Some(tx));
    log::debug!("Using winget at {}", state.settings().winget_path.display());
    let outcome = dispatch(&state, cli.command, cli.json).await;

    // Closes the progress channel so the printer can finish.
    drop(state);
    if let Err(e) = printer.await {
        log::warn!("Progress printer failed: {}", e);
    }
    outcome
}

async fn dispatch(state: &AppState, command: Commands, json: bool) -> CoreResult<bool> {
    match command {
        Commands::List { updates } => {
            let mut installed = state.manager.list_installed().await?;
            if updates {
                let updatable = state.manager.list_updatable().await?;
                installed = merge_updates(installed, &updatable);
            }
            emit(json, &installed, || print_packages(&installed))?;
            Ok(true)
        }
        Commands::Updates => {
            let updatable = state.manager.list_updatable().await?;
            emit(json, &updatable, || print_packages(&updatable))?;
            Ok(true)
        }
        Commands::Update { ids, all } => {
            let result = if all {
                state.manager.update_all().await?
            } else {
                let mut records = select_for_update(&state.manager, &ids).await?;
                run_update_batch(&state.manager, &mut records, |done, total, record| {
                    if !json {
                        println!(
                            "[{}/{}] {} {}",
                            done,
                            total,
                            record.name,
                            record.status.label()
                        );
                    }
                })
                .await?
            };
            emit(json, &result, || print_result("Update", &result))?;
            Ok(result.success)
        }
        Commands::Uninstall {
            ids,
            name,
            preview,
            keep_roaming,
            keep_local,
            machine_data,
            keep_shortcuts,
            clean_registry,
        } => {
            let mut records = select_for_uninstall(&state.manager, &ids, name.as_deref()).await?;

            if preview {
                let mut previews = Vec::with_capacity(records.len());
                for record in &records {
                    previews.push(preview_uninstall(&state.scanner, &record.id, &record.name).await?);
                }
                emit(json, &previews, || previews.iter().for_each(print_preview))?;
                return Ok(true);
            }

            let options = UninstallOptions {
                remove_roaming_data: !keep_roaming,
                remove_local_data: !keep_local,
                remove_machine_data: machine_data,
                remove_shortcuts: !keep_shortcuts,
                clean_registry,
            };
            let reports = run_uninstall_batch(
                &state.manager,
                &state.scanner,
                &mut records,
                &options,
                |done, total, record| {
                    if !json {
                        println!(
                            "[{}/{}] {} {}",
                            done,
                            total,
                            record.name,
                            record.status.label()
                        );
                    }
                },
            )
            .await?;
            emit(json, &reports, || reports.iter().for_each(print_report))?;
            Ok(reports
                .iter()
                .all(|report| report.uninstalled && report.result.success))
        }
        Commands::Scan { name } => {
            let entries = state.scanner.scan(&name).await?;
            emit(json, &entries, || print_entries(&entries))?;
            Ok(true)
        }
        Commands::Analyze => {
            let analysis = state.cleanup.analyze().await?;
            emit(json, &analysis, || print_analysis(&analysis))?;
            Ok(true)
        }
        Commands::Clean { target, noisy } => {
            let category = target.category();
            if category.requires_elevation() && !is_elevated() {
                log::warn!(
                    "Cleaning {:?} usually requires administrator rights",
                    category
                );
            }
            let result = match target {
                CleanTarget::UserTemp => state.cleanup.clean_user_temp().await?,
                CleanTarget::SystemTemp => state.cleanup.clean_system_temp().await?,
                CleanTarget::Browser => state.cleanup.clean_browser_caches().await?,
                CleanTarget::RecycleBin => state.cleanup.empty_recycle_bin(!noisy).await?,
            };
            emit(json, &result, || print_result("Cleanup", &result))?;
            Ok(result.success)
        }
    }
}

/// Builds the records for the requested ids, taking names and versions from
/// the upgrade listing where winget knows them.
async fn select_for_update(
    manager: &PackageManager,
    ids: &[String],
) -> CoreResult<Vec<PackageRecord>> {
    let updatable = manager.list_updatable().await?;
    let records = ids
        .iter()
        .map(|id| {
            let mut record = updatable
                .iter()
                .find(|p| p.id.eq_ignore_ascii_case(id))
                .cloned()
                .unwrap_or_else(|| PackageRecord::new(id.as_str(), id.as_str(), "", ""));
            record.selected = true;
            record
        })
        .collect();
    Ok(records)
}

/// Builds the records for the requested ids from the installed listing.
/// `name` replaces the listed name and is only accepted for a single id.
async fn select_for_uninstall(
    manager: &PackageManager,
    ids: &[String],
    name: Option<&str>,
) -> CoreResult<Vec<PackageRecord>> {
    if name.is_some() && ids.len() > 1 {
        return Err(CoreError::InvalidInput(
            "--name can only be used when uninstalling a single package.".to_string(),
        ));
    }

    let installed = manager.list_installed().await?;
    let records = ids
        .iter()
        .map(|id| {
            let mut record = installed
                .iter()
                .find(|p| p.id.eq_ignore_ascii_case(id))
                .cloned()
                .unwrap_or_else(|| {
                    log::warn!("{} is not in the installed listing, using the id as name", id);
                    PackageRecord::new(id.as_str(), id.as_str(), "", "")
                });
            if let Some(name) = name {
                record.name = name.to_string();
            }
            record.selected = true;
            record
        })
        .collect();
    Ok(records)
}

/// Upgrades the selected records one at a time.
///
/// Each record moves Pending -> InProgress -> Completed or Error, and
/// `on_progress(done, total, record)` is called after each one. A launch
/// failure stops the batch.
pub async fn run_update_batch<F>(
    manager: &PackageManager,
    records: &mut [PackageRecord],
    mut on_progress: F,
) -> CoreResult<OperationResult>
where
    F: FnMut(usize, usize, &PackageRecord),
{
    let total = records.iter().filter(|r| r.selected).count();
    let mut summary = OperationResult::succeeded();
    let mut done = 0;

    for record in records.iter_mut().filter(|r| r.selected) {
        record.transition(PackageStatus::InProgress)?;

        let result = match manager.update_one(&record.id).await {
            Ok(result) => result,
            Err(e) => {
                record.transition(PackageStatus::Error)?;
                return Err(e);
            }
        };

        if result.success {
            record.transition(PackageStatus::Completed)?;
        } else {
            record.transition(PackageStatus::Error)?;
            summary.success = false;
        }
        summary.absorb(result);

        done += 1;
        on_progress(done, total, record);
    }

    log::info!("Updated {}/{} packages", summary.items_affected, total);
    Ok(summary)
}

/// Uninstalls the selected records one at a time, removing each one's
/// leftovers under its record name.
///
/// Records move through the same states as in [`run_update_batch`]: a record
/// is Completed when winget uninstalled it, even if some leftovers could not
/// be removed. A launch failure stops the batch.
pub async fn run_uninstall_batch<F>(
    manager: &PackageManager,
    scanner: &ResidualScanner,
    records: &mut [PackageRecord],
    options: &UninstallOptions,
    mut on_progress: F,
) -> CoreResult<Vec<UninstallReport>>
where
    F: FnMut(usize, usize, &PackageRecord),
{
    let total = records.iter().filter(|r| r.selected).count();
    let mut reports = Vec::with_capacity(total);

    for record in records.iter_mut().filter(|r| r.selected) {
        record.transition(PackageStatus::InProgress)?;

        let report =
            match uninstall_with_residuals(manager, scanner, &record.id, &record.name, options)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    record.transition(PackageStatus::Error)?;
                    return Err(e);
                }
            };

        if report.uninstalled {
            record.transition(PackageStatus::Completed)?;
        } else {
            record.transition(PackageStatus::Error)?;
        }
        reports.push(report);
        on_progress(reports.len(), total, record);
    }

    let uninstalled = reports.iter().filter(|r| r.uninstalled).count();
    log::info!("Uninstalled {}/{} packages", uninstalled, total);
    Ok(reports)
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> CoreResult<()> {
    if json {
        let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
        println!("{}", rendered);
    } else {
        human();
    }
    Ok(())
}

/// Echoes winget's output while updates and uninstalls run.
async fn print_progress(mut rx: mpsc::Receiver<StreamOutput>, json: bool) {
    while let Some(output) = rx.recv().await {
        // Spinner frames and padding.
        if output.line.trim().chars().count() <= 1 {
            continue;
        }
        if json || output.source == StreamSource::Stderr {
            eprintln!("  {}", output.line.trim_end());
        } else {
            println!("  {}", output.line.trim_end());
        }
    }
}

fn print_packages(packages: &[PackageRecord]) {
    if packages.is_empty() {
        println!("No packages found.");
        return;
    }

    let headers = ["Name", "Id", "Version", "Available"];
    let rows: Vec<[&str; 4]> = packages
        .iter()
        .map(|p| {
            [
                p.name.as_str(),
                p.id.as_str(),
                p.current_version.as_str(),
                p.available_version.as_str(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: [&str; 4]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
    for row in rows {
        println!("{}", render(row));
    }
    println!("{} packages", packages.len());
}

fn print_result(action: &str, result: &OperationResult) {
    let status = if result.success { "finished" } else { "failed" };
    println!(
        "{} {}: {} items, {} freed",
        action,
        status,
        result.items_affected,
        format_bytes(result.space_freed_bytes)
    );
    for error in &result.errors {
        println!("  ! {}", error);
    }
}

fn print_entries(entries: &[ResidualEntry]) {
    if entries.is_empty() {
        println!("Nothing found.");
        return;
    }
    for entry in entries {
        let modified = entry
            .last_modified
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<13} {:>10}  {}  {}",
            entry.kind.label(),
            format_bytes(entry.size_bytes),
            modified,
            entry.path.display()
        );
    }
}

fn print_preview(preview: &UninstallPreview) {
    println!(
        "Leftovers of {} ({}):",
        preview.program_name, preview.package_id
    );
    print_entries(&preview.entries);
    println!("Total: {}", format_bytes(preview.total_size_bytes));
}

fn print_report(report: &UninstallReport) {
    if !report.uninstalled {
        println!("winget could not uninstall {}.", report.package_id);
        for error in &report.result.errors {
            println!("  ! {}", error);
        }
        return;
    }
    println!("Uninstalled {}.", report.package_id);
    for path in &report.removed_paths {
        println!("  removed {}", path.display());
    }
    print_result("Leftover removal", &report.result);
}

fn print_analysis(analysis: &CleanupAnalysis) {
    let categories = [
        ("User temp", CleanupCategory::UserTemp),
        ("System temp", CleanupCategory::SystemTemp),
        ("Browser caches", CleanupCategory::BrowserCache),
        ("Thumbnail cache", CleanupCategory::OsCache),
        ("Recycle bin", CleanupCategory::RecycleBin),
    ];
    for (label, category) in categories {
        let marker = if category.requires_elevation() {
            " (admin)"
        } else {
            ""
        };
        println!(
            "{:<16} {:>10}{}",
            label,
            format_bytes(analysis.bytes_for(category)),
            marker
        );
    }
    println!("{:<16} {:>10}", "Total", format_bytes(analysis.total()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_needs_ids_or_all() {
        assert!(Cli::try_parse_from(["wingetsweep", "update"]).is_err());
        assert!(Cli::try_parse_from(["wingetsweep", "update", "A.A", "--all"]).is_err());

        let cli = Cli::try_parse_from(["wingetsweep", "update", "A.A", "B.B"]).unwrap();
        match cli.command {
            Commands::Update { ids, all } => {
                assert_eq!(ids, vec!["A.A", "B.B"]);
                assert!(!all);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn clean_targets_use_kebab_case() {
        let cli =
            Cli::try_parse_from(["wingetsweep", "clean", "recycle-bin", "--noisy", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Clean { target, noisy } => {
                assert_eq!(target, CleanTarget::RecycleBin);
                assert!(noisy);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(CleanTarget::SystemTemp.category(), CleanupCategory::SystemTemp);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn batch_moves_each_record_to_a_terminal_state() {
        let manager = crate::commands::winget::scripted_manager(
            r#"[ "$3" = Missing.Id ] && { echo 'No installed package found matching input criteria.'; exit 1; }
echo 'Successfully installed'"#,
        );
        let mut records = vec![
            PackageRecord::new("Git", "Git.Git", "2.40.0", "2.44.0"),
            PackageRecord::new("Missing", "Missing.Id", "1.0", "2.0"),
            PackageRecord::new("Skipped", "Skipped.App", "1.0", "2.0"),
        ];
        records[0].selected = true;
        records[1].selected = true;

        let mut seen = Vec::new();
        let summary = run_update_batch(&manager, &mut records, |done, total, record| {
            seen.push((done, total, record.status));
        })
        .await
        .unwrap();

        assert!(!summary.success);
        assert_eq!(summary.items_affected, 1);
        assert_eq!(
            seen,
            vec![
                (1, 2, PackageStatus::Completed),
                (2, 2, PackageStatus::Error)
            ]
        );
        assert_eq!(records[2].status, PackageStatus::Pending);
    }

    #[test]
    fn uninstall_takes_several_ids_and_an_optional_name() {
        assert!(Cli::try_parse_from(["wingetsweep", "uninstall"]).is_err());

        let cli = Cli::try_parse_from(["wingetsweep", "uninstall", "A.A", "B.B"]).unwrap();
        match cli.command {
            Commands::Uninstall { ids, name, .. } => {
                assert_eq!(ids, vec!["A.A", "B.B"]);
                assert_eq!(name, None);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["wingetsweep", "uninstall", "A.A", "-n", "Alpha"]).unwrap();
        match cli.command {
            Commands::Uninstall { name, .. } => assert_eq!(name.as_deref(), Some("Alpha")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn uninstall_names_come_from_the_installed_listing() {
        let manager = crate::commands::winget::scripted_manager(
            r#"printf 'Name  Id  Version  Available\n----\nFoo App  Foo.App  1.0  winget\n'"#,
        );

        let records = select_for_uninstall(
            &manager,
            &["foo.app".to_string(), "Other.Id".to_string()],
            None,
        )
        .await
        .unwrap();
        assert_eq!(records[0].name, "Foo App");
        assert_eq!(records[0].id, "Foo.App");
        assert_eq!(records[1].name, "Other.Id");
        assert!(records.iter().all(|r| r.selected));

        let renamed = select_for_uninstall(&manager, &["Foo.App".to_string()], Some("FooApp"))
            .await
            .unwrap();
        assert_eq!(renamed[0].name, "FooApp");

        let err = select_for_uninstall(
            &manager,
            &["A.A".to_string(), "B.B".to_string()],
            Some("Alpha"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn uninstall_batch_removes_leftovers_of_each_uninstalled_record() {
        use crate::commands::residuals::ScanRoots;
        use crate::platform::OsFileSystem;
        use std::fs;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let roaming = dir.path().join("Roaming");
        fs::create_dir_all(roaming.join("FooApp")).unwrap();
        fs::write(roaming.join("FooApp/prefs.json"), b"{}").unwrap();
        fs::create_dir_all(roaming.join("Missing")).unwrap();
        let roots = ScanRoots {
            roaming_data: Some(roaming.clone()),
            local_data: None,
            machine_data: None,
            desktop: None,
            start_menu: None,
        };
        let scanner = ResidualScanner::new(roots, Arc::new(OsFileSystem));
        let manager = crate::commands::winget::scripted_manager(
            r#"[ "$3" = Missing.Id ] && { echo 'No installed package found matching input criteria.'; exit 1; }
echo 'Successfully uninstalled'"#,
        );
        let mut records = vec![
            PackageRecord::new("FooApp", "Foo.App", "1.0", ""),
            PackageRecord::new("Missing", "Missing.Id", "1.0", ""),
            PackageRecord::new("Skipped", "Skipped.App", "1.0", ""),
        ];
        records[0].selected = true;
        records[1].selected = true;

        let mut seen = Vec::new();
        let reports = run_uninstall_batch(
            &manager,
            &scanner,
            &mut records,
            &UninstallOptions::default(),
            |done, total, record| seen.push((done, total, record.status)),
        )
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (1, 2, PackageStatus::Completed),
                (2, 2, PackageStatus::Error)
            ]
        );
        assert_eq!(reports.len(), 2);
        assert!(reports[0].uninstalled);
        assert_eq!(reports[0].removed_paths, vec![roaming.join("FooApp")]);
        assert!(!roaming.join("FooApp").exists());
        assert!(!reports[1].uninstalled);
        assert!(roaming.join("Missing").exists());
        assert_eq!(records[2].status, PackageStatus::Pending);
    }

    #[tokio::test]
    async fn uninstall_batch_stops_when_winget_cannot_start() {
        let settings = Settings {
            winget_path: "definitely-not-winget-5c1e".into(),
            ..Settings::default()
        };
        let manager = PackageManager::new(&settings);
        let scanner = ResidualScanner::new(
            crate::commands::residuals::ScanRoots::default(),
            std::sync::Arc::new(crate::platform::OsFileSystem),
        );
        let mut records = vec![
            PackageRecord::new("A", "A.A", "1", ""),
            PackageRecord::new("B", "B.B", "1", ""),
        ];
        for record in &mut records {
            record.selected = true;
        }

        let err = run_uninstall_batch(
            &manager,
            &scanner,
            &mut records,
            &UninstallOptions::default(),
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert!(err.is_launch_failure());
        assert_eq!(records[0].status, PackageStatus::Error);
        assert_eq!(records[1].status, PackageStatus::Pending);
    }

    #[tokio::test]
    async fn batch_stops_when_winget_cannot_start() {
        let settings = Settings {
            winget_path: "definitely-not-winget-5c1e".into(),
            ..Settings::default()
        };
        let manager = PackageManager::new(&settings);
        let mut records = vec![
            PackageRecord::new("A", "A.A", "1", "2"),
            PackageRecord::new("B", "B.B", "1", "2"),
        ];
        for record in &mut records {
            record.selected = true;
        }

        let err = run_update_batch(&manager, &mut records, |_, _, _| {})
            .await
            .unwrap_err();

        assert!(err.is_launch_failure());
        assert_eq!(records[0].status, PackageStatus::Error);
        assert_eq!(records[1].status, PackageStatus::Pending);
    }
}
