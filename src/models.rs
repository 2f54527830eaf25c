// Data shared by the package manager, the residual scanner, the cleanup
// engine and the CLI. Everything serializes as camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};

// -----------------------------------------------------------------------------
// PackageStatus
// -----------------------------------------------------------------------------
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PackageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl PackageStatus {
    /// Pending -> InProgress -> {Completed | Error}. Terminal states stay terminal.
    pub fn can_transition_to(self, next: PackageStatus) -> bool {
        matches!(
            (self, next),
            (PackageStatus::Pending, PackageStatus::InProgress)
                | (PackageStatus::InProgress, PackageStatus::Completed)
                | (PackageStatus::InProgress, PackageStatus::Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PackageStatus::Completed | PackageStatus::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::InProgress => "in progress",
            PackageStatus::Completed => "completed",
            PackageStatus::Error => "error",
        }
    }
}

// -----------------------------------------------------------------------------
// PackageRecord
// -----------------------------------------------------------------------------
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    pub current_version: String,
    #[serde(default)]
    pub available_version: String,
    #[serde(default)]
    pub status: PackageStatus,
    #[serde(default)]
    pub selected: bool,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        current_version: impl Into<String>,
        available_version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            current_version: current_version.into(),
            available_version: available_version.into(),
            status: PackageStatus::Pending,
            selected: false,
        }
    }

    /// Moves the record to `next`, rejecting anything outside the lifecycle.
    pub fn transition(&mut self, next: PackageStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn has_update(&self) -> bool {
        !self.available_version.is_empty() && self.available_version != self.current_version
    }
}

// -----------------------------------------------------------------------------
// OperationResult
// -----------------------------------------------------------------------------
/// Outcome of a destructive operation. Per-item failures are collected in
/// `errors` and can coexist with `success == true`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub space_freed_bytes: u64,
    pub items_affected: u64,
    pub errors: Vec<String>,
}

impl OperationResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    pub fn record_item(&mut self, bytes: u64) {
        self.items_affected += 1;
        self.space_freed_bytes += bytes;
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Folds counts and errors of `other` into `self`. `success` is left untouched.
    pub fn absorb(&mut self, other: OperationResult) {
        self.items_affected += other.items_affected;
        self.space_freed_bytes += other.space_freed_bytes;
        self.errors.extend(other.errors);
    }
}

// -----------------------------------------------------------------------------
// Residual artifacts
// -----------------------------------------------------------------------------
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResidualKind {
    RoamingData,
    LocalData,
    MachineData,
    Shortcut,
}

impl ResidualKind {
    pub fn label(self) -> &'static str {
        match self {
            ResidualKind::RoamingData => "roaming data",
            ResidualKind::LocalData => "local data",
            ResidualKind::MachineData => "machine data",
            ResidualKind::Shortcut => "shortcut",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResidualEntry {
    pub path: PathBuf,
    pub kind: ResidualKind,
    pub is_directory: bool,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Flags applied to a single clean uninstall. Not persisted.
///
/// `clean_registry` exists so front ends can round-trip the option, but the
/// registry is never modified no matter what it is set to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UninstallOptions {
    pub remove_roaming_data: bool,
    pub remove_local_data: bool,
    pub remove_machine_data: bool,
    pub remove_shortcuts: bool,
    pub clean_registry: bool,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            remove_roaming_data: true,
            remove_local_data: true,
            remove_machine_data: false,
            remove_shortcuts: true,
            clean_registry: false,
        }
    }
}

impl UninstallOptions {
    pub fn allows(&self, kind: ResidualKind) -> bool {
        match kind {
            ResidualKind::RoamingData => self.remove_roaming_data,
            ResidualKind::LocalData => self.remove_local_data,
            ResidualKind::MachineData => self.remove_machine_data,
            ResidualKind::Shortcut => self.remove_shortcuts,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UninstallPreview {
    pub package_id: String,
    pub program_name: String,
    pub entries: Vec<ResidualEntry>,
    pub total_size_bytes: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UninstallReport {
    pub package_id: String,
    pub program_name: String,
    /// The package manager itself reported success.
    pub uninstalled: bool,
    pub removed_paths: Vec<PathBuf>,
    pub result: OperationResult,
}

// -----------------------------------------------------------------------------
// Cleanup
// -----------------------------------------------------------------------------
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CleanupCategory {
    UserTemp,
    SystemTemp,
    BrowserCache,
    OsCache,
    RecycleBin,
}

impl CleanupCategory {
    pub fn requires_elevation(self) -> bool {
        matches!(self, CleanupCategory::SystemTemp | CleanupCategory::OsCache)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CleanupAnalysis {
    pub user_temp_bytes: u64,
    pub system_temp_bytes: u64,
    pub browser_cache_bytes: u64,
    pub os_cache_bytes: u64,
    pub recycle_bin_bytes: u64,
}

impl CleanupAnalysis {
    pub fn total(&self) -> u64 {
        self.user_temp_bytes
            + self.system_temp_bytes
            + self.browser_cache_bytes
            + self.os_cache_bytes
            + self.recycle_bin_bytes
    }

    pub fn bytes_for(&self, category: CleanupCategory) -> u64 {
        match category {
            CleanupCategory::UserTemp => self.user_temp_bytes,
            CleanupCategory::SystemTemp => self.system_temp_bytes,
            CleanupCategory::BrowserCache => self.browser_cache_bytes,
            CleanupCategory::OsCache => self.os_cache_bytes,
            CleanupCategory::RecycleBin => self.recycle_bin_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_lifecycle() {
        let mut record = PackageRecord::new("App", "Vendor.App", "1.0", "2.0");
        assert_eq!(record.status, PackageStatus::Pending);
        record.transition(PackageStatus::InProgress).unwrap();
        record.transition(PackageStatus::Completed).unwrap();
        assert!(record.status.is_terminal());
    }

    #[test]
    fn terminal_status_is_never_revisited() {
        let mut record = PackageRecord::new("App", "Vendor.App", "1.0", "2.0");
        record.transition(PackageStatus::InProgress).unwrap();
        record.transition(PackageStatus::Error).unwrap();

        let err = record.transition(PackageStatus::InProgress).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: PackageStatus::Error,
                to: PackageStatus::InProgress
            }
        ));
        assert_eq!(record.status, PackageStatus::Error);
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        let mut record = PackageRecord::default();
        assert!(record.transition(PackageStatus::Completed).is_err());
    }

    #[test]
    fn uninstall_option_defaults() {
        let options = UninstallOptions::default();
        assert!(options.allows(ResidualKind::RoamingData));
        assert!(options.allows(ResidualKind::LocalData));
        assert!(!options.allows(ResidualKind::MachineData));
        assert!(options.allows(ResidualKind::Shortcut));
        assert!(!options.clean_registry);
    }

    #[test]
    fn uninstall_options_fill_missing_fields_with_defaults() {
        let options: UninstallOptions =
            serde_json::from_str(r#"{"removeMachineData": true}"#).unwrap();
        assert!(options.remove_machine_data);
        assert!(options.remove_shortcuts);
    }

    #[test]
    fn operation_result_absorbs_counts_and_errors() {
        let mut total = OperationResult::succeeded();
        let mut part = OperationResult::succeeded();
        part.record_item(10);
        part.push_error("locked.tmp");
        total.absorb(part);
        total.record_item(5);

        assert!(total.success);
        assert_eq!(total.items_affected, 2);
        assert_eq!(total.space_freed_bytes, 15);
        assert_eq!(total.errors, vec!["locked.tmp".to_string()]);
    }

    #[test]
    fn analysis_total_sums_categories() {
        let analysis = CleanupAnalysis {
            user_temp_bytes: 1,
            system_temp_bytes: 2,
            browser_cache_bytes: 3,
            os_cache_bytes: 4,
            recycle_bin_bytes: 5,
        };
        assert_eq!(analysis.total(), 15);
        assert_eq!(analysis.bytes_for(CleanupCategory::OsCache), 4);
    }

    #[test]
    fn has_update_ignores_equal_versions() {
        let same = PackageRecord::new("App", "Vendor.App", "1.0", "1.0");
        let none = PackageRecord::new("App", "Vendor.App", "1.0", "");
        let newer = PackageRecord::new("App", "Vendor.App", "1.0", "1.1");
        assert!(!same.has_update());
        assert!(!none.has_update());
        assert!(newer.has_update());
    }
}
