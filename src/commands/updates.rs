//! Listing of packages with a pending upgrade.
use std::collections::HashMap;

use super::parser::parse_packages;
use super::winget::{PackageManager, WingetOp};
use crate::error::CoreResult;
use crate::models::PackageRecord;

impl PackageManager {
    /// Fetches the packages winget can upgrade.
    pub async fn list_updatable(&self) -> CoreResult<Vec<PackageRecord>> {
        let outcome = self.execute(WingetOp::Upgrade).await?;
        let packages = parse_packages(&outcome.stdout_text());
        log::info!("Found {} packages with updates", packages.len());
        Ok(packages)
    }
}

/// Joins the installed listing with the updatable listing by `id`.
///
/// Available versions come from `updatable`; installed packages without an
/// entry there have it cleared. Order follows `installed`.
pub fn merge_updates(
    mut installed: Vec<PackageRecord>,
    updatable: &[PackageRecord],
) -> Vec<PackageRecord> {
    let available: HashMap<&str, &str> = updatable
        .iter()
        .map(|p| (p.id.as_str(), p.available_version.as_str()))
        .collect();

    for package in &mut installed {
        match available.get(package.id.as_str()) {
            Some(version) => package.available_version = version.to_string(),
            None => package.available_version.clear(),
        }
    }
    installed
}
