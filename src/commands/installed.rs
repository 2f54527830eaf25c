//! Listing of everything winget reports as installed.
use super::parser::parse_packages;
use super::winget::{PackageManager, WingetOp};
use crate::error::CoreResult;
use crate::models::PackageRecord;

impl PackageManager {
    /// Fetches all installed packages, unfiltered.
    ///
    /// winget's `list` table puts the source in the fourth column for packages
    /// without an upgrade, so `available_version` is only trustworthy after
    /// [`merge_updates`](super::updates::merge_updates).
    pub async fn list_installed(&self) -> CoreResult<Vec<PackageRecord>> {
        let outcome = self.execute(WingetOp::List).await?;
        if !outcome.success() {
            log::warn!(
                "winget list exited with {:?}; parsing whatever it printed",
                outcome.exit_code
            );
        }
        let packages = parse_packages(&outcome.stdout_text());
        log::info!("Found {} installed packages", packages.len());
        Ok(packages)
    }
}
