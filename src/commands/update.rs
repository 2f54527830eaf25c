use super::winget::{PackageManager, WingetOp};
use crate::error::CoreResult;
use crate::models::OperationResult;

impl PackageManager {
    /// Upgrades a single package. A nonzero exit is reported in the result.
    pub async fn update_one(&self, id: &str) -> CoreResult<OperationResult> {
        self.execute_mutation(WingetOp::UpgradeOne(id)).await
    }

    /// Upgrades every package with a single winget invocation.
    pub async fn update_all(&self) -> CoreResult<OperationResult> {
        self.execute_mutation(WingetOp::UpgradeAll).await
    }
}
