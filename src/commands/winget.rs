use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;

use super::process::{ProcessGateway, ProcessOutcome, StreamOutput};
use crate::error::{CoreError, CoreResult};
use crate::models::OperationResult;
use crate::settings::Settings;

/// Flags that keep winget from prompting during unattended upgrades.
const UNATTENDED_FLAGS: [&str; 3] = [
    "--silent",
    "--accept-source-agreements",
    "--accept-package-agreements",
];

/// Stdout lines that describe a failure rather than progress.
static FAILURE_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(error|failed|failure|not found|no installed package|cannot|denied)\b")
        .unwrap()
});

/// Defines the supported winget operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WingetOp<'a> {
    List,
    Upgrade,
    UpgradeOne(&'a str),
    UpgradeAll,
    Uninstall(&'a str),
    Version,
}

impl WingetOp<'_> {
    /// Operations that change the machine. Only their output is streamed as
    /// progress; listings are parsed instead.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            WingetOp::UpgradeOne(_) | WingetOp::UpgradeAll | WingetOp::Uninstall(_)
        )
    }
}

fn require_id<'a>(id: &'a str, action: &str) -> CoreResult<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "A package id is required to {}.",
            action
        )));
    }
    Ok(id)
}

/// Builds the winget argument vector for `op`, rejecting blank package ids.
pub fn build_winget_args(op: WingetOp<'_>, source: &str) -> CoreResult<Vec<String>> {
    let mut args: Vec<String> = match op {
        WingetOp::List => vec!["list".into()],
        WingetOp::Upgrade => vec!["upgrade".into()],
        WingetOp::UpgradeOne(id) => {
            let id = require_id(id, "update")?;
            vec!["upgrade".into(), "--id".into(), id.into()]
        }
        WingetOp::UpgradeAll => vec!["upgrade".into(), "--all".into()],
        WingetOp::Uninstall(id) => {
            let id = require_id(id, "uninstall")?;
            return Ok(vec![
                "uninstall".into(),
                "--id".into(),
                id.into(),
                "--exact".into(),
                "--silent".into(),
                "--source".into(),
                source.into(),
            ]);
        }
        WingetOp::Version => vec!["--version".into()],
    };

    if matches!(op, WingetOp::UpgradeOne(_) | WingetOp::UpgradeAll) {
        args.extend(UNATTENDED_FLAGS.iter().map(|flag| flag.to_string()));
    }
    Ok(args)
}

/// Human readable name of an operation for logs.
fn describe(op: WingetOp<'_>) -> String {
    match op {
        WingetOp::List => "Listing installed packages".to_string(),
        WingetOp::Upgrade => "Listing available upgrades".to_string(),
        WingetOp::UpgradeOne(id) => format!("Updating {}", id),
        WingetOp::UpgradeAll => "Updating all packages".to_string(),
        WingetOp::Uninstall(id) => format!("Uninstalling {}", id),
        WingetOp::Version => "Checking winget version".to_string(),
    }
}

/// Entry point for everything that goes through winget.
#[derive(Debug, Clone)]
pub struct PackageManager {
    gateway: ProcessGateway,
    source: String,
    progress: Option<mpsc::Sender<StreamOutput>>,
}

impl PackageManager {
    pub fn new(settings: &Settings) -> Self {
        let gateway = ProcessGateway::new(settings.winget_path.clone())
            .with_launcher_args(settings.launcher_args.clone())
            .with_timeout(settings.command_timeout());
        Self::with_gateway(gateway, settings.source.clone())
    }

    pub fn with_gateway(gateway: ProcessGateway, source: impl Into<String>) -> Self {
        Self {
            gateway,
            source: source.into(),
            progress: None,
        }
    }

    /// Forwards every output line of subsequent updates and uninstalls to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<StreamOutput>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs a winget operation to completion.
    pub async fn execute(&self, op: WingetOp<'_>) -> CoreResult<ProcessOutcome> {
        let args = build_winget_args(op, &self.source)?;
        log::info!("{}", describe(op));
        let progress = if op.is_mutation() {
            self.progress.clone()
        } else {
            None
        };
        self.gateway.run(&args, progress).await
    }

    /// Runs an operation whose output only matters as progress and maps the
    /// exit status into an `OperationResult`.
    pub(crate) async fn execute_mutation(&self, op: WingetOp<'_>) -> CoreResult<OperationResult> {
        let outcome = self.execute(op).await?;
        let result = outcome_to_result(&outcome);
        if result.success {
            log::info!("{} finished successfully", describe(op));
        } else {
            log::warn!("{} failed: {}", describe(op), result.errors.join("; "));
        }
        Ok(result)
    }

    /// Whether winget can be launched and answers `--version`.
    pub async fn is_available(&self) -> bool {
        match self.execute(WingetOp::Version).await {
            Ok(outcome) => {
                if outcome.success() {
                    log::debug!("winget version: {}", outcome.stdout_text().trim());
                }
                outcome.success()
            }
            Err(e) => {
                log::warn!("winget is not available: {}", e);
                false
            }
        }
    }
}

/// Formats an exit code the way winget documents them (HRESULT in hex).
pub fn format_exit_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("{:#010X}", code as u32),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Success iff the exit code is zero. Otherwise the errors hold stderr,
/// failure-looking stdout lines and an exit code summary.
pub fn outcome_to_result(outcome: &ProcessOutcome) -> OperationResult {
    if outcome.success() {
        let mut result = OperationResult::succeeded();
        result.items_affected = 1;
        return result;
    }

    let mut result = OperationResult {
        success: false,
        ..Default::default()
    };
    for line in &outcome.stderr {
        let line = line.trim();
        if !line.is_empty() {
            result.push_error(line);
        }
    }
    for line in &outcome.stdout {
        let line = line.trim();
        if !line.is_empty() && FAILURE_LINE_REGEX.is_match(line) {
            result.push_error(line);
        }
    }
    result.push_error(format!(
        "winget exited with code {}",
        format_exit_code(outcome.exit_code)
    ));
    result
}

/// A manager whose "winget" is a shell script; `$1..` are the winget arguments.
#[cfg(all(test, unix))]
pub(crate) fn scripted_manager(script: &str) -> PackageManager {
    let gateway = ProcessGateway::new("sh").with_launcher_args(vec![
        "-c".to_string(),
        script.to_string(),
        "winget".to_string(),
    ]);
    PackageManager::with_gateway(gateway, "winget")
}
