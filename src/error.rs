use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::PackageStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {seconds}s and was terminated")]
    Timeout { program: String, seconds: u64 },

    #[error("Administrator privileges required to access {}", path.display())]
    PrivilegeRequired { path: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: PackageStatus,
        to: PackageStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl CoreError {
    /// True for errors that mean the external process never ran to completion.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, CoreError::Launch { .. } | CoreError::Timeout { .. })
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Task(err.to_string())
    }
}

impl Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let err = CoreError::InvalidInput("package id is empty".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Invalid input: package id is empty\"");
    }

    #[test]
    fn timeout_counts_as_launch_failure() {
        let err = CoreError::Timeout {
            program: "winget".to_string(),
            seconds: 5,
        };
        assert!(err.is_launch_failure());
        assert!(!CoreError::Config("bad".into()).is_launch_failure());
    }
}
