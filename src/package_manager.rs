//! Package-manager shell-out.
//!
//! The engine only needs two operations: an outdated report and an
//! install. `npm outdated --json` exits non-zero whenever anything is
//! outdated, so the exit code is ignored and stdout parsed regardless;
//! only a spawn failure means the package manager is unavailable.

use crate::errors::UpgradeError;
use crate::runner::TestOutcome;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

/// One entry from the outdated report.
#[derive(Debug, Clone, Deserialize)]
pub struct OutdatedEntry {
    pub current: Option<String>,
    pub wanted: Option<String>,
    pub latest: Option<String>,
    pub homepage: Option<String>,
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Report packages whose installed version differs from latest.
    async fn outdated(&self, project_dir: &Path)
    -> Result<BTreeMap<String, OutdatedEntry>, UpgradeError>;

    /// Install dependencies per the current manifest.
    async fn install(&self, project_dir: &Path) -> Result<TestOutcome, UpgradeError>;
}

/// The npm implementation.
pub struct Npm;

impl Npm {
    async fn run_npm(
        &self,
        project_dir: &Path,
        args: &[&str],
    ) -> Result<std::process::Output, UpgradeError> {
        Command::new("npm")
            .args(args)
            .current_dir(project_dir)
            .output()
            .await
            .map_err(|e| UpgradeError::PackageManagerUnavailable(format!("npm: {}", e)))
    }
}

#[async_trait]
impl PackageManager for Npm {
    async fn outdated(
        &self,
        project_dir: &Path,
    ) -> Result<BTreeMap<String, OutdatedEntry>, UpgradeError> {
        // --long adds the homepage column to the JSON report
        let output = self
            .run_npm(project_dir, &["outdated", "--json", "--long"])
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(trimmed).map_err(|e| {
            UpgradeError::PackageManagerUnavailable(format!("unparseable outdated report: {}", e))
        })
    }

    async fn install(&self, project_dir: &Path) -> Result<TestOutcome, UpgradeError> {
        let output = self.run_npm(project_dir, &["install"]).await?;
        Ok(TestOutcome {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outdated_entry_deserializes_npm_report() {
        let json = r#"{
            "chalk": {
                "current": "4.0.0",
                "wanted": "4.1.2",
                "latest": "5.3.0",
                "homepage": "https://github.com/chalk/chalk"
            },
            "react": {
                "current": "17.0.2",
                "wanted": "17.0.2",
                "latest": "18.2.0"
            }
        }"#;
        let report: BTreeMap<String, OutdatedEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report["chalk"].latest.as_deref(), Some("5.3.0"));
        assert_eq!(
            report["chalk"].homepage.as_deref(),
            Some("https://github.com/chalk/chalk")
        );
        assert!(report["react"].homepage.is_none());
    }

    #[test]
    fn outdated_entry_tolerates_missing_current() {
        // npm omits "current" for packages that are declared but not installed
        let json = r#"{"lodash": {"wanted": "4.17.21", "latest": "4.17.21"}}"#;
        let report: BTreeMap<String, OutdatedEntry> = serde_json::from_str(json).unwrap();
        assert!(report["lodash"].current.is_none());
    }
}
