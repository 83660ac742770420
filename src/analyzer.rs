//! Outdated-dependency discovery.
//!
//! Crosses the manifest with the package manager's outdated report and
//! yields one `PackageRef` per entry whose installed version differs from
//! its latest. Versions are normalized to bare semantic versions before
//! anything downstream sees them.

use crate::errors::UpgradeError;
use crate::manifest::{self, ChangeKind, Manifest};
use crate::package_manager::PackageManager;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One outdated package. Immutable after analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub current_version: String,
    pub latest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

impl PackageRef {
    pub fn change_kind(&self) -> ChangeKind {
        ChangeKind::classify(&self.current_version, &self.latest_version)
    }

    pub fn is_major_bump(&self) -> bool {
        self.change_kind() == ChangeKind::Major
    }
}

pub struct Analyzer<'a> {
    package_manager: &'a dyn PackageManager,
}

impl<'a> Analyzer<'a> {
    pub fn new(package_manager: &'a dyn PackageManager) -> Self {
        Self { package_manager }
    }

    /// Enumerate upgradable packages. An empty result is a valid outcome;
    /// an unreadable manifest or unavailable package manager is fatal.
    pub async fn analyze(&self, project_dir: &Path) -> Result<Vec<PackageRef>, UpgradeError> {
        // Validates the manifest up front so a broken project fails here,
        // not mid-upgrade
        let manifest = Manifest::load(project_dir)?;
        let report = self.package_manager.outdated(project_dir).await?;

        let mut refs = Vec::new();
        for (name, entry) in report {
            // Only packages the manifest actually declares
            let Some((declared_range, _)) = manifest.range_of(&name) else {
                continue;
            };

            let current = entry
                .current
                .as_deref()
                .map(manifest::clean_version)
                .unwrap_or_else(|| manifest::clean_version(declared_range));
            let Some(latest) = entry.latest.as_deref().map(manifest::clean_version) else {
                continue;
            };
            if current.is_empty() || latest.is_empty() || current == latest {
                continue;
            }

            let package = PackageRef {
                name,
                current_version: current,
                latest_version: latest,
                homepage: entry.homepage.clone(),
            };
            tracing::info!(
                package = %package.name,
                from = %package.current_version,
                to = %package.latest_version,
                kind = %package.change_kind(),
                "outdated package"
            );
            refs.push(package);
        }
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::OutdatedEntry;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    struct FakePm {
        report: BTreeMap<String, OutdatedEntry>,
    }

    #[async_trait]
    impl PackageManager for FakePm {
        async fn outdated(
            &self,
            _project_dir: &Path,
        ) -> Result<BTreeMap<String, OutdatedEntry>, UpgradeError> {
            Ok(self.report.clone())
        }

        async fn install(
            &self,
            _project_dir: &Path,
        ) -> Result<crate::runner::TestOutcome, UpgradeError> {
            Ok(crate::runner::TestOutcome {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    fn entry(current: Option<&str>, latest: Option<&str>) -> OutdatedEntry {
        OutdatedEntry {
            current: current.map(String::from),
            wanted: None,
            latest: latest.map(String::from),
            homepage: None,
        }
    }

    fn write_manifest(dir: &Path) {
        fs::write(
            dir.join("package.json"),
            r#"{
  "dependencies": {"chalk": "^4.0.0", "react": "^17.0.2"},
  "devDependencies": {"typescript": "~4.5.0"}
}
"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn analyze_yields_cleaned_refs() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path());

        let mut report = BTreeMap::new();
        report.insert("chalk".to_string(), entry(Some("4.0.0"), Some("5.3.0")));
        report.insert(
            "typescript".to_string(),
            entry(Some("4.5.5"), Some("5.7.2")),
        );

        let pm = FakePm { report };
        let refs = Analyzer::new(&pm).analyze(dir.path()).await.unwrap();
        assert_eq!(refs.len(), 2);
        let chalk = refs.iter().find(|r| r.name == "chalk").unwrap();
        assert_eq!(chalk.current_version, "4.0.0");
        assert_eq!(chalk.latest_version, "5.3.0");
        assert!(chalk.is_major_bump());
    }

    #[tokio::test]
    async fn analyze_empty_report_is_valid() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path());
        let pm = FakePm {
            report: BTreeMap::new(),
        };
        let refs = Analyzer::new(&pm).analyze(dir.path()).await.unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn analyze_skips_up_to_date_and_undeclared_packages() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path());

        let mut report = BTreeMap::new();
        // Up to date
        report.insert("react".to_string(), entry(Some("17.0.2"), Some("17.0.2")));
        // Not in the manifest (transitive)
        report.insert("lodash".to_string(), entry(Some("4.0.0"), Some("4.17.21")));
        // No latest version reported
        report.insert("chalk".to_string(), entry(Some("4.0.0"), None));

        let pm = FakePm { report };
        let refs = Analyzer::new(&pm).analyze(dir.path()).await.unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn analyze_falls_back_to_declared_range_when_not_installed() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path());

        let mut report = BTreeMap::new();
        report.insert("chalk".to_string(), entry(None, Some("5.3.0")));
        let pm = FakePm { report };
        let refs = Analyzer::new(&pm).analyze(dir.path()).await.unwrap();
        assert_eq!(refs.len(), 1);
        // Declared "^4.0.0" cleaned to "4.0.0"
        assert_eq!(refs[0].current_version, "4.0.0");
    }

    #[tokio::test]
    async fn analyze_missing_manifest_is_fatal() {
        let dir = tempdir().unwrap();
        let pm = FakePm {
            report: BTreeMap::new(),
        };
        let err = Analyzer::new(&pm).analyze(dir.path()).await.unwrap_err();
        assert!(matches!(err, UpgradeError::ManifestReadFailed { .. }));
    }
}
