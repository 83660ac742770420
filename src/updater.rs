//! Manifest mutation and install.
//!
//! Before the first write the raw manifest text is retained as a rollback
//! buffer. The buffer outlives a rollback (restoring twice is harmless)
//! and is cleared only by the orchestrator after a successful commit.

use crate::errors::UpgradeError;
use crate::grouper::PackageGroup;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::package_manager::PackageManager;
use std::fs;
use std::path::{Path, PathBuf};

pub struct Updater<'a> {
    package_manager: &'a dyn PackageManager,
    project_dir: PathBuf,
    backup: Option<String>,
}

impl<'a> Updater<'a> {
    pub fn new(package_manager: &'a dyn PackageManager, project_dir: impl AsRef<Path>) -> Self {
        Self {
            package_manager,
            project_dir: project_dir.as_ref().to_path_buf(),
            backup: None,
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.project_dir.join(MANIFEST_FILE)
    }

    /// Rewrite every group member to the caret range of its latest version
    /// and install. On any failure the manifest is restored and install is
    /// re-run to resynchronize the lock state.
    pub async fn apply_group(&mut self, group: &PackageGroup) -> Result<(), UpgradeError> {
        // Retain the pristine text once per group
        if self.backup.is_none() {
            let text = fs::read_to_string(self.manifest_path()).map_err(|source| {
                UpgradeError::ManifestReadFailed {
                    path: self.manifest_path(),
                    source,
                }
            })?;
            self.backup = Some(text);
        }

        let result = self.write_and_install(group).await;
        if result.is_err() {
            self.rollback().await;
        }
        result
    }

    async fn write_and_install(&self, group: &PackageGroup) -> Result<(), UpgradeError> {
        let mut manifest = Manifest::load(&self.project_dir)?;
        for package in &group.packages {
            let range = format!("^{}", package.latest_version);
            manifest.set_range(&package.name, &range)?;
            tracing::info!(
                package = %package.name,
                range = %range,
                "manifest updated"
            );
        }
        manifest.save()?;

        let outcome = self.package_manager.install(&self.project_dir).await?;
        if !outcome.success {
            return Err(UpgradeError::InstallFailed {
                group: group.label(),
                message: last_lines(&outcome.stderr, 5),
            });
        }
        Ok(())
    }

    /// Restore the manifest from the rollback buffer and re-install.
    /// Best-effort: failures are logged, never raised.
    pub async fn rollback(&self) {
        let Some(backup) = &self.backup else {
            return;
        };
        if let Err(e) = fs::write(self.manifest_path(), backup) {
            tracing::warn!(error = %e, "failed to restore manifest");
            return;
        }
        match self.package_manager.install(&self.project_dir).await {
            Ok(outcome) if !outcome.success => {
                tracing::warn!("re-install after rollback exited non-zero");
            }
            Err(e) => tracing::warn!(error = %e, "re-install after rollback failed"),
            Ok(_) => {}
        }
    }

    /// Drop the rollback buffer. Called after a successful commit.
    pub fn clear_backup(&mut self) {
        self.backup = None;
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
