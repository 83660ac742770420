//! Surgical source edits with a uniqueness guarantee.
//!
//! An edit's `search` text must occur exactly once in its file at apply
//! time. Ambiguous matches would silently corrupt other sites of the same
//! fragment, so they are rejected per-edit without aborting the batch.

use crate::errors::EditError;
use crate::vcs::Vcs;
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One search/replace edit against one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edit {
    pub file: String,
    #[serde(default)]
    pub description: String,
    pub search: String,
    pub replace: String,
}

/// Outcome of a batch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: usize,
}

impl ApplyReport {
    pub fn all_applied(&self) -> bool {
        self.failed == 0
    }
}

/// Applies edits and remembers which files were touched so rollback can
/// target exactly those paths.
pub struct EditEngine {
    project_dir: PathBuf,
    history: Vec<Edit>,
}

impl EditEngine {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            history: Vec::new(),
        }
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    /// Apply one edit. The search text must match the file exactly once.
    pub fn apply_edit(&mut self, edit: &Edit) -> Result<(), EditError> {
        let path = self.resolve(&edit.file);
        let content = fs::read_to_string(&path).map_err(|source| EditError::FileReadFailed {
            path: path.clone(),
            source,
        })?;

        let count = content.matches(&edit.search).count();
        match count {
            0 => return Err(EditError::NoMatch { path }),
            1 => {}
            n => return Err(EditError::AmbiguousMatch { path, count: n }),
        }

        let updated = content.replacen(&edit.search, &edit.replace, 1);
        fs::write(&path, updated).map_err(|source| EditError::FileWriteFailed {
            path: path.clone(),
            source,
        })?;

        self.history.push(edit.clone());
        Ok(())
    }

    /// Apply edits in order. A failing edit is reported and skipped; the
    /// rest of the batch still runs.
    pub fn apply_edits(&mut self, edits: &[Edit]) -> ApplyReport {
        let mut report = ApplyReport {
            applied: 0,
            failed: 0,
        };
        for edit in edits {
            match self.apply_edit(edit) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::warn!(file = %edit.file, error = %e, "edit not applied");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Apply edits grouped by file, staging each file in the VCS once all
    /// of its edits are in. Gives per-file checkpoints within one fix
    /// attempt.
    pub fn apply_edits_with_validation(&mut self, edits: &[Edit], vcs: &Vcs) -> ApplyReport {
        let mut report = ApplyReport {
            applied: 0,
            failed: 0,
        };

        // Group by file, preserving first-appearance order
        let mut order: Vec<&str> = Vec::new();
        for edit in edits {
            if !order.contains(&edit.file.as_str()) {
                order.push(&edit.file);
            }
        }

        for file in order {
            let mut any_applied = false;
            for edit in edits.iter().filter(|e| e.file == file) {
                match self.apply_edit(edit) {
                    Ok(()) => {
                        report.applied += 1;
                        any_applied = true;
                    }
                    Err(e) => {
                        tracing::warn!(file = %edit.file, error = %e, "edit not applied");
                        report.failed += 1;
                    }
                }
            }
            if any_applied {
                if let Err(e) = vcs.stage(&self.resolve(file)) {
                    tracing::warn!(file, error = %e, "failed to stage edited file");
                }
            }
        }
        report
    }

    /// Pretty-print the batch without touching disk. Previews are truncated
    /// to 200 characters each.
    pub fn preview_edits(&self, edits: &[Edit]) {
        for (i, edit) in edits.iter().enumerate() {
            println!(
                "{} {} {}",
                style(format!("[{}]", i + 1)).bold(),
                style(&edit.file).cyan(),
                style(&edit.description).dim()
            );
            println!("  {} {}", style("-").red(), truncate(&edit.search, 200));
            println!("  {} {}", style("+").green(), truncate(&edit.replace, 200));
        }
    }

    /// Unique files touched so far, in first-touch order.
    pub fn touched_files(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.history
            .iter()
            .filter(|e| seen.insert(e.file.clone()))
            .map(|e| self.resolve(&e.file))
            .collect()
    }

    /// Revert every touched file via the VCS. Clears history on success.
    pub fn rollback(&mut self, vcs: &Vcs) -> anyhow::Result<()> {
        let files = self.touched_files();
        if files.is_empty() {
            return Ok(());
        }
        vcs.checkout_paths(&files)?;
        self.history.clear();
        Ok(())
    }

    /// Forget the applied set. Called after a successful commit.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}…", cut)
    }
}
