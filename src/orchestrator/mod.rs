//! The durable upgrade state machine.
//!
//! Nine phases: analyze, group, update, reproduce, localize, fix,
//! validate, commit, complete. Each handler computes the next state; the
//! orchestrator checkpoints that state before executing the next phase,
//! so the durable snapshot never observes a half-executed phase and a
//! killed run resumes at the successor of the last completed transition.

pub mod state;

use crate::analyzer::{Analyzer, PackageRef};
use crate::checkpoint::Checkpointer;
use crate::config::RunOptions;
use crate::docsearch::{self, DocSearch};
use crate::edit_engine::EditEngine;
use crate::fixer::Fixer;
use crate::grouper::{Grouper, PackageGroup};
use crate::localizer::Localizer;
use crate::manifest::{LOCKFILE, MANIFEST_FILE};
use crate::model::ModelClient;
use crate::package_manager::PackageManager;
use crate::repo_index::RepoIndex;
use crate::runner::CommandRunner;
use crate::ui::StatusUi;
use crate::updater::Updater;
use crate::vcs::Vcs;
use anyhow::{Context, Result};
use futures::future::join_all;
use state::{Phase, RunFlags, RunState};
use std::path::PathBuf;

/// What the run amounted to, for exit-code mapping and logging.
#[derive(Debug)]
pub struct RunSummary {
    pub success: bool,
    pub completed_groups: Vec<String>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

pub struct Orchestrator<'a> {
    state: RunState,
    thread_id: String,
    project_dir: PathBuf,
    checkpointer: Checkpointer,
    package_manager: &'a dyn PackageManager,
    model: Option<&'a dyn ModelClient>,
    vcs: Option<Vcs>,
    runner: CommandRunner,
    updater: Updater<'a>,
    edit_engine: EditEngine,
    doc_search: DocSearch,
    /// Built lazily, once per group.
    index: Option<RepoIndex>,
    ui: StatusUi,
    /// Phase in which `state.error` was set, for the closing summary.
    failed_phase: Option<Phase>,
}

impl<'a> Orchestrator<'a> {
    /// Build a fresh run. The flags are probed once here: a missing git
    /// repository disables commits, a missing model disables grouping
    /// assistance and fixing, and neither stops the run.
    pub fn new(
        project_dir: PathBuf,
        options: RunOptions,
        package_manager: &'a dyn PackageManager,
        model: Option<&'a dyn ModelClient>,
        verbose: bool,
    ) -> Self {
        let flags = RunFlags {
            is_versioned: Vcs::is_repository(&project_dir),
            model_enabled: model.is_some(),
        };
        let state = RunState::new(options, flags);
        Self::with_state(
            project_dir,
            state,
            uuid::Uuid::new_v4().to_string(),
            package_manager,
            model,
            verbose,
        )
    }

    /// Continue from the most recent checkpoint in the project directory.
    pub fn resume(
        project_dir: PathBuf,
        package_manager: &'a dyn PackageManager,
        model: Option<&'a dyn ModelClient>,
        verbose: bool,
    ) -> Result<Self> {
        let checkpointer = Checkpointer::new(&project_dir);
        let (thread_id, mut state) = checkpointer
            .load_latest()
            .context("No checkpoint found; nothing to resume")?;
        // The environment may have changed since the checkpoint was written
        state.flags.model_enabled = state.flags.model_enabled && model.is_some();
        tracing::info!(phase = %state.phase, "resuming from checkpoint");
        Ok(Self::with_state(
            project_dir,
            state,
            thread_id,
            package_manager,
            model,
            verbose,
        ))
    }

    fn with_state(
        project_dir: PathBuf,
        state: RunState,
        thread_id: String,
        package_manager: &'a dyn PackageManager,
        model: Option<&'a dyn ModelClient>,
        verbose: bool,
    ) -> Self {
        let checkpointer = Checkpointer::new(&project_dir);
        let vcs = if state.flags.is_versioned {
            Vcs::open(&project_dir).ok()
        } else {
            None
        };
        let runner = CommandRunner::new(&project_dir);
        let updater = Updater::new(package_manager, &project_dir);
        let edit_engine = EditEngine::new(&project_dir);
        let doc_search = DocSearch::new(state.options.migration_docs.clone());
        Self {
            state,
            thread_id,
            project_dir,
            checkpointer,
            package_manager,
            model,
            vcs,
            runner,
            updater,
            edit_engine,
            doc_search,
            index: None,
            ui: StatusUi::new(verbose),
            failed_phase: None,
        }
    }

    /// Drive the machine to completion.
    pub async fn run(&mut self) -> Result<RunSummary> {
        loop {
            let phase = self.state.phase;
            if phase == Phase::Complete {
                return self.finish().await;
            }
            self.ui.phase(phase, &self.phase_detail());

            match phase {
                Phase::Analyze => self.run_analyze().await?,
                Phase::Group => self.run_group().await?,
                Phase::Update => self.run_update().await?,
                Phase::Reproduce => self.run_reproduce().await?,
                Phase::Localize => self.run_localize()?,
                Phase::Fix => self.run_fix().await?,
                Phase::Validate => self.run_validate().await?,
                Phase::Commit => self.run_commit()?,
                Phase::Complete => unreachable!(),
            }

            // Persist the computed successor before executing it
            if let Err(e) = self.checkpointer.save(&self.thread_id, &self.state) {
                tracing::warn!(error = %e, "checkpoint write failed; resume disabled");
            }
        }
    }

    fn phase_detail(&self) -> String {
        match self.state.phase {
            Phase::Update | Phase::Reproduce | Phase::Localize | Phase::Fix | Phase::Validate => {
                self.state
                    .current_group()
                    .map(|g| g.label())
                    .unwrap_or_default()
            }
            _ => String::new(),
        }
    }

    /// Record a group failure and route to the terminal phase.
    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(phase = %self.state.phase, error = %message, "group failed");
        self.failed_phase = Some(self.state.phase);
        self.state.error = Some(message);
        self.state.phase = Phase::Complete;
    }

    async fn run_analyze(&mut self) -> Result<()> {
        let analyzer = Analyzer::new(self.package_manager);
        let packages = analyzer.analyze(&self.project_dir).await?;
        if packages.is_empty() {
            self.state.phase = Phase::Complete;
            return Ok(());
        }
        self.ui
            .note(&format!("{} outdated package(s)", packages.len()));
        self.state.plan.packages = packages;
        self.state.phase = Phase::Group;
        Ok(())
    }

    async fn run_group(&mut self) -> Result<()> {
        let grouper = Grouper::new(self.model);
        self.state.plan.groups = grouper.group(&self.state.plan.packages).await;

        if self.state.options.dry_run {
            self.ui.plan(&self.state.plan);
            self.state.phase = Phase::Complete;
            return Ok(());
        }

        self.ui.start_groups(self.state.plan.groups.len() as u64);
        self.state.cursor = 0;
        self.state.phase = Phase::Update;
        Ok(())
    }

    async fn run_update(&mut self) -> Result<()> {
        // A new group gets a fresh source index
        self.index = None;

        let Some(group) = self.state.current_group().cloned() else {
            self.state.phase = Phase::Complete;
            return Ok(());
        };
        self.ui
            .group_start(self.state.cursor, self.state.plan.groups.len(), &group);

        if self.state.options.interactive && !self.ui.confirm_group(&group) {
            tracing::info!(group = %group.label(), "skipped by user");
            self.ui.finish_group();
            if self.state.has_more_groups() {
                self.state.cursor += 1;
            } else {
                self.state.phase = Phase::Complete;
            }
            return Ok(());
        }

        match self.updater.apply_group(&group).await {
            Ok(()) => {
                self.state.retry_count = 0;
                self.state.phase = Phase::Reproduce;
            }
            Err(e) => self.fail(e.to_string()),
        }
        Ok(())
    }

    async fn run_reproduce(&mut self) -> Result<()> {
        let report = self
            .runner
            .run_all(
                &self.state.options.build_command,
                &self.state.options.test_command,
            )
            .await;
        if report.green() {
            self.state.phase = Phase::Commit;
        } else {
            // The retry guard lives in localize so it is checkpointed
            self.state.last_outcome = Some(report);
            self.state.phase = Phase::Localize;
        }
        Ok(())
    }

    fn run_localize(&mut self) -> Result<()> {
        if !self.state.flags.model_enabled {
            self.fail("breakage detected and model-assisted fixing is disabled");
        } else if self.state.retry_count >= self.state.options.max_retries {
            self.fail(format!(
                "still failing after {} fix attempt(s)",
                self.state.retry_count
            ));
        } else {
            self.state.phase = Phase::Fix;
        }
        Ok(())
    }

    async fn run_fix(&mut self) -> Result<()> {
        let Some(group) = self.state.current_group().cloned() else {
            self.fail("fix requested with no group in progress");
            return Ok(());
        };
        let Some(model) = self.model else {
            self.fail("fix requested without a model client");
            return Ok(());
        };
        let primary = primary_package(&group).clone();
        let failing_output = self
            .state
            .last_outcome
            .as_ref()
            .map(|r| r.combined())
            .unwrap_or_default();

        // Docs for every group member, fetched concurrently
        let guide_sets = join_all(
            group
                .packages
                .iter()
                .map(|package| self.doc_search.search(package)),
        )
        .await;
        let guides = docsearch::collate(guide_sets.into_iter().flatten().collect());

        let index = self
            .index
            .get_or_insert_with(|| RepoIndex::build(&self.project_dir));
        let localizer = Localizer::new(index, &self.project_dir);
        let candidates = localizer.localize(&primary, &failing_output);
        self.ui
            .note(&format!("{} candidate file(s)", candidates.len()));

        let fixer = Fixer::new(model, &self.project_dir);
        let edits = fixer
            .generate_edits(&primary, &failing_output, &guides, &candidates)
            .await;

        if edits.is_empty() {
            self.fail("no fixes generated");
            return Ok(());
        }

        if self.state.options.dry_run {
            self.edit_engine.preview_edits(&edits);
            self.state.phase = Phase::Complete;
            return Ok(());
        }

        let report = match &self.vcs {
            Some(vcs) => self.edit_engine.apply_edits_with_validation(&edits, vcs),
            None => self.edit_engine.apply_edits(&edits),
        };
        self.ui.note(&format!(
            "{} edit(s) applied, {} rejected",
            report.applied, report.failed
        ));

        if report.applied == 0 {
            self.fail("no fixes generated");
        } else {
            self.state.retry_count += 1;
            self.state.phase = Phase::Validate;
        }
        Ok(())
    }

    async fn run_validate(&mut self) -> Result<()> {
        let report = self
            .runner
            .run_all(
                &self.state.options.build_command,
                &self.state.options.test_command,
            )
            .await;
        if report.green() {
            self.state.phase = Phase::Commit;
            return Ok(());
        }
        self.state.last_outcome = Some(report);
        if self.state.retry_count < self.state.options.max_retries {
            self.state.phase = Phase::Localize;
        } else {
            self.fail(format!(
                "still failing after {} fix attempt(s)",
                self.state.retry_count
            ));
        }
        Ok(())
    }

    fn run_commit(&mut self) -> Result<()> {
        let Some(group) = self.state.current_group().cloned() else {
            self.state.phase = Phase::Complete;
            return Ok(());
        };

        if self.state.options.create_commits && self.state.flags.is_versioned {
            let Some(vcs) = &self.vcs else {
                self.fail("commits requested but the git repository is unavailable");
                return Ok(());
            };
            let mut paths = vec![
                self.project_dir.join(MANIFEST_FILE),
                self.project_dir.join(LOCKFILE),
            ];
            paths.extend(self.edit_engine.touched_files());
            let message = commit_message(&group);
            match vcs.commit_paths(&paths, &message) {
                Ok(sha) => {
                    self.ui.note(&format!("committed {}", &sha[..8.min(sha.len())]));
                }
                Err(e) => {
                    self.fail(format!("commit failed: {}", e));
                    return Ok(());
                }
            }
        } else if self.state.options.create_commits {
            tracing::warn!("not a git repository; group left uncommitted");
        }

        // The group is durable now; drop its rollback state
        self.updater.clear_backup();
        self.edit_engine.clear_history();
        self.state.completed_groups.push(group.label());
        self.ui.finish_group();

        if self.state.has_more_groups() {
            self.state.cursor += 1;
            self.state.phase = Phase::Update;
        } else {
            self.state.phase = Phase::Complete;
        }
        Ok(())
    }

    /// Terminal handling: roll back on error, clear the checkpoint on
    /// success, emit the summary either way.
    async fn finish(&mut self) -> Result<RunSummary> {
        let failed = self.state.error.is_some();
        if failed {
            // Both rollbacks are best-effort; their failures are logged
            self.updater.rollback().await;
            if let Some(vcs) = &self.vcs {
                if let Err(e) = self.edit_engine.rollback(vcs) {
                    tracing::warn!(error = %e, "edit rollback failed");
                }
            }
        } else if let Err(e) = self.checkpointer.clear() {
            tracing::warn!(error = %e, "failed to remove checkpoint file");
        }

        self.ui.summary(&self.state, self.failed_phase);
        Ok(RunSummary {
            success: !failed,
            completed_groups: self.state.completed_groups.clone(),
            error: self.state.error.clone(),
        })
    }

    #[cfg(test)]
    fn state(&self) -> &RunState {
        &self.state
    }
}

/// The member a fix attempt is framed around: the first major bump, or
/// the first member when none is major.
fn primary_package(group: &PackageGroup) -> &PackageRef {
    group
        .packages
        .iter()
        .find(|p| p.is_major_bump())
        .unwrap_or(&group.packages[0])
}

fn commit_message(group: &PackageGroup) -> String {
    match group.packages.as_slice() {
        [only] => format!(
            "chore(deps): upgrade {} from {} to {}",
            only.name, only.current_version, only.latest_version
        ),
        many => {
            let mut message = format!("chore(deps): upgrade {} packages\n", many.len());
            for package in many {
                message.push_str(&format!(
                    "\n  - {}: {} → {}",
                    package.name, package.current_version, package.latest_version
                ));
            }
            message
        }
    }
}
