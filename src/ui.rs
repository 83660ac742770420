//! Terminal status reporting.
//!
//! One styled line per phase boundary, a group progress bar for long
//! runs, the dry-run plan rendering, and the closing summary.

use crate::grouper::PackageGroup;
use crate::orchestrator::state::{Phase, RunState, UpgradePlan};
use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "");
static WRENCH: Emoji<'_, '_> = Emoji("🔧 ", "");

pub struct StatusUi {
    verbose: bool,
    groups_bar: Option<ProgressBar>,
}

impl StatusUi {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            groups_bar: None,
        }
    }

    /// One-line status at a phase boundary.
    pub fn phase(&self, phase: Phase, detail: &str) {
        let label = style(format!("{:>9}", phase.to_string())).cyan().bold();
        if detail.is_empty() {
            println!("{} ", label);
        } else {
            println!("{} {}", label, detail);
        }
    }

    pub fn note(&self, message: &str) {
        if self.verbose {
            println!("          {}", style(message).dim());
        }
    }

    pub fn start_groups(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("█▓▒░"),
        );
        bar.set_prefix("Groups");
        bar.enable_steady_tick(Duration::from_millis(200));
        self.groups_bar = Some(bar);
    }

    pub fn finish_group(&self) {
        if let Some(bar) = &self.groups_bar {
            bar.inc(1);
        }
    }

    /// Render the plan without executing it.
    pub fn plan(&self, plan: &UpgradePlan) {
        println!(
            "\n{}Upgrade plan: {} packages in {} groups\n",
            PACKAGE,
            plan.packages.len(),
            plan.groups.len()
        );
        for (i, group) in plan.groups.iter().enumerate() {
            println!(
                "  {} {} (priority {})",
                style(format!("group {}", i + 1)).bold(),
                group.label(),
                group.priority
            );
            if !group.reasoning.is_empty() {
                println!("    {}", style(&group.reasoning).dim());
            }
            for package in &group.packages {
                println!(
                    "    {} {} {} {}",
                    package.name,
                    package.current_version,
                    style("→").dim(),
                    style(&package.latest_version).green()
                );
            }
        }
        println!();
    }

    pub fn group_start(&self, index: usize, total: usize, group: &PackageGroup) {
        println!(
            "\n{}Group {}/{}: {} (priority {})",
            WRENCH,
            index + 1,
            total,
            style(group.label()).bold(),
            group.priority
        );
    }

    /// Closing summary; on failure, names the group and phase and points
    /// at `--resume`.
    pub fn summary(&self, state: &RunState, failed_phase: Option<Phase>) {
        if let Some(bar) = &self.groups_bar {
            bar.finish_and_clear();
        }
        println!();
        match &state.error {
            None => {
                if state.options.dry_run {
                    println!("{}Dry run complete; nothing was changed", CHECK);
                } else if state.completed_groups.is_empty() {
                    println!("{}Nothing to upgrade, project is current", CHECK);
                } else {
                    println!(
                        "{}Upgraded {} group(s): {}",
                        CHECK,
                        state.completed_groups.len(),
                        state.completed_groups.join(", ")
                    );
                }
            }
            Some(error) => {
                let group = state
                    .current_group()
                    .map(|g| g.label())
                    .unwrap_or_else(|| "?".to_string());
                let phase = failed_phase.unwrap_or(state.phase);
                println!(
                    "{}Group {} failed during {}: {}",
                    CROSS,
                    style(group).bold(),
                    phase,
                    error
                );
                println!(
                    "   Changes were rolled back. The checkpoint remains; try {} to continue.",
                    style("--resume").yellow()
                );
            }
        }
    }

    /// Interactive gate before a group's update.
    pub fn confirm_group(&self, group: &PackageGroup) -> bool {
        let prompt = format!("Upgrade {}?", group.label());
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}
