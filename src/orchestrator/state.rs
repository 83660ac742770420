//! Durable run state.
//!
//! `RunState` is the single snapshot the checkpointer persists after every
//! transition. It is owned exclusively by the orchestrator; everything in
//! it serializes, so a resumed process reconstructs the run exactly.

use crate::analyzer::PackageRef;
use crate::config::RunOptions;
use crate::grouper::PackageGroup;
use crate::runner::RunReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The nine phases of the upgrade state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    Group,
    Update,
    Reproduce,
    Localize,
    Fix,
    Validate,
    Commit,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Analyze => "analyze",
            Phase::Group => "group",
            Phase::Update => "update",
            Phase::Reproduce => "reproduce",
            Phase::Localize => "localize",
            Phase::Fix => "fix",
            Phase::Validate => "validate",
            Phase::Commit => "commit",
            Phase::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// The ordered work plan: all outdated packages plus their grouping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub packages: Vec<PackageRef>,
    pub groups: Vec<PackageGroup>,
}

/// Environment facts probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub is_versioned: bool,
    pub model_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: Phase,
    pub plan: UpgradePlan,
    /// Index of the group in progress.
    pub cursor: usize,
    /// Fix attempts within the current group.
    pub retry_count: u32,
    /// Labels of groups already committed.
    pub completed_groups: Vec<String>,
    pub last_outcome: Option<RunReport>,
    pub error: Option<String>,
    pub options: RunOptions,
    pub flags: RunFlags,
}

impl RunState {
    pub fn new(options: RunOptions, flags: RunFlags) -> Self {
        Self {
            phase: Phase::Analyze,
            plan: UpgradePlan::default(),
            cursor: 0,
            retry_count: 0,
            completed_groups: Vec::new(),
            last_outcome: None,
            error: None,
            options,
            flags,
        }
    }

    pub fn current_group(&self) -> Option<&PackageGroup> {
        self.plan.groups.get(self.cursor)
    }

    pub fn has_more_groups(&self) -> bool {
        self.cursor + 1 < self.plan.groups.len()
    }
}
