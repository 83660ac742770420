//! Durable checkpoints.
//!
//! The state file is a list of `{threadId, phase, state, timestamp}`
//! records so concurrent runs in one directory would not collide; saving
//! overwrites older records for the same thread. Writes go through a temp
//! file plus rename, so a crash never leaves a torn document.

use crate::orchestrator::state::RunState;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = ".devpost-upgrade-state.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointRecord {
    thread_id: String,
    phase: crate::orchestrator::state::Phase,
    state: RunState,
    timestamp: DateTime<Utc>,
}

pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Does a checkpoint file exist at all?
    pub fn has(&self) -> bool {
        self.path.exists()
    }

    fn read_records(&self) -> Vec<CheckpointRecord> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint file unreadable, ignoring");
                Vec::new()
            }
        }
    }

    /// Load the snapshot for one thread, if present.
    pub fn load(&self, thread_id: &str) -> Option<RunState> {
        self.read_records()
            .into_iter()
            .find(|r| r.thread_id == thread_id)
            .map(|r| r.state)
    }

    /// Load the most recently written snapshot across all threads,
    /// returning its thread id so the resumed run keeps writing to the
    /// same record.
    pub fn load_latest(&self) -> Option<(String, RunState)> {
        self.read_records()
            .into_iter()
            .max_by_key(|r| r.timestamp)
            .map(|r| (r.thread_id, r.state))
    }

    /// Persist a snapshot, replacing any older record for the thread.
    /// Atomic: written to a temp file, then renamed into place.
    pub fn save(&self, thread_id: &str, state: &RunState) -> Result<()> {
        let mut records = self.read_records();
        records.retain(|r| r.thread_id != thread_id);
        records.push(CheckpointRecord {
            thread_id: thread_id.to_string(),
            phase: state.phase,
            state: state.clone(),
            timestamp: Utc::now(),
        });

        let text = serde_json::to_string_pretty(&records)
            .context("Failed to serialize checkpoint records")?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, text).context("Failed to write checkpoint temp file")?;
        fs::rename(&temp, &self.path).context("Failed to move checkpoint into place")?;
        Ok(())
    }

    /// Delete the checkpoint file.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove checkpoint file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::orchestrator::state::{Phase, RunFlags};
    use tempfile::tempdir;

    fn state_at(phase: Phase) -> RunState {
        let mut state = RunState::new(RunOptions::default(), RunFlags::default());
        state.phase = phase;
        state
    }

    #[test]
    fn has_reflects_file_presence() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        assert!(!cp.has());
        cp.save("t1", &state_at(Phase::Update)).unwrap();
        assert!(cp.has());
        cp.clear().unwrap();
        assert!(!cp.has());
    }

    #[test]
    fn load_save_round_trip() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        let mut state = state_at(Phase::Validate);
        state.cursor = 2;
        state.retry_count = 1;
        cp.save("t1", &state).unwrap();

        let loaded = cp.load("t1").unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_unknown_thread_yields_none() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        cp.save("t1", &state_at(Phase::Update)).unwrap();
        assert!(cp.load("other").is_none());
    }

    #[test]
    fn newer_record_overwrites_same_thread() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        cp.save("t1", &state_at(Phase::Update)).unwrap();
        cp.save("t1", &state_at(Phase::Commit)).unwrap();

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(cp.path()).unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["phase"], "commit");
    }

    #[test]
    fn records_for_other_threads_survive_saves() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        cp.save("t1", &state_at(Phase::Update)).unwrap();
        cp.save("t2", &state_at(Phase::Fix)).unwrap();
        cp.save("t1", &state_at(Phase::Commit)).unwrap();

        assert_eq!(cp.load("t2").unwrap().phase, Phase::Fix);
        assert_eq!(cp.load("t1").unwrap().phase, Phase::Commit);
    }

    #[test]
    fn corrupt_file_is_ignored_not_fatal() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        fs::write(cp.path(), "{ torn write").unwrap();
        assert!(cp.load("t1").is_none());
        // Saving over a corrupt file recovers it
        cp.save("t1", &state_at(Phase::Analyze)).unwrap();
        assert!(cp.load("t1").is_some());
    }

    #[test]
    fn record_format_matches_documented_shape() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        cp.save("thread-a", &state_at(Phase::Localize)).unwrap();

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(cp.path()).unwrap()).unwrap();
        let record = &records[0];
        assert_eq!(record["threadId"], "thread-a");
        assert_eq!(record["phase"], "localize");
        assert!(record["state"].is_object());
        assert!(record["timestamp"].is_string());
    }

    #[test]
    fn load_latest_returns_newest_record() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        assert!(cp.load_latest().is_none());
        cp.save("t1", &state_at(Phase::Update)).unwrap();
        cp.save("t2", &state_at(Phase::Validate)).unwrap();
        let (thread_id, state) = cp.load_latest().unwrap();
        assert_eq!(thread_id, "t2");
        assert_eq!(state.phase, Phase::Validate);
    }

    #[test]
    fn clear_when_absent_is_ok() {
        let dir = tempdir().unwrap();
        let cp = Checkpointer::new(dir.path());
        cp.clear().unwrap();
    }
}
