//! Upgrade-plan grouping.
//!
//! The model-assisted path asks for reasoned groups with priorities and
//! validates the answer strictly: unknown names, duplicates, or incomplete
//! coverage reject the whole response. Any failure falls back to the
//! deterministic major/non-major split. Grouping affects ordering and
//! commit granularity, never correctness, so the fallback stays coarse.

use crate::analyzer::PackageRef;
use crate::model::ModelClient;
use crate::util;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const FALLBACK_MAJOR_PRIORITY: i32 = 2;
const FALLBACK_MINOR_PRIORITY: i32 = 1;

/// An ordered batch of packages sharing one upgrade and one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGroup {
    pub packages: Vec<PackageRef>,
    pub reasoning: String,
    pub priority: i32,
}

impl PackageGroup {
    /// Short human label: single name or `N packages`.
    pub fn label(&self) -> String {
        match self.packages.as_slice() {
            [only] => only.name.clone(),
            many => format!("{} packages", many.len()),
        }
    }
}

/// The model's envelope shape.
#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    packages: Vec<String>,
    #[serde(default)]
    reasoning: String,
    priority: i32,
}

pub struct Grouper<'a> {
    model: Option<&'a dyn ModelClient>,
}

impl<'a> Grouper<'a> {
    pub fn new(model: Option<&'a dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Partition packages into ordered groups, descending priority.
    pub async fn group(&self, refs: &[PackageRef]) -> Vec<PackageGroup> {
        if refs.is_empty() {
            return Vec::new();
        }

        if let Some(model) = self.model {
            match self.group_with_model(model, refs).await {
                Ok(groups) => return groups,
                Err(reason) => {
                    tracing::warn!(reason, "model grouping rejected; using fallback");
                }
            }
        }
        fallback_groups(refs)
    }

    async fn group_with_model(
        &self,
        model: &dyn ModelClient,
        refs: &[PackageRef],
    ) -> Result<Vec<PackageGroup>, String> {
        let prompt = build_prompt(refs);
        let response = model
            .generate(&prompt)
            .await
            .map_err(|e| format!("model unavailable: {}", e))?;

        let json = util::extract_json(&response).ok_or("no JSON in response")?;
        let envelope: GroupEnvelope =
            serde_json::from_str(&json).map_err(|e| format!("malformed response: {}", e))?;
        validate_groups(envelope.groups, refs)
    }
}

fn build_prompt(refs: &[PackageRef]) -> String {
    let mut listing = String::new();
    for r in refs {
        listing.push_str(&format!(
            "- {}: {} -> {} ({} bump)\n",
            r.name,
            r.current_version,
            r.latest_version,
            r.change_kind()
        ));
    }

    format!(
        r#"You are planning dependency upgrades for a JavaScript/TypeScript project.

Partition these outdated packages into upgrade groups. Packages that must move together (same framework, peer dependencies) belong in one group. Riskier groups get higher priority so they are attempted first.

PACKAGES
{listing}
Respond with only a JSON object of the form:
{{"groups": [{{"packages": ["name", ...], "reasoning": "why these belong together", "priority": 1}}]}}

Rules:
- every package appears in exactly one group
- priority is an integer from 1 to 10, higher runs first
- do not invent package names"#
    )
}

/// Check the model's partition and turn it into `PackageGroup`s. The
/// response is rejected wholesale on unknown names, duplicates, or
/// packages left unassigned.
fn validate_groups(raw: Vec<RawGroup>, refs: &[PackageRef]) -> Result<Vec<PackageGroup>, String> {
    if raw.is_empty() {
        return Err("empty group list".to_string());
    }

    let known: HashSet<&str> = refs.iter().map(|r| r.name.as_str()).collect();
    let mut assigned: HashSet<&str> = HashSet::new();

    let mut groups = Vec::new();
    for raw_group in &raw {
        let mut packages = Vec::new();
        for name in &raw_group.packages {
            if !known.contains(name.as_str()) {
                return Err(format!("unknown package '{}'", name));
            }
            if !assigned.insert(name.as_str()) {
                return Err(format!("package '{}' assigned twice", name));
            }
            let r = refs.iter().find(|r| r.name == *name).unwrap();
            packages.push(r.clone());
        }
        if !(1..=10).contains(&raw_group.priority) {
            return Err(format!("priority {} out of range", raw_group.priority));
        }
        if packages.is_empty() {
            continue;
        }
        groups.push(PackageGroup {
            packages,
            reasoning: raw_group.reasoning.clone(),
            priority: raw_group.priority,
        });
    }

    if assigned.len() != known.len() {
        return Err("not every package was assigned to a group".to_string());
    }

    // Descending priority; stable sort keeps response order on ties
    groups.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(groups)
}

/// Deterministic two-way split: major bumps first, the rest after. Empty
/// partitions are omitted.
fn fallback_groups(refs: &[PackageRef]) -> Vec<PackageGroup> {
    let (major, minor): (Vec<_>, Vec<_>) = refs.iter().cloned().partition(|r| r.is_major_bump());

    let mut groups = Vec::new();
    if !major.is_empty() {
        groups.push(PackageGroup {
            packages: major,
            reasoning: "major version bumps, most likely to break".to_string(),
            priority: FALLBACK_MAJOR_PRIORITY,
        });
    }
    if !minor.is_empty() {
        groups.push(PackageGroup {
            packages: minor,
            reasoning: "minor and patch updates".to_string(),
            priority: FALLBACK_MINOR_PRIORITY,
        });
    }
    groups
}
