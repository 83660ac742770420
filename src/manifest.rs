//! Reading and writing the package manifest.
//!
//! The manifest is an ecosystem-standard JSON document with top-level
//! `dependencies` and `devDependencies` maps of `name -> version range`.
//! The full document is kept as a JSON map so unrelated fields survive a
//! write untouched; writes always end with a newline.

use crate::errors::UpgradeError;
use semver::Version;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCKFILE: &str = "package-lock.json";

/// Which dependency section a package lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepSection {
    Runtime,
    Dev,
}

impl DepSection {
    pub fn key(&self) -> &'static str {
        match self {
            DepSection::Runtime => "dependencies",
            DepSection::Dev => "devDependencies",
        }
    }
}

/// How large a version jump an upgrade is. Cosmetic only; used for log
/// lines and the deterministic grouping fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Major,
    Minor,
    Patch,
    Unknown,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Major => "major",
            ChangeKind::Minor => "minor",
            ChangeKind::Patch => "patch",
            ChangeKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl ChangeKind {
    /// Classify the jump between two cleaned version strings.
    pub fn classify(from: &str, to: &str) -> Self {
        match (coerce_version(from), coerce_version(to)) {
            (Some(a), Some(b)) => {
                if a.major != b.major {
                    ChangeKind::Major
                } else if a.minor != b.minor {
                    ChangeKind::Minor
                } else {
                    ChangeKind::Patch
                }
            }
            _ => ChangeKind::Unknown,
        }
    }
}

/// Strip any leading range operator from a version string so downstream
/// components see a bare semantic version: `^5.3.0` -> `5.3.0`.
pub fn clean_version(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(['^', '~', '=', '>', '<'])
        .trim_start_matches('v')
        .trim()
        .to_string()
}

/// Coerce a loose version string into a full semver `Version`, padding
/// missing minor/patch components with zeros. `5.3` -> `5.3.0`.
pub fn coerce_version(raw: &str) -> Option<Version> {
    let cleaned = clean_version(raw);
    // Drop pre-release/build suffixes for coercion purposes
    let core: String = cleaned
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = core.split('.').filter(|p| !p.is_empty());
    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// The project manifest, held as a full JSON document.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl Manifest {
    pub fn load(project_dir: &Path) -> Result<Self, UpgradeError> {
        let path = project_dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|source| {
            UpgradeError::ManifestReadFailed {
                path: path.clone(),
                source,
            }
        })?;
        let doc: Map<String, Value> = serde_json::from_str(&text).map_err(|source| {
            UpgradeError::ManifestMalformed {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the document the way `save` would write it.
    pub fn to_text(&self) -> String {
        let mut text = serde_json::to_string_pretty(&Value::Object(self.doc.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }

    pub fn save(&self) -> Result<(), UpgradeError> {
        fs::write(&self.path, self.to_text()).map_err(|source| {
            UpgradeError::ManifestWriteFailed {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn section(&self, section: DepSection) -> Option<&Map<String, Value>> {
        self.doc.get(section.key()).and_then(Value::as_object)
    }

    /// All declared dependencies as `(name, range, section)` tuples,
    /// runtime section first.
    pub fn all_dependencies(&self) -> Vec<(String, String, DepSection)> {
        let mut out = Vec::new();
        for section in [DepSection::Runtime, DepSection::Dev] {
            if let Some(map) = self.section(section) {
                for (name, range) in map {
                    if let Some(range) = range.as_str() {
                        out.push((name.clone(), range.to_string(), section));
                    }
                }
            }
        }
        out
    }

    /// Look up the declared range for a package in either section.
    pub fn range_of(&self, name: &str) -> Option<(&str, DepSection)> {
        for section in [DepSection::Runtime, DepSection::Dev] {
            if let Some(range) = self.section(section).and_then(|m| m.get(name)) {
                if let Some(range) = range.as_str() {
                    return Some((range, section));
                }
            }
        }
        None
    }

    /// Overwrite a package's range in whichever section declares it.
    pub fn set_range(&mut self, name: &str, range: &str) -> Result<DepSection, UpgradeError> {
        for section in [DepSection::Runtime, DepSection::Dev] {
            let has = self
                .section(section)
                .map(|m| m.contains_key(name))
                .unwrap_or(false);
            if has {
                if let Some(map) = self
                    .doc
                    .get_mut(section.key())
                    .and_then(Value::as_object_mut)
                {
                    map.insert(name.to_string(), Value::String(range.to_string()));
                    return Ok(section);
                }
            }
        }
        Err(UpgradeError::PackageNotInManifest {
            package: name.to_string(),
        })
    }
}
