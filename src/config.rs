//! Runtime configuration.
//!
//! Options come from three layers: built-in defaults, an optional JSON
//! config file at the project root, and CLI flags. CLI wins; the
//! `migrationDocs` maps are merged with CLI URLs appended after file URLs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".devpost-upgrade.json";

const DEFAULT_BUILD_COMMAND: &str = "npm run build";
const DEFAULT_TEST_COMMAND: &str = "npm test";
const DEFAULT_MAX_RETRIES: u32 = 3;

/// `migrationDocs` values accept a single URL or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocUrls {
    One(String),
    Many(Vec<String>),
}

impl DocUrls {
    fn into_vec(self) -> Vec<String> {
        match self {
            DocUrls::One(url) => vec![url],
            DocUrls::Many(urls) => urls,
        }
    }
}

/// The on-disk config file, all keys optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub build_command: Option<String>,
    pub test_command: Option<String>,
    pub max_retries: Option<u32>,
    pub create_commits: Option<bool>,
    pub model_name: Option<String>,
    pub dry_run: Option<bool>,
    pub interactive: Option<bool>,
    pub migration_docs: BTreeMap<String, DocUrls>,
}

impl FileConfig {
    fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))
    }
}

/// CLI-sourced overrides; `None` means the flag was not given.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub build_command: Option<String>,
    pub test_command: Option<String>,
    pub max_retries: Option<u32>,
    pub no_commit: bool,
    pub dry_run: bool,
    pub interactive: bool,
    /// Repeatable `pkg=url` pairs, appended after file-config URLs.
    pub migration_docs: Vec<(String, String)>,
}

/// The effective options for one run. Serialized into the checkpoint so a
/// resumed run continues with the same settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub build_command: String,
    pub test_command: String,
    pub max_retries: u32,
    pub create_commits: bool,
    pub model_name: String,
    pub dry_run: bool,
    pub interactive: bool,
    pub migration_docs: BTreeMap<String, Vec<String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            test_command: DEFAULT_TEST_COMMAND.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            create_commits: true,
            model_name: crate::model::DEFAULT_MODEL.to_string(),
            dry_run: false,
            interactive: false,
            migration_docs: BTreeMap::new(),
        }
    }
}

impl RunOptions {
    /// Merge defaults <- config file <- CLI flags.
    pub fn load(project_dir: &Path, cli: CliOverrides) -> Result<Self> {
        let file = FileConfig::load(project_dir)?;
        let mut options = Self::default();

        if let Some(v) = file.build_command {
            options.build_command = v;
        }
        if let Some(v) = file.test_command {
            options.test_command = v;
        }
        if let Some(v) = file.max_retries {
            options.max_retries = v;
        }
        if let Some(v) = file.create_commits {
            options.create_commits = v;
        }
        if let Some(v) = file.model_name {
            options.model_name = v;
        }
        if let Some(v) = file.dry_run {
            options.dry_run = v;
        }
        if let Some(v) = file.interactive {
            options.interactive = v;
        }
        for (pkg, urls) in file.migration_docs {
            options.migration_docs.insert(pkg, urls.into_vec());
        }

        if let Some(v) = cli.build_command {
            options.build_command = v;
        }
        if let Some(v) = cli.test_command {
            options.test_command = v;
        }
        if let Some(v) = cli.max_retries {
            options.max_retries = v;
        }
        if cli.no_commit {
            options.create_commits = false;
        }
        if cli.dry_run {
            options.dry_run = true;
        }
        if cli.interactive {
            options.interactive = true;
        }
        for (pkg, url) in cli.migration_docs {
            options.migration_docs.entry(pkg).or_default().push(url);
        }

        Ok(options)
    }
}

/// Resolve and canonicalize the project directory.
pub fn resolve_project_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    dir.canonicalize().context("Failed to resolve project directory")
}

/// Parse a repeatable `pkg=url` flag value.
pub fn parse_migration_doc(value: &str) -> Result<(String, String)> {
    let (pkg, url) = value
        .split_once('=')
        .context("expected <pkg>=<url>")?;
    if pkg.is_empty() || url.is_empty() {
        anyhow::bail!("expected <pkg>=<url>, got '{}'", value);
    }
    Ok((pkg.to_string(), url.to_string()))
}
