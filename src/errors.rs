//! Typed error hierarchy for the upgrade engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `UpgradeError` — environmental and orchestration failures
//! - `ModelError` — language-model request failures
//! - `EditError` — source-edit application failures

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the orchestration engine and its environment.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("Failed to read manifest at {path}: {source}")]
    ManifestReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest at {path} is not valid JSON: {source}")]
    ManifestMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write manifest at {path}: {source}")]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Package manager unavailable: {0}")]
    PackageManagerUnavailable(String),

    #[error("Install failed for group '{group}': {message}")]
    InstallFailed { group: String, message: String },

    #[error("Git repository unavailable: {0}")]
    VcsUnavailable(String),

    #[error("Package {package} not found in dependencies or devDependencies")]
    PackageNotInManifest { package: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the model client.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Model request failed after {attempts} attempts: {message}")]
    RequestFailed { attempts: u32, message: String },

    #[error("Model returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Model response had no text content")]
    EmptyResponse,
}

/// Errors from applying a single source edit.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("File {path} could not be read: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Search text not found in {path}")]
    NoMatch { path: PathBuf },

    #[error("Search text matched {count} times in {path}; exactly one match required")]
    AmbiguousMatch { path: PathBuf, count: usize },

    #[error("File {path} could not be written: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
