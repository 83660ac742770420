//! Candidate-file selection for a failing upgrade.
//!
//! Several heuristics feed one ranked list: paths mentioned in the build
//! and test output, files importing the upgraded package, short-name and
//! sibling probes for ecosystem bundles, and as a last resort a bounded
//! slice of the source tree. Scores are additive and the heuristics are
//! data, not contracts.

use crate::analyzer::PackageRef;
use crate::repo_index::RepoIndex;
use crate::runner::OutputPattern;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

/// Hard bound on the everything-under-src degradation so fixer prompts
/// stay inside a sane window.
const FALLBACK_FILE_CAP: usize = 25;

/// Path-recognition patterns over combined build+test output.
pub static PATH_PATTERNS: LazyLock<Vec<OutputPattern>> = LazyLock::new(|| {
    [
        // file:///abs/path/to/module.ts and bare absolute module URLs
        ("module-url", r"(?:file://)?(/[\w\-. /]*?[\w\-.]+\.(?:js|jsx|ts|tsx|mjs|cjs))"),
        // tsc-style diagnostics: src/app.tsx(12,5)
        ("compiler-diagnostic", r"([\w\-./]+\.(?:js|jsx|ts|tsx))\(\d+,\d+\)"),
        // generic file:line:col references
        ("line-reference", r"([\w\-./]+\.(?:js|jsx|ts|tsx|mjs|cjs)):\d+:\d+"),
        // test-runner stack frames: at fn (src/file.ts:1:2)
        ("test-frame", r"at [^(]*\(([^():]+\.(?:js|jsx|ts|tsx)):\d+:\d+\)"),
        // unresolved-module messages quoting the importing file
        ("unresolved-module", r"'(\.{0,2}/[\w\-./]+\.(?:js|jsx|ts|tsx))'"),
    ]
    .into_iter()
    .map(|(name, pattern)| OutputPattern {
        name,
        regex: Regex::new(pattern).expect("invalid path pattern"),
    })
    .collect()
});

/// Sibling packages worth probing when a well-known bundle member breaks.
fn known_siblings(package: &str) -> &'static [&'static str] {
    match package {
        "react" => &["react-dom", "react-router-dom"],
        "react-dom" => &["react"],
        "vue" => &["vue-router", "vuex", "pinia"],
        "@angular/core" => &["@angular/common", "@angular/platform-browser"],
        "jest" => &["ts-jest", "babel-jest", "@types/jest"],
        "eslint" => &["@typescript-eslint/parser", "@typescript-eslint/eslint-plugin"],
        _ => &[],
    }
}

pub struct Localizer<'a> {
    index: &'a RepoIndex,
    project_dir: &'a Path,
}

impl<'a> Localizer<'a> {
    pub fn new(index: &'a RepoIndex, project_dir: &'a Path) -> Self {
        Self { index, project_dir }
    }

    /// Produce a prioritized list of candidate files to edit.
    pub fn localize(&self, package: &PackageRef, output: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |path: String, candidates: &mut Vec<String>| {
            if seen.insert(path.clone()) {
                candidates.push(path);
            }
        };

        // 1. Paths the output itself points at
        for path in self.paths_from_output(output) {
            push(path, &mut candidates);
        }

        // 2. Files importing the upgraded package
        for path in self.index.find_files_importing(&package.name) {
            push(path, &mut candidates);
        }

        // 3. Small unions get short-name and sibling probes
        if candidates.len() < 3 {
            if let Some(short) = short_name(&package.name) {
                for path in self.index.find_files_importing(short) {
                    push(path, &mut candidates);
                }
            }
            for sibling in known_siblings(&package.name) {
                for path in self.index.find_files_importing(sibling) {
                    push(path, &mut candidates);
                }
            }
        }

        // 4. Last resort: a bounded slice of the source tree
        if candidates.is_empty() {
            let mut fallback = self.index.files_under(&["src", "lib"]);
            sort_by_score(&mut fallback);
            fallback.truncate(FALLBACK_FILE_CAP);
            for path in fallback {
                push(path, &mut candidates);
            }
        }

        sort_by_score(&mut candidates);
        candidates
    }

    /// Extract file paths from output lines. Absolute paths are trimmed
    /// against the working directory; anything still absolute is rejected.
    fn paths_from_output(&self, output: &str) -> Vec<String> {
        let prefix = self.project_dir.to_string_lossy();
        let mut paths = Vec::new();

        for pattern in PATH_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(output) {
                let raw = caps[1].trim();
                let mut path = raw
                    .strip_prefix(prefix.as_ref())
                    .unwrap_or(raw)
                    .trim_start_matches('/')
                    .trim_start_matches("./")
                    .to_string();
                if raw.starts_with('/') && !raw.starts_with(prefix.as_ref()) {
                    // Absolute path outside the project
                    continue;
                }
                path = path.replace('\\', "/");
                if self.index.files.contains_key(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }
}

/// Scoped packages probe their unscoped tail: `@scope/pkg` -> `pkg`.
fn short_name(package: &str) -> Option<&str> {
    package.rsplit_once('/').map(|(_, tail)| tail)
}

pub fn score(path: &str) -> i32 {
    let mut score = 0;
    if path.starts_with("src/") {
        score += 10;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name.contains("index") {
        score += 5;
    }
    if path.contains("component") || path.contains("page") {
        score += 3;
    }
    if path.ends_with(".tsx") || path.ends_with(".jsx") {
        score += 2;
    }
    if path.contains("test") || path.contains("spec") {
        score -= 5;
    }
    score
}

fn sort_by_score(paths: &mut [String]) {
    paths.sort_by_key(|p| std::cmp::Reverse(score(p)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn pkg(name: &str) -> PackageRef {
        PackageRef {
            name: name.to_string(),
            current_version: "1.0.0".to_string(),
            latest_version: "2.0.0".to_string(),
            homepage: None,
        }
    }

    fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, RepoIndex) {
        let dir = tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let index = RepoIndex::build(dir.path());
        (dir, index)
    }

    #[test]
    fn scoring_matches_the_table() {
        assert_eq!(score("src/app.tsx"), 12);
        assert_eq!(score("src/index.ts"), 15);
        assert_eq!(score("src/components/button.tsx"), 15);
        assert_eq!(score("lib/util.js"), 0);
        assert_eq!(score("src/app.test.tsx"), 7);
        assert_eq!(score("test/helpers.js"), -5);
    }

    #[test]
    fn output_paths_rank_ahead_of_low_value_files() {
        let (dir, index) = project(&[
            ("src/app.tsx", "import React from 'react';\n"),
            ("scripts/build.js", "const x = require('react');\n"),
        ]);
        let localizer = Localizer::new(&index, dir.path());
        let output = "src/app.tsx(3,1): error TS2305: no exported member";
        let files = localizer.localize(&pkg("react"), output);
        assert_eq!(files[0], "src/app.tsx");
        assert!(files.contains(&"scripts/build.js".to_string()));
    }

    #[test]
    fn absolute_paths_inside_project_are_normalized() {
        let (dir, index) = project(&[("src/main.ts", "import 'chalk';\n")]);
        let localizer = Localizer::new(&index, dir.path());
        let output = format!(
            "Error at {}/src/main.ts:4:11\n",
            dir.path().to_string_lossy()
        );
        let files = localizer.localize(&pkg("chalk"), &output);
        assert!(files.contains(&"src/main.ts".to_string()));
    }

    #[test]
    fn absolute_paths_outside_project_are_rejected() {
        let (dir, index) = project(&[("src/main.ts", "const a = 1;\n")]);
        let localizer = Localizer::new(&index, dir.path());
        let output = "at /usr/lib/node_modules/jest/build/run.js:10:5";
        let files = localizer.localize(&pkg("left-pad"), output);
        assert!(!files.iter().any(|f| f.contains("node_modules")));
    }

    #[test]
    fn importing_files_are_candidates_without_output_mention() {
        let (dir, index) = project(&[
            ("src/render.tsx", "import { render } from 'react-dom';\n"),
            ("src/other.ts", "export const x = 1;\n"),
        ]);
        let localizer = Localizer::new(&index, dir.path());
        let files = localizer.localize(&pkg("react-dom"), "tests failed");
        assert_eq!(files, vec!["src/render.tsx"]);
    }

    #[test]
    fn sibling_probe_kicks_in_for_small_unions() {
        let (dir, index) = project(&[(
            "src/app.jsx",
            "import { createRoot } from 'react-dom/client';\n",
        )]);
        let localizer = Localizer::new(&index, dir.path());
        // react itself is imported nowhere, but its sibling react-dom is
        let files = localizer.localize(&pkg("react"), "");
        assert_eq!(files, vec!["src/app.jsx"]);
    }

    #[test]
    fn scoped_package_probes_short_name() {
        let (dir, index) = project(&[("src/query.ts", "import { useQuery } from 'query';\n")]);
        let localizer = Localizer::new(&index, dir.path());
        let files = localizer.localize(&pkg("@tanstack/query"), "");
        assert_eq!(files, vec!["src/query.ts"]);
    }

    #[test]
    fn degrades_to_bounded_source_slice_when_nothing_matches() {
        let mut files: Vec<(String, String)> = Vec::new();
        for i in 0..30 {
            files.push((format!("src/mod{:02}.ts", i), "export {};\n".to_string()));
        }
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let (dir, index) = project(&refs);
        let localizer = Localizer::new(&index, dir.path());
        let candidates = localizer.localize(&pkg("unknown-pkg"), "no paths here");
        assert_eq!(candidates.len(), FALLBACK_FILE_CAP);
        assert!(candidates.iter().all(|p| p.starts_with("src/")));
    }

    #[test]
    fn test_files_sort_last() {
        let (dir, index) = project(&[
            ("src/app.test.ts", "import 'chalk';\n"),
            ("src/app.ts", "import 'chalk';\n"),
        ]);
        let localizer = Localizer::new(&index, dir.path());
        let files = localizer.localize(&pkg("chalk"), "");
        assert_eq!(files[0], "src/app.ts");
        assert_eq!(files[1], "src/app.test.ts");
    }

    #[test]
    fn path_pattern_table_names_are_stable() {
        let names: Vec<&str> = PATH_PATTERNS.iter().map(|p| p.name).collect();
        assert!(names.contains(&"compiler-diagnostic"));
        assert!(names.contains(&"test-frame"));
        assert!(names.contains(&"unresolved-module"));
    }
}
