//! Changelog retrieval and version-window slicing.

use crate::manifest::coerce_version;
use regex::Regex;
use std::sync::LazyLock;

/// Common changelog filenames, probed on both default branches.
pub const CHANGELOG_FILES: &[&str] = &[
    "CHANGELOG.md",
    "CHANGES.md",
    "HISTORY.md",
    "changelog.md",
    "RELEASES.md",
];

pub const DEFAULT_BRANCHES: &[&str] = &["main", "master"];

const WINDOW_LINE_CAP: usize = 150;

/// A changelog header line announcing a release, e.g. `## [5.0.0]` or
/// `# v18.2.0 (2022-06-14)`.
static VERSION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s.*?v?(\d+\.\d+(?:\.\d+)?)").unwrap());

fn header_major(line: &str) -> Option<u64> {
    let caps = VERSION_HEADER.captures(line)?;
    coerce_version(&caps[1]).map(|v| v.major)
}

/// Slice a changelog to the window between the current and the target
/// major versions. Capture starts at a header whose major is in
/// `(from, to]` and stops at the first header at or below `from`; output
/// is capped at 150 lines.
pub fn version_window(changelog: &str, from: &str, to: &str) -> Option<String> {
    let from_major = coerce_version(from)?.major;
    let to_major = coerce_version(to)?.major;

    let mut captured: Vec<&str> = Vec::new();
    let mut capturing = false;

    for line in changelog.lines() {
        if let Some(major) = header_major(line) {
            if major <= from_major {
                break;
            }
            capturing = major <= to_major;
        }
        if capturing {
            captured.push(line);
            if captured.len() >= WINDOW_LINE_CAP {
                break;
            }
        }
    }

    if captured.is_empty() {
        None
    } else {
        Some(captured.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANGELOG: &str = "\
# Changelog

## 6.0.0
- future things

## [5.3.0]
- dropped node 14

## v5.0.0 (2023-06-01)
- esm only now

## 4.1.2
- bugfix

## 4.0.0
- old release
";

    #[test]
    fn window_captures_between_from_and_to_majors() {
        let window = version_window(CHANGELOG, "4.0.0", "5.3.0").unwrap();
        assert!(window.contains("## [5.3.0]"));
        assert!(window.contains("esm only now"));
        assert!(!window.contains("future things"));
        assert!(!window.contains("bugfix"));
    }

    #[test]
    fn window_stops_at_first_header_at_or_below_from() {
        let window = version_window(CHANGELOG, "4.0.0", "6.0.0").unwrap();
        assert!(window.contains("future things"));
        assert!(window.contains("dropped node 14"));
        assert!(!window.contains("old release"));
    }

    #[test]
    fn no_relevant_headers_yields_none() {
        assert!(version_window(CHANGELOG, "6.0.0", "7.0.0").is_none());
        assert!(version_window("just prose, no headers", "1.0.0", "2.0.0").is_none());
    }

    #[test]
    fn uncoercible_versions_yield_none() {
        assert!(version_window(CHANGELOG, "latest", "5.0.0").is_none());
    }

    #[test]
    fn window_is_capped_at_150_lines() {
        let mut changelog = String::from("## 5.0.0\n");
        for i in 0..300 {
            changelog.push_str(&format!("- change number {}\n", i));
        }
        changelog.push_str("## 4.0.0\n- old\n");
        let window = version_window(&changelog, "4.0.0", "5.0.0").unwrap();
        assert_eq!(window.lines().count(), 150);
    }

    #[test]
    fn two_part_versions_in_headers_are_coerced() {
        let changelog = "## 5.3\n- short header\n## 4.0\n- old\n";
        let window = version_window(changelog, "4.0.0", "5.3.0").unwrap();
        assert!(window.contains("short header"));
    }
}
