//! Build and test command execution.
//!
//! Commands are plain strings parsed with paired single/double quotes (no
//! escape sequences, no variable expansion), then spawned directly. A
//! non-zero exit is a reported outcome, not a fault; only spawn failures
//! surface as synthetic failing outcomes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;

/// Result of one command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl TestOutcome {
    pub fn skipped(reason: &str) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("skipped: {}", reason),
            exit_code: -1,
        }
    }

    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Build outcome plus test outcome for one reproduce/validate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub build: TestOutcome,
    pub tests: TestOutcome,
}

impl RunReport {
    pub fn green(&self) -> bool {
        self.build.success && self.tests.success
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.build.combined(), self.tests.combined())
    }
}

/// Split a command string into program + argv, honoring paired single and
/// double quotes. Quotes group words; nothing is escaped or expanded.
pub fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Runs build/test commands in the project directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    project_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Run a single command to completion, capturing stdout/stderr/exit.
    pub async fn run(&self, command: &str) -> TestOutcome {
        let words = split_command(command);
        let Some((program, args)) = words.split_first() else {
            return TestOutcome::skipped("empty command");
        };

        tracing::debug!(command, "running command");
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .await;

        match output {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(-1);
                TestOutcome {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code,
                }
            }
            Err(e) => TestOutcome {
                success: false,
                stdout: String::new(),
                stderr: format!("failed to spawn '{}': {}", program, e),
                exit_code: -1,
            },
        }
    }

    /// Run build, then tests only if the build passed. A red build reports
    /// tests as skipped.
    pub async fn run_all(&self, build_command: &str, test_command: &str) -> RunReport {
        let build = self.run(build_command).await;
        let tests = if build.success {
            self.run(test_command).await
        } else {
            TestOutcome::skipped("build failed")
        };
        RunReport { build, tests }
    }
}

/// A named heuristic pattern. The table is data: tests pin the names, the
/// extraction functions iterate the set.
pub struct OutputPattern {
    pub name: &'static str,
    pub regex: Regex,
}

/// Lines worth showing a model or a human when a run goes red.
pub static ERROR_LINE_PATTERNS: LazyLock<Vec<OutputPattern>> = LazyLock::new(|| {
    [
        ("ts-diagnostic", r"error TS\d+"),
        ("compiler-error", r"(?i)\berror\b"),
        ("test-failure", r"(?i)\b(failed|failing|FAIL)\b"),
        ("missing-module", r"(?i)cannot find module"),
        ("unresolved-import", r"(?i)module not found"),
        ("runtime-throw", r"\b(TypeError|ReferenceError|SyntaxError|RangeError)\b"),
        ("assertion", r"(?i)expected .* (to|but)"),
    ]
    .into_iter()
    .map(|(name, pattern)| OutputPattern {
        name,
        regex: Regex::new(pattern).expect("invalid error pattern"),
    })
    .collect()
});

/// Pick the most informative lines from combined build+test output.
/// Order is preserved; duplicates dropped; the list is capped.
pub fn extract_error_lines(output: &str, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut lines = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if ERROR_LINE_PATTERNS.iter().any(|p| p.regex.is_match(trimmed))
            && seen.insert(trimmed.to_string())
        {
            lines.push(trimmed.to_string());
            if lines.len() >= cap {
                break;
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ── split_command ────────────────────────────────────────────────

    #[test]
    fn split_plain_words() {
        assert_eq!(split_command("npm run build"), vec!["npm", "run", "build"]);
    }

    #[test]
    fn split_honors_double_quotes() {
        assert_eq!(
            split_command(r#"node -e "console.log(1 + 2)""#),
            vec!["node", "-e", "console.log(1 + 2)"]
        );
    }

    #[test]
    fn split_honors_single_quotes() {
        assert_eq!(
            split_command("sh -c 'echo hello world'"),
            vec!["sh", "-c", "echo hello world"]
        );
    }

    #[test]
    fn split_mixed_quote_kinds() {
        assert_eq!(
            split_command(r#"cmd 'a "b" c' "d 'e' f""#),
            vec!["cmd", r#"a "b" c"#, "d 'e' f"]
        );
    }

    #[test]
    fn split_adjacent_quoted_segments_join() {
        assert_eq!(split_command(r#"echo "a"'b'"#), vec!["echo", "ab"]);
    }

    #[test]
    fn split_empty_command() {
        assert!(split_command("").is_empty());
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn split_empty_quoted_word_is_kept() {
        assert_eq!(split_command(r#"cmd """#), vec!["cmd", ""]);
    }

    // ── CommandRunner ────────────────────────────────────────────────

    #[tokio::test]
    async fn run_captures_stdout_and_exit() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let outcome = runner.run("echo hello").await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn run_nonzero_exit_is_an_outcome_not_a_fault() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let outcome = runner.run("false").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 1);
    }

    #[tokio::test]
    async fn run_spawn_failure_reported_in_stderr() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let outcome = runner.run("definitely-not-a-real-binary-xyz").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn run_all_green_runs_both() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let report = runner.run_all("true", "echo tests-ok").await;
        assert!(report.green());
        assert!(report.tests.stdout.contains("tests-ok"));
    }

    #[tokio::test]
    async fn run_all_red_build_skips_tests() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let report = runner.run_all("false", "echo should-not-run").await;
        assert!(!report.green());
        assert!(!report.tests.success);
        assert!(report.tests.stderr.contains("skipped"));
        assert!(!report.tests.stdout.contains("should-not-run"));
    }

    // ── error extraction ─────────────────────────────────────────────

    #[test]
    fn pattern_table_names_are_stable() {
        let names: Vec<&str> = ERROR_LINE_PATTERNS.iter().map(|p| p.name).collect();
        assert!(names.contains(&"ts-diagnostic"));
        assert!(names.contains(&"missing-module"));
        assert!(names.contains(&"runtime-throw"));
    }

    #[test]
    fn extract_picks_diagnostic_lines() {
        let output = "\
> build
src/app.tsx(12,5): error TS2339: Property 'render' does not exist
compiled 14 modules
Error: Cannot find module 'react-dom/client'
all done";
        let lines = extract_error_lines(output, 50);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("TS2339"));
        assert!(lines[1].contains("Cannot find module"));
    }

    #[test]
    fn extract_dedupes_and_caps() {
        let mut output = String::new();
        for _ in 0..10 {
            output.push_str("error TS1005: ';' expected\n");
        }
        for i in 0..60 {
            output.push_str(&format!("error TS{}: broken\n", 2000 + i));
        }
        let lines = extract_error_lines(&output, 50);
        assert_eq!(lines.len(), 50);
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.contains("TS1005"))
                .count(),
            1
        );
    }

    #[test]
    fn extract_empty_output_yields_nothing() {
        assert!(extract_error_lines("", 50).is_empty());
        assert!(extract_error_lines("everything is fine\nok\n", 50).is_empty());
    }
}
