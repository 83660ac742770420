//! Model-assisted fix generation.
//!
//! Composes one structured prompt per fix attempt: the upgrade direction,
//! the most informative lines of the failing output, every retrieved
//! migration guide, and the full contents of each candidate file with
//! line numbers. The model answers with a JSON envelope of edits; a
//! malformed envelope means no edits, never partial data.

use crate::analyzer::PackageRef;
use crate::docsearch::MigrationGuide;
use crate::edit_engine::Edit;
use crate::errors::ModelError;
use crate::model::ModelClient;
use crate::util;
use serde::Deserialize;
use std::path::Path;

const MAX_ERROR_LINES: usize = 50;

#[derive(Debug, Deserialize)]
struct EditEnvelope {
    edits: Vec<Edit>,
}

pub struct Fixer<'a> {
    model: &'a dyn ModelClient,
    project_dir: &'a Path,
}

impl<'a> Fixer<'a> {
    pub fn new(model: &'a dyn ModelClient, project_dir: &'a Path) -> Self {
        Self { model, project_dir }
    }

    /// Ask the model for edits. Model failures are logged and yield an
    /// empty list; the orchestrator treats "no edits" as fatal for the
    /// group.
    pub async fn generate_edits(
        &self,
        package: &PackageRef,
        failing_output: &str,
        guides: &[MigrationGuide],
        candidates: &[String],
    ) -> Vec<Edit> {
        let prompt = self.build_prompt(package, failing_output, guides, candidates);
        let response = match self.model.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log_model_error(&e);
                return Vec::new();
            }
        };
        parse_edits(&response)
    }

    fn build_prompt(
        &self,
        package: &PackageRef,
        failing_output: &str,
        guides: &[MigrationGuide],
        candidates: &[String],
    ) -> String {
        let mut prompt = format!(
            "A dependency upgrade broke this project's build or tests.\n\n\
             UPGRADE\n{} was upgraded from {} to {}.\n\n\
             FAILING OUTPUT (most relevant lines)\n",
            package.name, package.current_version, package.latest_version
        );
        let lines = crate::runner::extract_error_lines(failing_output, MAX_ERROR_LINES);
        if lines.is_empty() {
            prompt.push_str("(no diagnostic lines recognized)\n");
        } else {
            for line in lines {
                prompt.push_str(&line);
                prompt.push('\n');
            }
        }

        for guide in guides {
            prompt.push_str(&format!(
                "\nMIGRATION GUIDE ({})\n{}\n",
                guide.url, guide.content
            ));
        }

        for file in candidates {
            match std::fs::read_to_string(self.project_dir.join(file)) {
                Ok(content) => {
                    prompt.push_str(&format!("\nFILE {}\n{}", file, number_lines(&content)));
                }
                Err(e) => {
                    tracing::warn!(file, error = %e, "candidate file unreadable, omitted");
                }
            }
        }

        prompt.push_str(
            "\nRespond with only a JSON object of the form:\n\
             {\"edits\": [{\"file\": \"path\", \"description\": \"what this fixes\", \
             \"search\": \"exact text to find\", \"replace\": \"replacement text\"}]}\n\n\
             Rules:\n\
             - each search string must appear exactly once in its file\n\
             - copy search text verbatim from the file, including whitespace\n\
             - make the smallest edits that fix the failure\n",
        );
        prompt
    }
}

fn log_model_error(error: &ModelError) {
    tracing::warn!(error = %error, "fix generation failed; no edits produced");
}

/// Parse the model's `{edits: [...]}` envelope. Anything malformed is
/// treated as no result.
pub fn parse_edits(response: &str) -> Vec<Edit> {
    let Some(json) = util::extract_json(response) else {
        tracing::warn!("no JSON envelope in model response");
        return Vec::new();
    };
    match serde_json::from_str::<EditEnvelope>(&json) {
        Ok(envelope) => envelope
            .edits
            .into_iter()
            .filter(|e| !e.file.is_empty() && !e.search.is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "model envelope failed validation");
            Vec::new()
        }
    }
}

fn number_lines(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + content.lines().count() * 6);
    for (i, line) in content.lines().enumerate() {
        out.push_str(&format!("{:>4} | {}\n", i + 1, line));
    }
    out
}
