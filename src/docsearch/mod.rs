//! Migration-documentation search.
//!
//! Five fetch strategies run as independent concurrent tasks joined with
//! best-effort semantics: user-provided URLs, curated known docs, forge
//! release notes, repository changelogs, and the package homepage. Each
//! fetch carries a hard 10-second deadline and a 100 KB content cap, so
//! task cancellation is never needed.

pub mod changelog;
pub mod known;

use crate::analyzer::PackageRef;
use crate::manifest::coerce_version;
use futures::future::{BoxFuture, join_all};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const CONTENT_CAP: usize = 100 * 1024;
const MAX_GUIDES: usize = 5;

const RELEVANCE_USER: i32 = 15;
const RELEVANCE_KNOWN: i32 = 10;
const RELEVANCE_RELEASE: i32 = 9;
const RELEVANCE_CHANGELOG: i32 = 8;
const RELEVANCE_HOMEPAGE: i32 = 6;

/// A retrieved migration document. Transient per-group data.
#[derive(Debug, Clone)]
pub struct MigrationGuide {
    pub source: String,
    pub url: String,
    pub content: String,
    pub relevance: i32,
}

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static MIGRATION_KEYWORDS: &[&str] = &["migrat", "breaking", "upgrad", "deprecat"];

/// GitHub release payload (subset of fields we care about).
#[derive(Debug, Deserialize)]
struct ReleasePayload {
    #[serde(default)]
    body: String,
}

pub struct DocSearch {
    http: reqwest::Client,
    user_docs: BTreeMap<String, Vec<String>>,
}

impl DocSearch {
    pub fn new(user_docs: BTreeMap<String, Vec<String>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("devpost-upgrade")
            .build()
            .unwrap_or_default();
        Self { http, user_docs }
    }

    /// Fetch migration guides for one package from every source at once.
    pub async fn search(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let strategies: Vec<BoxFuture<'_, Vec<MigrationGuide>>> = vec![
            Box::pin(self.user_provided(package)),
            Box::pin(self.curated(package)),
            Box::pin(self.release_notes(package)),
            Box::pin(self.changelog(package)),
            Box::pin(self.homepage(package)),
        ];
        let results = join_all(strategies).await;

        let guides = collate(results.into_iter().flatten().collect());
        tracing::info!(
            package = %package.name,
            guides = guides.len(),
            "migration docs collected"
        );
        guides
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = self.http.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let text = response.text().await.ok()?;
        Some(cap_content(&text))
    }

    async fn user_provided(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let Some(urls) = self.user_docs.get(&package.name) else {
            return Vec::new();
        };
        let mut guides = Vec::new();
        for url in urls {
            if let Some(content) = self.fetch_text(url).await {
                guides.push(MigrationGuide {
                    source: "user".to_string(),
                    url: url.clone(),
                    content: strip_html(&content),
                    relevance: RELEVANCE_USER,
                });
            }
        }
        guides
    }

    async fn curated(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let Some(to) = coerce_version(&package.latest_version) else {
            return Vec::new();
        };
        for url in known::known_doc_urls(&package.name, &to) {
            if let Some(content) = self.fetch_text(&url).await {
                return vec![MigrationGuide {
                    source: "known-docs".to_string(),
                    url,
                    content: strip_html(&content),
                    relevance: RELEVANCE_KNOWN,
                }];
            }
        }
        Vec::new()
    }

    async fn release_notes(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let Some(slug) = package.homepage.as_deref().and_then(github_slug) else {
            return Vec::new();
        };

        for tag in tag_formats(&package.name, &package.latest_version) {
            // The JSON API first, the HTML release page as fallback
            let api_url = format!("https://api.github.com/repos/{}/releases/tags/{}", slug, tag);
            if let Some(body) = self.fetch_release_body(&api_url).await {
                return vec![MigrationGuide {
                    source: "release-notes".to_string(),
                    url: api_url,
                    content: cap_content(&body),
                    relevance: RELEVANCE_RELEASE,
                }];
            }

            let html_url = format!("https://github.com/{}/releases/tag/{}", slug, tag);
            if let Some(content) = self.fetch_text(&html_url).await {
                return vec![MigrationGuide {
                    source: "release-notes".to_string(),
                    url: html_url,
                    content: strip_html(&content),
                    relevance: RELEVANCE_RELEASE,
                }];
            }
        }
        Vec::new()
    }

    async fn fetch_release_body(&self, url: &str) -> Option<String> {
        let response = self.http.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let payload: ReleasePayload = response.json().await.ok()?;
        if payload.body.trim().is_empty() {
            None
        } else {
            Some(payload.body)
        }
    }

    async fn changelog(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let Some(slug) = package.homepage.as_deref().and_then(github_slug) else {
            return Vec::new();
        };

        for branch in changelog::DEFAULT_BRANCHES {
            for file in changelog::CHANGELOG_FILES {
                let url = format!(
                    "https://raw.githubusercontent.com/{}/{}/{}",
                    slug, branch, file
                );
                let Some(content) = self.fetch_text(&url).await else {
                    continue;
                };
                let Some(window) = changelog::version_window(
                    &content,
                    &package.current_version,
                    &package.latest_version,
                ) else {
                    continue;
                };
                return vec![MigrationGuide {
                    source: "changelog".to_string(),
                    url,
                    content: window,
                    relevance: RELEVANCE_CHANGELOG,
                }];
            }
        }
        Vec::new()
    }

    async fn homepage(&self, package: &PackageRef) -> Vec<MigrationGuide> {
        let Some(url) = package.homepage.as_deref() else {
            return Vec::new();
        };
        let Some(content) = self.fetch_text(url).await else {
            return Vec::new();
        };
        let relevant = migration_paragraphs(&strip_html(&content));
        if relevant.is_empty() {
            return Vec::new();
        }
        vec![MigrationGuide {
            source: "homepage".to_string(),
            url: url.to_string(),
            content: cap_content(&relevant),
            relevance: RELEVANCE_HOMEPAGE,
        }]
    }
}

/// Sort by relevance, drop duplicate URLs, keep the top five.
pub fn collate(mut guides: Vec<MigrationGuide>) -> Vec<MigrationGuide> {
    guides.sort_by_key(|g| std::cmp::Reverse(g.relevance));
    let mut seen = std::collections::HashSet::new();
    guides.retain(|g| seen.insert(g.url.clone()));
    guides.truncate(MAX_GUIDES);
    guides
}

/// Tag spellings tried against the forge, in order.
pub fn tag_formats(package: &str, version: &str) -> Vec<String> {
    vec![
        format!("v{}", version),
        version.to_string(),
        format!("{}@{}", package, version),
    ]
}

/// Parse `owner/repo` out of a GitHub URL, tolerating subpaths and
/// `.git` suffixes.
pub fn github_slug(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("git+https://"))?;
    let path = rest.strip_prefix("www.").unwrap_or(rest);
    let path = path.strip_prefix("github.com/")?;

    let mut segments = path.split(['/', '#', '?']).filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{}/{}", owner, repo))
}

fn cap_content(text: &str) -> String {
    if text.len() <= CONTENT_CAP {
        text.to_string()
    } else {
        let mut end = CONTENT_CAP;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

fn strip_html(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    let stripped = HTML_TAG.replace_all(text, " ");
    // Collapse runs of blank space left behind by removed tags
    let mut out = String::with_capacity(stripped.len());
    let mut last_blank = false;
    for line in stripped.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !last_blank {
                out.push('\n');
            }
            last_blank = true;
        } else {
            out.push_str(line);
            out.push('\n');
            last_blank = false;
        }
    }
    out
}

/// Paragraphs around migration keywords, for homepage extraction.
fn migration_paragraphs(text: &str) -> String {
    text.split("\n\n")
        .filter(|paragraph| {
            let lower = paragraph.to_lowercase();
            MIGRATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guide(url: &str, relevance: i32) -> MigrationGuide {
        MigrationGuide {
            source: "test".to_string(),
            url: url.to_string(),
            content: "content".to_string(),
            relevance,
        }
    }

    #[test]
    fn collate_sorts_dedupes_and_truncates() {
        let guides = collate(vec![
            guide("https://a.example", 8),
            guide("https://b.example", 15),
            guide("https://a.example", 9),
            guide("https://c.example", 10),
            guide("https://d.example", 9),
            guide("https://e.example", 6),
            guide("https://f.example", 6),
        ]);
        assert_eq!(guides.len(), 5);
        assert_eq!(guides[0].url, "https://b.example");
        assert_eq!(guides[1].url, "https://c.example");
        // Duplicate of a.example kept once, at its higher-relevance slot
        assert_eq!(
            guides.iter().filter(|g| g.url == "https://a.example").count(),
            1
        );
    }

    #[test]
    fn tag_formats_in_documented_order() {
        assert_eq!(
            tag_formats("chalk", "5.3.0"),
            vec!["v5.3.0", "5.3.0", "chalk@5.3.0"]
        );
    }

    #[test]
    fn github_slug_parses_common_shapes() {
        assert_eq!(
            github_slug("https://github.com/chalk/chalk"),
            Some("chalk/chalk".to_string())
        );
        assert_eq!(
            github_slug("https://github.com/facebook/react.git"),
            Some("facebook/react".to_string())
        );
        assert_eq!(
            github_slug("https://github.com/facebook/react/tree/main/packages/react-dom"),
            Some("facebook/react".to_string())
        );
        assert_eq!(
            github_slug("https://github.com/chalk/chalk#readme"),
            Some("chalk/chalk".to_string())
        );
        assert_eq!(
            github_slug("git+https://github.com/sindresorhus/ora.git"),
            Some("sindresorhus/ora".to_string())
        );
    }

    #[test]
    fn github_slug_rejects_non_github_urls() {
        assert_eq!(github_slug("https://gitlab.com/owner/repo"), None);
        assert_eq!(github_slug("https://chalk.dev"), None);
        assert_eq!(github_slug("https://github.com/owner"), None);
    }

    #[test]
    fn cap_content_respects_char_boundaries() {
        let text = "é".repeat(CONTENT_CAP);
        let capped = cap_content(&text);
        assert!(capped.len() <= CONTENT_CAP);
        assert!(capped.chars().all(|c| c == 'é'));
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_blanks() {
        let html = "<html><body>\n<h1>Upgrade guide</h1>\n\n\n<p>Breaking change in v5.</p>\n</body></html>";
        let text = strip_html(html);
        assert!(text.contains("Upgrade guide"));
        assert!(text.contains("Breaking change in v5."));
        assert!(!text.contains('<'));
    }

    #[test]
    fn migration_paragraphs_filters_by_keyword() {
        let text = "Welcome to the project.\n\nThe v5 upgrade removes the default export. This is a breaking change.\n\nDonate here.";
        let relevant = migration_paragraphs(text);
        assert!(relevant.contains("breaking change"));
        assert!(!relevant.contains("Donate"));
        assert!(!relevant.contains("Welcome"));
    }

    #[test]
    fn release_payload_deserializes_body() {
        let payload: ReleasePayload =
            serde_json::from_str("{\"body\": \"## Breaking\\n- removed cjs\", \"name\": \"v5.0.0\"}")
                .unwrap();
        assert!(payload.body.contains("Breaking"));
    }
}
