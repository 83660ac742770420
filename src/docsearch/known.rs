//! Curated migration-doc locations for popular packages.
//!
//! Each entry derives an ordered list of candidate URLs from the target
//! version. The list is data; a miss simply means the strategy yields
//! nothing for that package.

use semver::Version;

/// Candidate documentation URLs for a package at a target version,
/// best first.
pub fn known_doc_urls(package: &str, to: &Version) -> Vec<String> {
    match package {
        "react" | "react-dom" => vec![
            format!(
                "https://react.dev/blog/2022/03/08/react-{}-upgrade-guide",
                to.major
            ),
            "https://react.dev/versions".to_string(),
        ],
        "typescript" => vec![
            format!(
                "https://devblogs.microsoft.com/typescript/announcing-typescript-{}-{}/",
                to.major, to.minor
            ),
            "https://www.typescriptlang.org/docs/handbook/release-notes/overview.html".to_string(),
        ],
        "eslint" => vec![format!(
            "https://eslint.org/docs/latest/use/migrate-to-{}.0.0",
            to.major
        )],
        "jest" => vec![format!("https://jestjs.io/docs/upgrading-to-jest{}", to.major)],
        "next" => vec![format!(
            "https://nextjs.org/docs/app/guides/upgrading/version-{}",
            to.major
        )],
        "webpack" => vec![format!("https://webpack.js.org/migrate/{}/", to.major)],
        "vue" => vec!["https://v3-migration.vuejs.org/".to_string()],
        name if name.starts_with("@angular/") => {
            vec!["https://angular.dev/update-guide".to_string()]
        }
        "express" => vec![format!(
            "https://expressjs.com/en/guide/migrating-{}.html",
            to.major
        )],
        _ => Vec::new(),
    }
}
