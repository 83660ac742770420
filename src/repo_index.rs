//! Source-tree index.
//!
//! Walks the project once per group, honoring the project ignore file when
//! present, and extracts import declarations and top-level function
//! signatures from recognized source files. A single unreadable file is
//! logged and skipped, never fatal.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];
const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    "out",
    ".next",
    ".cache",
];

#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// `import { a, b } from 'pkg'` -> `(pkg, [a, b])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub from: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub params: Vec<String>,
    pub has_type: bool,
}

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});
static IMPORT_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static REQUIRE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:(?:const|let|var)\s+(\{[^}]*\}|[\w$]+)\s*=\s*)?require\(\s*['"]([^'"]+)['"]\s*\)"#)
        .unwrap()
});
static DYNAMIC_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static NAMED_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+([A-Za-z_$][\w$]*)\s*\(([^)]*)\)")
        .unwrap()
});
static ARROW_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?const\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?\(([^)]*)\)(?:\s*:[^=]+)?\s*=>",
    )
    .unwrap()
});
static CLASS_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)").unwrap());
static CLASS_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(?:public\s+|private\s+|protected\s+|static\s+)*(?:async\s+)?([A-Za-z_$][\w$]*)\s*\(([^)]*)\)\s*(?::[^{]+)?\{")
        .unwrap()
});

/// Extracted facts about the source tree. Paths are relative to the
/// project root, with forward slashes.
#[derive(Debug, Default)]
pub struct RepoIndex {
    pub files: BTreeMap<String, FileMeta>,
    pub imports: BTreeMap<String, Vec<ImportDecl>>,
    pub functions: BTreeMap<String, Vec<FunctionSig>>,
}

impl RepoIndex {
    /// Walk the tree and index every recognized source file.
    pub fn build(project_dir: &Path) -> Self {
        let ignores = load_ignores(project_dir);
        let mut index = Self::default();

        let walker = WalkDir::new(project_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !ignores.iter().any(|p| name == *p)
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "walk error, skipping");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !SOURCE_EXTENSIONS.contains(&ext) {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(project_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(file = %rel, error = %e, "unreadable source file, skipping");
                    continue;
                }
            };

            let meta = entry.metadata().ok();
            index.files.insert(
                rel.clone(),
                FileMeta {
                    size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                    modified: meta.and_then(|m| m.modified().ok()),
                },
            );
            index.imports.insert(rel.clone(), extract_imports(&content));
            index
                .functions
                .insert(rel.clone(), extract_functions(&content));
        }
        index
    }

    /// Every file whose imports mention `pkg` itself or a subpath
    /// `pkg/...`.
    pub fn find_files_importing(&self, pkg: &str) -> Vec<String> {
        let subpath_prefix = format!("{}/", pkg);
        self.imports
            .iter()
            .filter(|(_, decls)| {
                decls
                    .iter()
                    .any(|d| d.from == pkg || d.from.starts_with(&subpath_prefix))
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Indexed files under any of the given top-level directories.
    pub fn files_under(&self, prefixes: &[&str]) -> Vec<String> {
        self.files
            .keys()
            .filter(|path| prefixes.iter().any(|p| path.starts_with(&format!("{}/", p))))
            .cloned()
            .collect()
    }
}

fn load_ignores(project_dir: &Path) -> Vec<String> {
    let gitignore = project_dir.join(".gitignore");
    let mut ignores: Vec<String> = match std::fs::read_to_string(&gitignore) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_matches('/').to_string())
            .collect(),
        Err(_) => DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
    };
    // .git is never worth indexing even when the ignore file omits it
    if !ignores.iter().any(|p| p == ".git") {
        ignores.push(".git".to_string());
    }
    if !ignores.iter().any(|p| p == "node_modules") {
        ignores.push("node_modules".to_string());
    }
    ignores
}

fn parse_import_names(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let clause = clause.trim();

    // Split default import from a named/namespace block
    let (default_part, rest) = match clause.find('{') {
        Some(idx) => (clause[..idx].trim_end_matches(',').trim(), &clause[idx..]),
        None => (clause, ""),
    };

    if let Some(ns) = default_part.strip_prefix("* as ") {
        names.push(ns.trim().to_string());
    } else if !default_part.is_empty() && !default_part.starts_with('{') {
        names.push(default_part.trim_end_matches(',').trim().to_string());
    }

    if let Some(inner) = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}').or(Some(r)))
    {
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            // `orig as local` binds the local name
            let local = part.split(" as ").last().unwrap_or(part).trim();
            names.push(local.to_string());
        }
    }
    names.retain(|n| !n.is_empty());
    names
}

fn extract_imports(content: &str) -> Vec<ImportDecl> {
    let mut decls = Vec::new();
    for line in content.lines() {
        if let Some(caps) = IMPORT_FROM.captures(line) {
            decls.push(ImportDecl {
                from: caps[2].to_string(),
                names: parse_import_names(&caps[1]),
            });
        } else if let Some(caps) = IMPORT_BARE.captures(line) {
            decls.push(ImportDecl {
                from: caps[1].to_string(),
                names: Vec::new(),
            });
        }
        for caps in REQUIRE_CALL.captures_iter(line) {
            let names = caps
                .get(1)
                .map(|binding| parse_import_names(binding.as_str()))
                .unwrap_or_default();
            decls.push(ImportDecl {
                from: caps[2].to_string(),
                names,
            });
        }
        for caps in DYNAMIC_IMPORT.captures_iter(line) {
            decls.push(ImportDecl {
                from: caps[1].to_string(),
                names: Vec::new(),
            });
        }
    }
    decls
}

fn parse_params(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| {
            p.split(':')
                .next()
                .unwrap_or("")
                .trim()
                .trim_start_matches("...")
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

/// Find the line where a block opened at `start` closes, by brace
/// counting. Falls back to the start line for one-liners.
fn find_block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return start + offset;
        }
    }
    start
}

fn extract_functions(content: &str) -> Vec<FunctionSig> {
    let lines: Vec<&str> = content.lines().collect();
    let mut sigs = Vec::new();
    let mut current_class: Option<(String, usize)> = None;

    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = CLASS_DECL.captures(line) {
            let end = find_block_end(&lines, i);
            current_class = Some((caps[1].to_string(), end));
            continue;
        }
        // Leave class scope once past its closing brace
        if let Some((_, class_end)) = &current_class {
            if i > *class_end {
                current_class = None;
            }
        }

        let (name, params_raw) = if let Some(caps) = NAMED_FUNCTION.captures(line) {
            (caps[1].to_string(), caps[2].to_string())
        } else if let Some(caps) = ARROW_BINDING.captures(line) {
            (caps[1].to_string(), caps[2].to_string())
        } else if let Some((class_name, class_end)) = &current_class {
            if i <= *class_end {
                const NOT_METHODS: &[&str] =
                    &["constructor", "if", "for", "while", "switch", "catch", "return"];
                match CLASS_METHOD.captures(line) {
                    Some(caps) if !NOT_METHODS.contains(&&caps[1]) => {
                        (format!("{}.{}", class_name, &caps[1]), caps[2].to_string())
                    }
                    _ => continue,
                }
            } else {
                continue;
            }
        } else {
            continue;
        };

        sigs.push(FunctionSig {
            name,
            start_line: i + 1,
            end_line: find_block_end(&lines, i) + 1,
            has_type: params_raw.contains(':') || line.contains("):"),
            params: parse_params(&params_raw),
        });
    }
    sigs
}
