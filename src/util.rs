//! Shared helpers for parsing model responses.
//!
//! Models wrap JSON in prose and code fences. `extract_json` first looks
//! for a fenced ```json block, then falls back to brace-counting the
//! outermost object in the raw text.

/// Extract the contents of the first fenced code block marked `json`
/// (or an unmarked fence whose body starts with `{`).
pub fn extract_fenced_json(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let body_start = after.find('\n')? + 1;
        let lang = after[..body_start - 1].trim();
        let body = &after[body_start..];
        let end = body.find("```")?;
        let candidate = body[..end].trim();
        if lang.eq_ignore_ascii_case("json") || candidate.starts_with('{') {
            return Some(candidate.to_string());
        }
        rest = &body[end + 3..];
    }
    None
}

/// Find the outermost JSON object in free text via brace counting.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}

/// Best-effort JSON extraction: fenced block first, then brace counting.
pub fn extract_json(text: &str) -> Option<String> {
    extract_fenced_json(text).or_else(|| extract_json_object(text))
}
