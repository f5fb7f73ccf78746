//! Activation rules: whether a clipboard entry should fire a script.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::core::item::ClipboardItem;
use crate::core::script::UserScript;

/// True when `script` is enabled, accepts the item's content type and, if it
/// has keywords, at least one keyword matches the item content.
pub fn matches(script: &UserScript, item: &ClipboardItem) -> bool {
    if !script.enabled {
        return false;
    }

    if !script.content_type.is_empty() && !script.content_type.contains(&item.content_type) {
        return false;
    }

    if !script.keywords.is_empty()
        && !script
            .keywords
            .iter()
            .any(|keyword| keyword_matches(keyword, &item.content))
    {
        return false;
    }

    true
}

/// A keyword is either a plain substring (case-insensitive) or a
/// `/pattern/flags` regular expression. Malformed regex keywords fall back
/// to a substring test of the whole raw keyword.
pub fn keyword_matches(keyword: &str, content: &str) -> bool {
    if let Some(body) = keyword.strip_prefix('/').filter(|body| !body.is_empty()) {
        if let Some(split) = body.rfind('/') {
            let (pattern, flags) = (&body[..split], &body[split + 1..]);
            if !pattern.is_empty() {
                match compile_keyword(pattern, flags) {
                    Ok(re) => return re.is_match(content),
                    Err(e) => {
                        warn!("Invalid keyword regex {}: {}", keyword, e);
                    }
                }
            }
        }
    }
    contains_ignore_case(content, keyword)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Compile a pattern with JavaScript-style flag letters.
pub fn compile_keyword(pattern: &str, flags: &str) -> Result<Regex, String> {
    let mut builder = RegexBuilder::new(pattern);
    builder.unicode(true);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // A single match test has no global/sticky state; unicode is always on.
            'g' | 'y' | 'u' => {}
            other => return Err(format!("unsupported regex flag '{}'", other)),
        }
    }
    builder.build().map_err(|e| e.to_string())
}
