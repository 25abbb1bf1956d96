//! Search result post-processing.
//!
//! Raw results come back carrying opaque highlight markers
//! ([`HIGHLIGHT_START`]/[`HIGHLIGHT_END`]) and a per-field
//! `@search.highlights` map. Before results reach a caller, the markers are
//! rewritten into a presentation wrapper: adjacent highlighted fragments
//! separated by at most three separator characters are collapsed into one
//! span, and unbalanced markers (possible after server-side truncation) are
//! rebalanced by synthesizing the missing wrapper.
//!
//! Access control happens here too: each result is checked against the
//! content source, and results the source reports as deleted are purged from
//! the index opportunistically.

use serde::Deserialize;
use serde_json::Value;

use crate::document::DocKind;
use crate::query::{HIGHLIGHT_END, HIGHLIGHT_FIELDS, HIGHLIGHT_START};

/// Default wrapper emitted in place of the wire markers.
pub const WRAP_OPEN: &str = "<mark>";
pub const WRAP_CLOSE: &str = "</mark>";

/// Per-result access decision supplied by the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The requesting user may see this result.
    Granted,
    /// The underlying item no longer exists; the index entry should be
    /// purged.
    DeniedPurge,
    /// Access denied for any other reason; skip silently.
    Denied,
}

/// Access-check capability supplied by the content source.
pub trait AccessChecker: Send + Sync {
    /// Whether the given search area is known to the content source.
    /// Results from unknown areas are discarded silently.
    fn resolve_area(&self, areaid: &str) -> bool;

    /// Access decision for the item with the given source-native id.
    fn check_access(&self, areaid: &str, itemid: i64) -> AccessDecision;
}

/// A granted search result materialized into document form.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultDocument {
    pub id: String,
    #[serde(default)]
    pub parentid: String,
    #[serde(default)]
    pub itemid: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub contextid: i64,
    #[serde(default)]
    pub areaid: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: DocKind,
    #[serde(default)]
    pub courseid: String,
    #[serde(default)]
    pub owneruserid: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub userid: Option<i64>,
    #[serde(default)]
    pub groupid: Option<i64>,
    #[serde(default)]
    pub description1: Option<String>,
    #[serde(default)]
    pub description2: Option<String>,
}

fn default_kind() -> DocKind {
    DocKind::Item
}

/// Replace each highlightable source field with the first fragment from the
/// result's `@search.highlights` map, when present.
pub fn apply_highlights(result: &mut Value) {
    let highlights = match result.get("@search.highlights") {
        Some(Value::Object(map)) => map.clone(),
        _ => return,
    };

    for (field, fragments) in highlights {
        if let Some(first) = fragments.as_array().and_then(|a| a.first()) {
            result[field.as_str()] = first.clone();
        }
    }
}

/// Rewrite highlight markers in every highlightable field of a result.
pub fn rewrite_result_markers(result: &mut Value, open: &str, close: &str) {
    for field in HIGHLIGHT_FIELDS {
        if let Some(Value::String(text)) = result.get(*field) {
            let rewritten = rewrite_markers(text, open, close);
            result[*field] = Value::String(rewritten);
        }
    }
}

/// Characters treated as separators between adjacent highlighted fragments.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '.' | ';' | ':' | '-')
}

/// Collapse an end marker followed by up to three separator characters and a
/// start marker, keeping the separators. Adjacent fragments then render as
/// one continuous span.
fn collapse_adjacent(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(HIGHLIGHT_END) {
        let after = &rest[pos + HIGHLIGHT_END.len()..];

        let mut sep_len = 0;
        let mut sep_count = 0;
        for c in after.chars() {
            if sep_count == 3 || !is_separator(c) {
                break;
            }
            sep_len += c.len_utf8();
            sep_count += 1;
        }

        if after[sep_len..].starts_with(HIGHLIGHT_START) {
            out.push_str(&rest[..pos]);
            out.push_str(&after[..sep_len]);
            rest = &after[sep_len + HIGHLIGHT_START.len()..];
        } else {
            out.push_str(&rest[..pos + HIGHLIGHT_END.len()]);
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

/// Rewrite wire markers into the presentation wrapper.
///
/// After collapsing adjacent fragments, every remaining marker is replaced
/// with the wrapper; if markers are unbalanced (e.g. the server truncated a
/// fragment), the missing closers are appended or the missing openers
/// prepended so the output is always balanced.
pub fn rewrite_markers(text: &str, open: &str, close: &str) -> String {
    let collapsed = collapse_adjacent(text);
    let starts = collapsed.matches(HIGHLIGHT_START).count();
    let ends = collapsed.matches(HIGHLIGHT_END).count();

    let mut out = collapsed
        .replace(HIGHLIGHT_START, open)
        .replace(HIGHLIGHT_END, close);

    if starts > ends {
        for _ in 0..starts - ends {
            out.push_str(close);
        }
    } else if ends > starts {
        let mut prefix = String::new();
        for _ in 0..ends - starts {
            prefix.push_str(open);
        }
        out.insert_str(0, &prefix);
    }

    out
}
