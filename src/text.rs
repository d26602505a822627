//! Text normalization helpers.
//!
//! [`clean_text`] is applied to every string field value fetched from a
//! search engine and, through [`query_text_key`], to query texts before they
//! are deduplicated by the [`DataStore`](crate::datastore::DataStore).
//!
//! Cleaning never changes case, never strips accents, and never removes
//! punctuation. It only removes markup and normalizes spacing:
//!
//! | Step | Effect |
//! |------|--------|
//! | 1 | HTML entity unescape (`&amp;` → `&`, `&lt;b&gt;` → `<b>`) |
//! | 2 | Naive tag removal (`<...>`, single line) |
//! | 3 | Unicode NFKC normalization |
//! | 4 | Control characters (`U+0000..U+001F`, `U+007F..U+009F`) → space |
//! | 5 | Whitespace runs collapsed to one space, then trimmed |

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("valid tag regex"));
static CTRL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{0000}-\x{001F}\x{007F}-\x{009F}]").expect("valid control regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Clean a single string. See the module docs for the exact steps.
pub fn clean_text(text: &str) -> String {
    let unescaped = html_escape::decode_html_entities(text);
    let untagged = TAG_RE.replace_all(&unescaped, "");
    let normalized: String = untagged.nfkc().collect();
    let no_ctrl = CTRL_RE.replace_all(&normalized, " ");
    WS_RE.replace_all(&no_ctrl, " ").trim().to_string()
}

/// Deduplication key for query texts.
///
/// Runs [`clean_text`] until the output is stable, so the key is
/// idempotent for input escaped to any depth (`&amp;amp;lt;b&amp;amp;gt;`).
/// Every pass that changes the text consumes an entity or a tag, which
/// bounds the loop by the input length.
pub fn query_text_key(text: &str) -> String {
    let mut current = clean_text(text);
    for _ in 0..text.len() {
        let next = clean_text(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Normalize an engine field value into a list of cleaned strings.
///
/// | Input | Output |
/// |-------|--------|
/// | `null` | `[]` |
/// | string | `[clean_text(s)]` |
/// | array | strings cleaned, other items rendered as JSON text |
/// | object | `[json]` with its string values cleaned |
/// | number / bool | `[value as text]` |
pub fn normalize_field_value(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![clean_text(s)],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => clean_text(s),
                other => other.to_string(),
            })
            .collect(),
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(clean_text(s)),
                        other => other.clone(),
                    };
                    (k.clone(), v)
                })
                .collect();
            vec![Value::Object(cleaned).to_string()]
        }
        other => vec![other.to_string()],
    }
}

/// Normalize every field of an engine hit, dropping the keys in `skip`.
pub fn normalize_fields(source: &Map<String, Value>, skip: &[&str]) -> Map<String, Value> {
    source
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| {
            let values = normalize_field_value(v)
                .into_iter()
                .map(Value::String)
                .collect();
            (k.clone(), Value::Array(values))
        })
        .collect()
}

/// Render a field value as plain text: lists are space-joined, `null` is empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Concatenate all field values except those whose lowercase key is in `exclude`.
pub fn join_fields_as_text(fields: &Map<String, Value>, exclude: &[&str]) -> String {
    fields
        .iter()
        .filter(|(k, v)| !exclude.contains(&k.to_lowercase().as_str()) && !v.is_null())
        .map(|(_, v)| value_to_text(v))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
