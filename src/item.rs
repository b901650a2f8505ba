//! Item records: field coercion from loosely-typed source records and cleaning.
//!
//! Source records are JSON objects. Absent or oddly-typed fields are coerced or
//! treated as empty; they never abort a run.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SimilarityConfig;

/// A loosely-typed source record.
pub type Record = Map<String, Value>;

/// Source field holding the short description.
pub const DESCRIPTION_FIELD: &str = "shortDescription";
/// Source field holding the keyword list (array of strings, or a string).
pub const KEYWORDS_FIELD: &str = "keywords";
/// Source field holding the language tag.
pub const LANGUAGE_FIELD: &str = "language";

/// A record after field extraction, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    /// Identifier coerced to a string; `None` if null, absent or empty.
    pub id: Option<String>,
    /// Language tag, trimmed and lowercased; `None` if null or absent.
    pub language: Option<String>,
    /// Description followed by keywords, whitespace-collapsed.
    pub text: String,
}

impl RawItem {
    /// Extract the fields the pipeline needs from a source record.
    pub fn from_record(record: &Record, id_column: &str) -> Self {
        let id = record
            .get(id_column)
            .and_then(coerce_id)
            .filter(|s| !s.is_empty());

        let language = record
            .get(LANGUAGE_FIELD)
            .and_then(scalar_to_string)
            .map(|s| s.trim().to_lowercase());

        let description = record
            .get(DESCRIPTION_FIELD)
            .and_then(scalar_to_string)
            .unwrap_or_default();

        let keywords = match record.get(KEYWORDS_FIELD) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(" "),
            Some(other) => scalar_to_string(other).unwrap_or_default(),
            None => String::new(),
        };

        Self {
            id,
            language,
            text: collapse_whitespace(&format!("{description} {keywords}")),
        }
    }
}

/// A cleaned, immutable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Unique identifier.
    pub id: String,
    /// Normalized language tag (non-empty).
    pub language: String,
    /// Text used for feature extraction.
    pub text: String,
}

/// Counters from [`clean_items`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    /// Records seen.
    pub read: usize,
    /// Dropped for a null or empty id.
    pub missing_id: usize,
    /// Dropped for text shorter than `min_text_len`.
    pub short_text: usize,
    /// Dropped for a null or empty language.
    pub missing_language: usize,
    /// Dropped as a repeat of an already-kept id.
    pub duplicates: usize,
    /// Dropped by the debug sampling limit.
    pub over_limit: usize,
    /// Items kept.
    pub kept: usize,
}

/// Filter, deduplicate and order raw items.
///
/// The first valid occurrence of each id is kept. The result is sorted by
/// ascending id, so item indices downstream follow lexicographic id order.
/// `limit` keeps the lowest ids.
pub fn clean_items<I>(raw: I, config: &SimilarityConfig) -> (Vec<Item>, CleaningStats)
where
    I: IntoIterator<Item = RawItem>,
{
    let mut stats = CleaningStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut items = Vec::new();

    for raw in raw {
        stats.read += 1;
        let Some(id) = raw.id else {
            stats.missing_id += 1;
            continue;
        };
        if raw.text.chars().count() < config.min_text_len {
            stats.short_text += 1;
            continue;
        }
        let language = match raw.language {
            Some(lang) if !lang.is_empty() => lang,
            _ => {
                stats.missing_language += 1;
                continue;
            }
        };
        if !seen.insert(id.clone()) {
            stats.duplicates += 1;
            continue;
        }
        items.push(Item {
            id,
            language,
            text: raw.text,
        });
    }

    items.sort_unstable_by(|a, b| a.id.cmp(&b.id));
    if let Some(limit) = config.limit {
        if items.len() > limit {
            stats.over_limit = items.len() - limit;
            items.truncate(limit);
        }
    }
    stats.kept = items.len();
    (items, stats)
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        // Extended-JSON ObjectId, as exported from document stores.
        Value::Object(map) if map.len() == 1 && map.contains_key("$oid") => {
            map.get("$oid").and_then(scalar_to_string)
        }
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
