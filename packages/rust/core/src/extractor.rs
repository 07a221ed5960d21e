//! Structured extraction: source text → seven facts plus a summary.
//!
//! The completion is asked for a single JSON object with a fixed key set.
//! Models often wrap the object in prose or code fences, so the reply is
//! decoded from its [`brace_span`] rather than as a whole.

use heirdesk_completion::{ExhaustionError, Rotator};
use heirdesk_shared::{FieldKey, Fields, NO_DATA, tag_degraded};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

/// Key for the free-text remainder in the completion's JSON object.
const SUMMARY_KEY: &str = "summary";

/// Characters of raw completion kept in a parse error.
const EXCERPT_CHARS: usize = 200;

/// What the source text is, which decides prompt wording and summary tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rendered text of the entity's own page.
    Rich,
    /// Search-result snippets; the summary is tagged as inferred.
    Degraded,
}

/// A decoded extraction. Every field is present (possibly the sentinel).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Fields,
    pub summary: String,
    /// How many of the seven field keys the reply carried.
    field_keys: usize,
}

impl Record {
    /// True when the reply carried none of the seven field keys. A summary
    /// alone does not make a record.
    pub fn is_empty(&self) -> bool {
        self.field_keys == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The completion had no decodable JSON object.
    #[error("unparseable completion ({reason}): {raw_excerpt}")]
    Parse { reason: String, raw_excerpt: String },

    #[error(transparent)]
    Exhausted(#[from] ExhaustionError),
}

/// Runs extraction prompts through the rotation layer.
pub struct Extractor {
    rotator: Rotator,
    max_source_chars: usize,
}

impl Extractor {
    pub fn new(rotator: Rotator, max_source_chars: usize) -> Self {
        Self {
            rotator,
            max_source_chars,
        }
    }

    /// Extract a [`Record`] from `source`.
    #[instrument(skip_all, fields(mode = ?mode, source_chars = source.chars().count()))]
    pub async fn extract(&self, source: &str, mode: Mode) -> Result<Record, ExtractError> {
        let prompt = build_prompt(source, mode, self.max_source_chars);
        let raw = self.rotator.complete(&prompt).await?;

        let mut record = parse_record(&raw).inspect_err(|e| warn!(error = %e, "extraction unparseable"))?;
        if mode == Mode::Degraded {
            record.summary = tag_degraded(&record.summary);
        }

        debug!(
            field_keys = record.field_keys,
            populated = record.fields.populated_count(),
            "record extracted"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Build the fixed-schema prompt around a bounded prefix of `source`.
pub fn build_prompt(source: &str, mode: Mode, max_source_chars: usize) -> String {
    let source_kind = match mode {
        Mode::Rich => "web page text",
        Mode::Degraded => "search result snippets",
    };

    let mut schema = String::from("{\n");
    for key in FieldKey::ALL {
        schema.push_str(&format!("  \"{}\": \"{}\",\n", key.as_str(), key.prompt_hint()));
    }
    schema.push_str(&format!(
        "  \"{SUMMARY_KEY}\": \"any other notes (appointment required, etc.)\"\n}}"
    ));

    let source: String = source.chars().take(max_source_chars).collect();

    format!(
        "You assist an administrative scrivener with bank inheritance procedures.\n\
         From the {source_kind} below, extract the seven key items needed to settle \
         a deceased customer's accounts.\n\
         Reply with exactly one JSON object using these keys. \
         Write \"{NO_DATA}\" for anything the source does not state.\n\n\
         {schema}\n\n\
         --- Source ---\n\
         {source}\n"
    )
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// The span from the first `{` to the last `}`, inclusive.
///
/// This tolerates prose and code fences around a single object. It does not
/// balance braces: unrelated braces in the surrounding prose widen the span,
/// and the widened span then fails to decode.
pub fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Decode a completion reply into a [`Record`].
pub fn parse_record(raw: &str) -> Result<Record, ExtractError> {
    let span = brace_span(raw).ok_or_else(|| parse_error("no JSON object found", raw))?;

    let value: Value =
        serde_json::from_str(span).map_err(|e| parse_error(&format!("invalid JSON: {e}"), raw))?;
    let Value::Object(object) = value else {
        return Err(parse_error("JSON value is not an object", raw));
    };

    let mut fields = Fields::empty();
    let mut field_keys = 0;
    for key in FieldKey::ALL {
        if let Some(value) = object.get(key.as_str()) {
            field_keys += 1;
            fields.set(key, stringify(value));
        }
    }

    let summary = match object.get(SUMMARY_KEY) {
        Some(value) => non_blank_or_sentinel(stringify(value)),
        None => NO_DATA.to_string(),
    };

    Ok(Record {
        fields,
        summary,
        field_keys,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(map) => stringify_object(map),
    }
}

fn stringify_object(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}: {}", stringify(v)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn non_blank_or_sentinel(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        NO_DATA.to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_error(reason: &str, raw: &str) -> ExtractError {
    ExtractError::Parse {
        reason: reason.to_string(),
        raw_excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
    }
}
