//! Core domain types: entities, their seven facts, provenance, and search hits.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HeirdeskError;

/// Canonical "no data" marker. A field is never absent; it holds this instead.
pub const NO_DATA: &str = "no data";

/// Canonical marker appended to summaries extracted from search snippets.
pub const DEGRADED_MARKER: &str = "[inferred from search results]";

// ---------------------------------------------------------------------------
// FieldKey
// ---------------------------------------------------------------------------

/// The seven facts collected for every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    ContactPhone,
    FreezeMethod,
    BalanceCert,
    TransactionHistory,
    Cancellation,
    Investment,
    SafeDeposit,
}

impl FieldKey {
    /// Every field key, in display order.
    pub const ALL: [FieldKey; 7] = [
        FieldKey::ContactPhone,
        FieldKey::FreezeMethod,
        FieldKey::BalanceCert,
        FieldKey::TransactionHistory,
        FieldKey::Cancellation,
        FieldKey::Investment,
        FieldKey::SafeDeposit,
    ];

    /// Wire key used in prompts, completions and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactPhone => "contact_phone",
            Self::FreezeMethod => "freeze_method",
            Self::BalanceCert => "balance_cert",
            Self::TransactionHistory => "transaction_history",
            Self::Cancellation => "cancellation",
            Self::Investment => "investment",
            Self::SafeDeposit => "safe_deposit",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContactPhone => "Contact phone",
            Self::FreezeMethod => "Account freeze",
            Self::BalanceCert => "Balance certificate",
            Self::TransactionHistory => "Transaction history",
            Self::Cancellation => "Cancellation / payout",
            Self::Investment => "Funds & bonds",
            Self::SafeDeposit => "Safe deposit box",
        }
    }

    /// Instruction shown to the model for this key.
    pub fn prompt_hint(&self) -> &'static str {
        match self {
            Self::ContactPhone => "phone number (prefer the dedicated inheritance line)",
            Self::FreezeMethod => "how to report the death and freeze accounts (phone/web/branch)",
            Self::BalanceCert => "how to request a balance certificate and required documents",
            Self::TransactionHistory => "how to request a transaction history statement",
            Self::Cancellation => "how to close accounts and pay out the balance",
            Self::Investment => "procedure for investment trusts and government bonds",
            Self::SafeDeposit => "procedure for safe deposit boxes",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = HeirdeskError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FieldKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| HeirdeskError::validation(format!("unknown field key '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// A complete mapping of every [`FieldKey`] to a value.
///
/// Construction always fills all seven keys; missing or blank values become
/// [`NO_DATA`], so consumers never special-case absent keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Fields(BTreeMap<FieldKey, String>);

impl Fields {
    /// All fields set to [`NO_DATA`].
    pub fn empty() -> Self {
        Self(
            FieldKey::ALL
                .into_iter()
                .map(|k| (k, NO_DATA.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, key: FieldKey) -> &str {
        self.0.get(&key).map(String::as_str).unwrap_or(NO_DATA)
    }

    /// Set a field; blank values are stored as [`NO_DATA`].
    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        self.0.insert(key, normalize_value(value.into()));
    }

    /// Iterate in [`FieldKey::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Number of fields holding something other than [`NO_DATA`].
    pub fn populated_count(&self) -> usize {
        self.0.values().filter(|v| !is_no_data(v)).count()
    }

    pub fn is_all_sentinel(&self) -> bool {
        self.populated_count() == 0
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<BTreeMap<String, String>> for Fields {
    fn from(raw: BTreeMap<String, String>) -> Self {
        let mut fields = Fields::empty();
        for (key, value) in raw {
            if let Ok(key) = key.parse::<FieldKey>() {
                fields.set(key, value);
            }
        }
        fields
    }
}

impl From<Fields> for BTreeMap<String, String> {
    fn from(fields: Fields) -> Self {
        fields
            .0
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect()
    }
}

/// Whether a value is the sentinel (or blank, which is treated the same).
pub fn is_no_data(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == NO_DATA
}

fn normalize_value(value: String) -> String {
    if is_no_data(&value) {
        NO_DATA.to_string()
    } else {
        value.trim().to_string()
    }
}

/// Append [`DEGRADED_MARKER`] to a summary, once.
pub fn tag_degraded(summary: &str) -> String {
    let trimmed = summary.trim();
    if trimmed.ends_with(DEGRADED_MARKER) {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        DEGRADED_MARKER.to_string()
    } else {
        format!("{trimmed} {DEGRADED_MARKER}")
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Which acquisition path produced an entity's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Cached,
    Live,
    SnippetFallback,
    Failed,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Live => "live",
            Self::SnippetFallback => "snippet_fallback",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = HeirdeskError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cached" => Ok(Self::Cached),
            "live" => Ok(Self::Live),
            "snippet_fallback" => Ok(Self::SnippetFallback),
            "failed" => Ok(Self::Failed),
            other => Err(HeirdeskError::validation(format!(
                "unknown provenance '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// LastUpdated
// ---------------------------------------------------------------------------

/// Last acquisition time, or the `"-"` sentinel for never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LastUpdated {
    #[default]
    Never,
    At(DateTime<Utc>),
}

impl LastUpdated {
    /// Sentinel string for [`LastUpdated::Never`].
    pub const NEVER: &'static str = "-";

    pub fn now() -> Self {
        Self::At(Utc::now())
    }

    /// Compact display form (`%Y-%m-%d %H:%M` or `-`).
    pub fn display(&self) -> String {
        match self {
            Self::Never => Self::NEVER.to_string(),
            Self::At(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

impl TryFrom<String> for LastUpdated {
    type Error = HeirdeskError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == Self::NEVER {
            return Ok(Self::Never);
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self::At(dt.with_timezone(&Utc)))
            .map_err(|e| HeirdeskError::validation(format!("invalid timestamp '{trimmed}': {e}")))
    }
}

impl From<LastUpdated> for String {
    fn from(value: LastUpdated) -> Self {
        match value {
            LastUpdated::Never => LastUpdated::NEVER.to_string(),
            LastUpdated::At(ts) => ts.to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A queryable subject (a bank) and its acquired facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique key within the registry.
    pub name: String,
    /// Registered source page, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub fields: Fields,
    /// Free-text remainder, possibly tagged with [`DEGRADED_MARKER`].
    #[serde(default = "no_data")]
    pub summary: String,
    /// `None` until the first acquisition has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub last_updated: LastUpdated,
}

fn no_data() -> String {
    NO_DATA.to_string()
}

impl Entity {
    /// A freshly seeded entity: name and URL only, every fact the sentinel.
    pub fn seeded(name: impl Into<String>, source_url: Option<&str>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.map(str::to_string),
            fields: Fields::empty(),
            summary: no_data(),
            provenance: None,
            last_updated: LastUpdated::Never,
        }
    }

    /// Whether the stored facts are usable without a new acquisition.
    pub fn has_cached_facts(&self) -> bool {
        !self.fields.is_all_sentinel()
    }
}

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// Ephemeral result of web discovery: the top URL plus snippet lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    /// One `- {title}: {body}` line per returned result, in rank order.
    pub snippets: Vec<String>,
}

impl SearchHit {
    /// All snippets joined into one text corpus.
    pub fn corpus(&self) -> String {
        self.snippets.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_cover_every_key() {
        let fields = Fields::empty();
        assert_eq!(fields.iter().count(), 7);
        assert!(fields.iter().all(|(_, v)| v == NO_DATA));
        assert!(fields.is_all_sentinel());
    }

    #[test]
    fn blank_values_become_sentinel() {
        let mut fields = Fields::empty();
        fields.set(FieldKey::ContactPhone, "   ");
        assert_eq!(fields.get(FieldKey::ContactPhone), NO_DATA);

        fields.set(FieldKey::ContactPhone, " 0120-000-000 ");
        assert_eq!(fields.get(FieldKey::ContactPhone), "0120-000-000");
        assert_eq!(fields.populated_count(), 1);
    }

    #[test]
    fn partial_map_deserializes_complete() {
        let json = r#"{"contact_phone":"03-0000","fax":"ignored"}"#;
        let fields: Fields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.get(FieldKey::ContactPhone), "03-0000");
        assert_eq!(fields.get(FieldKey::SafeDeposit), NO_DATA);
        assert_eq!(fields.iter().count(), 7);
    }

    #[test]
    fn field_key_parse() {
        assert_eq!(
            "balance_cert".parse::<FieldKey>().unwrap(),
            FieldKey::BalanceCert
        );
        assert!("fax".parse::<FieldKey>().is_err());
    }

    #[test]
    fn degraded_tag_is_idempotent() {
        let once = tag_degraded("Reservation required.");
        assert_eq!(once, format!("Reservation required. {DEGRADED_MARKER}"));
        assert_eq!(tag_degraded(&once), once);
        assert_eq!(tag_degraded(""), DEGRADED_MARKER);
    }

    #[test]
    fn last_updated_sentinel_roundtrip() {
        let json = serde_json::to_string(&LastUpdated::Never).unwrap();
        assert_eq!(json, r#""-""#);
        let parsed: LastUpdated = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LastUpdated::Never);
        assert_eq!(parsed.display(), "-");
    }

    #[test]
    fn seeded_entity_has_no_cached_facts() {
        let entity = Entity::seeded("Acme Bank", Some("https://acme.example/inherit"));
        assert!(!entity.has_cached_facts());
        assert_eq!(entity.provenance, None);
        assert_eq!(entity.summary, NO_DATA);
    }

    #[test]
    fn provenance_parse() {
        assert_eq!(
            "snippet_fallback".parse::<Provenance>().unwrap(),
            Provenance::SnippetFallback
        );
        assert!("stale".parse::<Provenance>().is_err());
    }

    #[test]
    fn search_hit_corpus_joins_lines() {
        let hit = SearchHit {
            url: "https://acme.example".into(),
            snippets: vec!["- A: one".into(), "- B: two".into()],
        };
        assert_eq!(hit.corpus(), "- A: one\n- B: two");
    }
}
