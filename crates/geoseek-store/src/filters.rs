use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Attribute constraints applied to a search.
///
/// The set of filterable fields is closed so that equality, hashing and cache
/// keys are deterministic. An unset or blank constraint means "no constraint".
///
/// # Examples
///
/// ```rust
/// use geoseek_store::SearchFilters;
///
/// let filters = SearchFilters::new().status("open").record_type("  ");
/// assert_eq!(filters.pairs(), vec![("status", "open")]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub classification: Option<String>,
}

impl SearchFilters {
    pub const STATUS: &'static str = "status";
    pub const TYPE: &'static str = "type";
    pub const CLASSIFICATION: &'static str = "classification";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, value: impl Into<String>) -> Self {
        self.status = normalize(value.into());
        self
    }

    pub fn record_type(mut self, value: impl Into<String>) -> Self {
        self.record_type = normalize(value.into());
        self
    }

    pub fn classification(mut self, value: impl Into<String>) -> Self {
        self.classification = normalize(value.into());
        self
    }

    /// Drop blank constraints that were assigned directly to the fields.
    pub fn normalized(self) -> Self {
        Self {
            status: self.status.and_then(normalize),
            record_type: self.record_type.and_then(normalize),
            classification: self.classification.and_then(normalize),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }

    /// Set constraints as `(field, value)` pairs sorted by field name.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        // Field names are listed in sorted order.
        [
            (Self::CLASSIFICATION, self.classification.as_deref()),
            (Self::STATUS, self.status.as_deref()),
            (Self::TYPE, self.record_type.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }

    /// Exact, case-insensitive match as a table query would apply it.
    pub fn matches_exact(&self, record: &Record) -> bool {
        self.pairs().iter().all(|(field, wanted)| {
            record
                .field_str(field)
                .is_some_and(|actual| actual.trim().eq_ignore_ascii_case(wanted))
        })
    }

    /// Case-insensitive substring match, used when filtering after the fetch.
    pub fn matches_loose(&self, record: &Record) -> bool {
        self.pairs().iter().all(|(field, wanted)| {
            let wanted = wanted.to_lowercase();
            record
                .field_str(field)
                .is_some_and(|actual| actual.to_lowercase().contains(&wanted))
        })
    }
}

fn normalize(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
