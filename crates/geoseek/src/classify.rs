//! Classification of raw store failures.
//!
//! Backends report failures as free-form messages with optional vendor codes.
//! This module maps them onto a small closed set of [`ErrorKind`]s, each with a
//! fixed user-facing message and a recoverability flag, and recognises the
//! "optional capability is missing" signal that must trigger fallback instead
//! of surfacing as a failure.

use std::fmt;

use geoseek_store::{GeoError, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Typed category of a failed search.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    NotFound,
    Coordinates,
    Database,
    Permission,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [Self; 7] = [
        Self::Network,
        Self::Timeout,
        Self::NotFound,
        Self::Coordinates,
        Self::Database,
        Self::Permission,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::NotFound => "NOT_FOUND",
            Self::Coordinates => "COORDINATES",
            Self::Database => "DATABASE",
            Self::Permission => "PERMISSION",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Message shown to end users. Contains no technical detail.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network => {
                "We couldn't reach the server. Check your connection and try again."
            }
            Self::Timeout => {
                "The search took too long. Try again, or search a smaller area."
            }
            Self::NotFound => "Nothing was found for this location.",
            Self::Coordinates => {
                "The selected location is not valid. Pick a different point on the map."
            }
            Self::Database => {
                "The search could not be completed. Try a narrower location or different filters."
            }
            Self::Permission => "You don't have permission to view these results.",
            Self::Unknown => "Something went wrong while searching. Please try again.",
        }
    }

    /// Network and timeout failures are worth retrying as-is.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified search failure.
///
/// `Display` includes the technical detail for logs; use
/// [`SearchFailure::user_message`] for anything shown to end users.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct SearchFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl SearchFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_store(err: &StoreError) -> Self {
        Self::new(classify(err), err.message.clone())
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl From<GeoError> for SearchFailure {
    fn from(err: GeoError) -> Self {
        Self::new(ErrorKind::Coordinates, err.to_string())
    }
}

static MISSING_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)function\s+\S+.*does not exist|could not find the function|function\s+\S+\s+not found")
        .unwrap()
});

/// Message patterns in evaluation order. Earlier rules win, so "connection
/// timed out" is a timeout and "relation ... does not exist" is a database error.
static MESSAGE_RULES: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    [
        (
            ErrorKind::Timeout,
            r"(?i)timed?\s*out|timeout|canceling statement|deadline exceeded",
        ),
        (
            ErrorKind::Permission,
            r"(?i)permission denied|unauthori[sz]ed|not authori[sz]ed|forbidden|row-level security|\bjwt\b|access denied",
        ),
        (
            ErrorKind::Network,
            r"(?i)network|connection|could not connect|offline|failed to fetch|fetch failed|dns|unreachable|socket|econn",
        ),
        (
            ErrorKind::Coordinates,
            r"(?i)coordinate|latitude|longitude|invalid geometry|geography",
        ),
        (
            ErrorKind::Database,
            r"(?i)(relation|column|table)\s+\S+\s+does not exist|syntax error|\bsql\b|database|violates|constraint|postgres",
        ),
        (
            ErrorKind::NotFound,
            r"(?i)not found|no rows|does not exist|could not find",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

fn classify_code(code: &str) -> Option<ErrorKind> {
    let code = code.trim().to_ascii_uppercase();
    let kind = match code.as_str() {
        "57014" => ErrorKind::Timeout,
        "42501" => ErrorKind::Permission,
        "42883" | "PGRST202" | "PGRST116" => ErrorKind::NotFound,
        "42P01" | "42703" | "42601" => ErrorKind::Database,
        c if c.starts_with("08") => ErrorKind::Network,
        c if c.starts_with("22") || c.starts_with("23") => ErrorKind::Database,
        _ => return None,
    };
    Some(kind)
}

/// Classify a free-form error message.
pub fn classify_message(message: &str) -> ErrorKind {
    if MISSING_FUNCTION.is_match(message) {
        return ErrorKind::NotFound;
    }
    MESSAGE_RULES
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(ErrorKind::Unknown, |(kind, _)| *kind)
}

/// Classify a raw store error. A recognised vendor code wins over the message.
pub fn classify(err: &StoreError) -> ErrorKind {
    err.code
        .as_deref()
        .and_then(classify_code)
        .unwrap_or_else(|| classify_message(&err.message))
}

/// Whether the error only says an optional backend capability is absent.
///
/// Such errors trigger fallback silently and are never shown to users.
pub fn is_non_critical(err: &StoreError) -> bool {
    let code_says_missing = err
        .code
        .as_deref()
        .is_some_and(|c| matches!(c.trim(), "42883" | "PGRST202"));
    code_says_missing || MISSING_FUNCTION.is_match(&err.message)
}
