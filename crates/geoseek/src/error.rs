use geoseek_store::{GeoError, StoreError};
use thiserror::Error;

use crate::classify::{ErrorKind, SearchFailure};

#[derive(Error, Debug)]
pub enum GeoseekError {
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Invalid coordinates: {0}")]
    GeoError(#[from] GeoError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GeoseekError>;

/// Outcome of a search that did not produce records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error(transparent)]
    Failed(#[from] SearchFailure),
    #[error("Search was cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(failure) => Some(failure.kind),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn failure(&self) -> Option<&SearchFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Cancelled => None,
        }
    }
}

impl From<GeoError> for SearchError {
    fn from(err: GeoError) -> Self {
        Self::Failed(err.into())
    }
}
