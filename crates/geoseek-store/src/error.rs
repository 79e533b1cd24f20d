use thiserror::Error;

use crate::record::Record;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("Longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
}

/// Raw error reported by a record store.
///
/// Backends describe failures with a free-form message and, where available, a
/// vendor code (SQLSTATE or similar). A backend that gives up mid-query may
/// still hand back the rows it had already produced in `partial`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    pub code: Option<String>,
    pub partial: Vec<Record>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            partial: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_partial(mut self, partial: Vec<Record>) -> Self {
        self.partial = partial;
        self
    }

    /// The error a Postgres-style backend reports when a statement timeout fires.
    pub fn statement_timeout() -> Self {
        Self::new("canceling statement due to statement timeout").with_code("57014")
    }

    /// The error reported when the indexed nearby function is not installed.
    pub fn missing_function(name: &str) -> Self {
        Self::new(format!(
            "function {name}(latitude double precision, longitude double precision, radius_km double precision) does not exist"
        ))
        .with_code("42883")
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}
