use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::GeoPoint;

/// A row returned by the record store.
///
/// Apart from the identifier and location the contents are opaque to the
/// engine; `fields` holds whatever columns the query projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value as a string slice, when it is a JSON string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Keep only the listed fields. The id and location are never dropped.
    pub fn project(mut self, columns: &[&str]) -> Self {
        self.fields.retain(|name, _| columns.contains(&name.as_str()));
        self
    }
}
