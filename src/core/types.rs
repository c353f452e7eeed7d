//! Core types - platform-independent data structures
//!
//! These types represent extracted alliance state and are shared by the
//! extractor, the state store and the view projection.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// FIELD VALUES
// =============================================================================

/// One alliance member row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    pub rank: Option<String>,
    pub power: Option<i64>,
}

/// A typed value for one logical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Duration(Duration),
    Roster(Vec<Member>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_roster(&self) -> Option<&[Member]> {
        match self {
            FieldValue::Roster(members) => Some(members),
            _ => None,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable, versioned result of one extraction pass.
///
/// There are no setters: a newer state is always a new `Snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    version: u64,
    captured_at: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
    valid: bool,
    missing: Vec<String>,
}

impl Snapshot {
    pub fn new(
        version: u64,
        captured_at: DateTime<Utc>,
        fields: BTreeMap<String, FieldValue>,
        valid: bool,
        missing: Vec<String>,
    ) -> Self {
        Self {
            version,
            captured_at,
            fields,
            valid,
            missing,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture time in milliseconds since the Unix epoch
    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at.timestamp_millis().max(0) as u64
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Optional fields that could not be extracted in this pass
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_integer)
    }

    pub fn duration(&self, field: &str) -> Option<Duration> {
        self.get(field).and_then(FieldValue::as_duration)
    }

    pub fn roster(&self, field: &str) -> Option<&[Member]> {
        self.get(field).and_then(FieldValue::as_roster)
    }
}

/// Convert page-clock milliseconds to a UTC timestamp
pub fn timestamp_from_ms(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}
