//! Field values and fill outcome aggregation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A value destined for one logical field.
///
/// Checkbox groups can carry several selections; everything else is a
/// single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Many(Vec<String>),
}

impl FieldValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(s) => Some(s.as_str()),
            FieldValue::Many(_) => None,
        }
    }

    /// All selections, one for `Single`.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(s) => vec![s.as_str()],
            FieldValue::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Single(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Single(s)
    }
}

/// Values keyed by field name.
pub type FieldValues = HashMap<String, FieldValue>;

/// Outcome of filling one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOutcome {
    /// Field name
    pub name: String,
    /// Selector that resolved, if any
    pub selector: Option<String>,
    /// Error message when the field could not be filled
    pub error: Option<String>,
}

/// Aggregated result of a fill pass.
///
/// A single field failure never aborts the pass; callers inspect the
/// aggregate and decide whether the fill is acceptable (typically: every
/// required field filled).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FillResult {
    /// Fields successfully written
    pub filled: Vec<FieldOutcome>,
    /// Fields with no value to write
    pub skipped: Vec<String>,
    /// Fields where every selector strategy failed or the write errored
    pub errors: Vec<FieldOutcome>,
}

impl FillResult {
    pub fn filled_count(&self) -> usize {
        self.filled.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Whether every field in `required` was filled.
    pub fn covers_required<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> bool {
        required
            .into_iter()
            .all(|name| self.filled.iter().any(|o| o.name == name))
    }

    pub(crate) fn record_filled(&mut self, name: impl Into<String>, selector: impl Into<String>) {
        self.filled.push(FieldOutcome {
            name: name.into(),
            selector: Some(selector.into()),
            error: None,
        });
    }

    pub(crate) fn record_skipped(&mut self, name: impl Into<String>) {
        self.skipped.push(name.into());
    }

    pub(crate) fn record_error(&mut self, name: impl Into<String>, error: impl Into<String>) {
        self.errors.push(FieldOutcome {
            name: name.into(),
            selector: None,
            error: Some(error.into()),
        });
    }
}
