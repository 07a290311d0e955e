//! Field values flowing from source rows to destination writes

use serde_json::Value;
use std::collections::BTreeMap;

/// One raw source row keyed by selected column name
pub type SourceRow = BTreeMap<String, Value>;

/// Destination field name to value
pub type FieldValues = BTreeMap<String, Value>;

/// Output of the row converter for one destination object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedRow {
    /// Values for the destination's own columns
    pub core: FieldValues,
    /// Everything else, attached as key/value metadata
    pub meta: FieldValues,
}

/// Canonical text form of a legacy identifier, `None` for NULL or blank
pub fn legacy_key_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Integer view of a value; numeric strings are accepted
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Text stored for a metadata value, `None` for NULL
pub fn meta_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
