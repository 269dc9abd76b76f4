//! Legacy record type with typed field extraction.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// A malformed or incomplete legacy record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no id")]
    MissingId,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("malformed date in '{field}': {value}")]
    MalformedDate { field: String, value: String },
}

/// A single legacy row: column names mapped to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Record {
    data: Map<String, JsonValue>,
}

impl Record {
    /// Creates a record from a map of column names to values.
    pub fn new(data: Map<String, JsonValue>) -> Self {
        Self { data }
    }

    /// Gets a value by column name, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing, null, or of the wrong type.
    pub fn get<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, RecordError> {
        self.get_opt(key)?.ok_or(RecordError::MissingField(key))
    }

    /// Gets a value, returning `None` if the column is missing or null.
    ///
    /// Still returns an error if the column exists but deserialization fails.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RecordError> {
        match self.data.get(key) {
            Some(v) if v.is_null() => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| RecordError::InvalidField {
                    field: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Returns the raw JSON value for a column, if it exists.
    pub fn get_raw(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    /// Text value of a column: strings are trimmed, numbers rendered.
    ///
    /// Blank strings, nulls and missing columns all yield `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            JsonValue::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean flag accepting the encodings found in legacy exports.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, RecordError> {
        let invalid = |value: &str| RecordError::InvalidField {
            field: key.to_string(),
            message: format!("'{}' is not a boolean", value),
        };

        match self.data.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Bool(b)) => Ok(Some(*b)),
            Some(JsonValue::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(invalid(&n.to_string())),
            },
            Some(JsonValue::String(s)) => match s.trim().to_lowercase().as_str() {
                "" => Ok(None),
                "true" | "t" | "s" | "sim" | "y" | "yes" | "1" => Ok(Some(true)),
                "false" | "f" | "n" | "não" | "nao" | "no" | "0" => Ok(Some(false)),
                other => Err(invalid(other)),
            },
            Some(other) => Err(invalid(&other.to_string())),
        }
    }

    /// The record's legacy identifier.
    pub fn legacy_id(&self) -> Option<String> {
        self.text("id")
    }

    /// Returns all column names in this record.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Map<String, JsonValue>> for Record {
    fn from(data: Map<String, JsonValue>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => Record::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_record_get_number() {
        let r = record(json!({"frequency_hours": 12}));
        let hours: i64 = r.get("frequency_hours").unwrap();
        assert_eq!(hours, 12);
    }

    #[test]
    fn test_record_get_missing_key() {
        let r = record(json!({}));
        let result: Result<String, _> = r.get("name");
        assert_eq!(result, Err(RecordError::MissingField("name")));
    }

    #[test]
    fn test_record_get_opt_null() {
        let r = record(json!({"notes": null}));
        let notes: Option<String> = r.get_opt("notes").unwrap();
        assert_eq!(notes, None);
    }

    #[test]
    fn test_record_get_wrong_type() {
        let r = record(json!({"frequency_hours": "twice"}));
        let result: Result<Option<i64>, _> = r.get_opt("frequency_hours");
        assert!(matches!(result, Err(RecordError::InvalidField { .. })));
    }

    #[test]
    fn test_text_normalizes_ids_and_blanks() {
        let r = record(json!({"id": 42, "name": "  Rex ", "breed": "   "}));
        assert_eq!(r.legacy_id().as_deref(), Some("42"));
        assert_eq!(r.text("name").as_deref(), Some("Rex"));
        assert_eq!(r.text("breed"), None);
        assert_eq!(r.text("missing"), None);
    }

    #[test]
    fn test_flag_encodings() {
        let r = record(json!({"a": true, "b": 0, "c": "S", "d": "não", "e": "talvez"}));
        assert_eq!(r.flag("a").unwrap(), Some(true));
        assert_eq!(r.flag("b").unwrap(), Some(false));
        assert_eq!(r.flag("c").unwrap(), Some(true));
        assert_eq!(r.flag("d").unwrap(), Some(false));
        assert_eq!(r.flag("missing").unwrap(), None);
        assert!(r.flag("e").is_err());
    }
}
