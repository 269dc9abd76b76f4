//! Row and streaming types for SQL query results.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppError;

/// A stream of rows from a query result.
///
/// Rows are fetched on demand, not loaded all at once.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<Row, AppError>> + Send + 'a>>;

/// A single row from a query result.
///
/// Contains column values as JSON, with typed extraction via [`Row::get`].
#[derive(Debug, Clone, Default)]
pub struct Row {
    data: HashMap<String, JsonValue>,
}

impl Row {
    /// Creates a new row from a map of column names to values.
    pub fn new(data: HashMap<String, JsonValue>) -> Self {
        Self { data }
    }

    /// Gets a value by column name, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is not found or if deserialization fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id: String = row.get("id")?;
    /// let version: i64 = row.get("version")?;
    /// ```
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, AppError> {
        self.data
            .get(key)
            .ok_or_else(|| AppError::Internal(format!("column not found: {}", key)))
            .and_then(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    AppError::Internal(format!("failed to deserialize '{}': {}", key, e))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        Row::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_row_get() {
        let r = row(&[("id", json!("01J")), ("version", json!(3))]);
        assert_eq!(r.get::<String>("id").unwrap(), "01J");
        assert_eq!(r.get::<i64>("version").unwrap(), 3);
        assert!(r.get::<String>("missing").is_err());
    }
}
