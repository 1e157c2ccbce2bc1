use crate::document::Value;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// One value of a transformed row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// A typed array, loaded as a native array column.
    Array { element_type: String, items: Vec<Cell> },
    /// Filled in by the store (`now()`) at load time; has no textual form.
    StoreNow,
}

/// An ordered row, one cell per column.
pub type Row = Vec<Cell>;

impl Cell {
    /// Convert an authored literal (`value`, `default`, conversion target).
    /// Arrays become typed arrays when the column has an element type.
    pub fn from_literal(json: &JsonValue, element_type: Option<&str>) -> Cell {
        match json {
            JsonValue::Null => Cell::Null,
            JsonValue::Bool(b) => Cell::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Cell::Text(s.clone()),
            JsonValue::Array(items) => match element_type {
                Some(element_type) => Cell::Array {
                    element_type: element_type.to_string(),
                    items: items.iter().map(|item| Cell::from_literal(item, None)).collect(),
                },
                None => Cell::Text(json.to_string()),
            },
            JsonValue::Object(_) => Cell::Text(json.to_string()),
        }
    }

    /// Normalize a single document value. `sql_type` disambiguates binary:
    /// a `uuid` column gets the hex string, anything else the raw bytes.
    pub fn from_primitive(value: Value, sql_type: Option<&str>) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(b),
            Value::Int(i) => Cell::Int(i),
            Value::Float(f) => Cell::Float(f),
            Value::String(s) | Value::Symbol(s) => Cell::Text(s),
            Value::ObjectId(oid) => Cell::Text(oid.to_string()),
            Value::Binary(bin) => {
                if sql_type.is_some_and(|t| t.eq_ignore_ascii_case("uuid")) {
                    Cell::Text(hex::encode(&bin.bytes))
                } else {
                    Cell::Blob(bin.bytes)
                }
            }
            Value::DbRef { id, .. } => Cell::Text(id.id_string()),
            Value::DateTime(dt) => Cell::Timestamp(dt),
            nested @ (Value::Array(_) | Value::Document(_)) => Cell::Text(nested.to_json().to_string()),
        }
    }

    /// Lookup key into a column's conversion table.
    pub fn conversion_key(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Binary, ObjectId, BINARY_SUBTYPE_UUID};
    use serde_json::json;

    #[test]
    fn test_literal_arrays_follow_element_type() {
        assert_eq!(
            Cell::from_literal(&json!([1, 2]), Some("INTEGER")),
            Cell::Array {
                element_type: "INTEGER".into(),
                items: vec![Cell::Int(1), Cell::Int(2)]
            }
        );
        assert_eq!(Cell::from_literal(&json!([1, 2]), None), Cell::Text("[1,2]".into()));
        assert_eq!(Cell::from_literal(&json!({"a": 1}), None), Cell::Text("{\"a\":1}".into()));
    }

    #[test]
    fn test_binary_normalization_depends_on_type() {
        let bin = Value::Binary(Binary {
            subtype: BINARY_SUBTYPE_UUID,
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
        });
        assert_eq!(Cell::from_primitive(bin.clone(), Some("UUID")), Cell::Text("deadbeef".into()));
        assert_eq!(
            Cell::from_primitive(bin, Some("BYTEA")),
            Cell::Blob(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn test_identifier_like_values_become_strings() {
        let oid = ObjectId::parse_str("5f1d7b3e9c1a4b2d8e6f0a1b").unwrap();
        assert_eq!(
            Cell::from_primitive(Value::ObjectId(oid), Some("TEXT")),
            Cell::Text("5f1d7b3e9c1a4b2d8e6f0a1b".into())
        );
        assert_eq!(Cell::from_primitive(Value::Symbol("s".into()), None), Cell::Text("s".into()));
        let dbref = Value::DbRef {
            collection: "users".into(),
            id: Box::new(Value::ObjectId(oid)),
        };
        assert_eq!(
            Cell::from_primitive(dbref, None),
            Cell::Text("5f1d7b3e9c1a4b2d8e6f0a1b".into())
        );
    }

    #[test]
    fn test_conversion_keys() {
        assert_eq!(Cell::Int(3).conversion_key().as_deref(), Some("3"));
        assert_eq!(Cell::Bool(true).conversion_key().as_deref(), Some("true"));
        assert_eq!(Cell::Null.conversion_key(), None);
    }
}
