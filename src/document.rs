//! Document model for records read from the change feed.
//!
//! Documents arrive as MongoDB Extended JSON. They are parsed once into
//! [`Value`], which keeps the types that plain JSON cannot express (object
//! ids, binary blobs, references, dates) so that the transformer can decide
//! how each one lands in a relational column.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Binary subtype used for UUIDs (`0x03` is the legacy encoding).
pub const BINARY_SUBTYPE_UUID: u8 = 0x04;
pub const BINARY_SUBTYPE_UUID_OLD: u8 = 0x03;

/// A 12-byte document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    /// Parse a 24-character hex string.
    pub fn parse_str(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(ObjectId(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Raw bytes tagged with their binary subtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

/// A dynamically typed document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
    ObjectId(ObjectId),
    Binary(Binary),
    DbRef { collection: String, id: Box<Value> },
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Document(Document),
}

/// An insertion-ordered map of field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, replacing any previous value under the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse an Extended JSON object. Non-object input yields `None`.
    pub fn from_extended_json(json: JsonValue) -> Option<Self> {
        match Value::from_extended_json(json) {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Render as a JSON object, see [`Value::to_json`].
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            map.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Value {
    /// Parse MongoDB Extended JSON (canonical or relaxed).
    pub fn from_extended_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_extended_json).collect())
            }
            JsonValue::Object(map) => match parse_wrapper(&map) {
                Some(value) => value,
                None => Value::Document(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_extended_json(v)))
                        .collect(),
                ),
            },
        }
    }

    /// JSON rendering used wherever a value is text-serialized.
    ///
    /// Object ids, symbols and references become their string form, binary
    /// becomes base64 and non-finite floats become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) | Value::Symbol(s) => JsonValue::String(s.clone()),
            Value::ObjectId(oid) => JsonValue::String(oid.to_string()),
            Value::Binary(bin) => JsonValue::String(BASE64.encode(&bin.bytes)),
            Value::DbRef { id, .. } => JsonValue::String(id.id_string()),
            Value::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Document(doc) => doc.to_json(),
        }
    }

    /// String form of an identifier-like value.
    pub fn id_string(&self) -> String {
        match self {
            Value::String(s) | Value::Symbol(s) => s.clone(),
            Value::ObjectId(oid) => oid.to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Anything other than `null` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::ObjectId(_) => "objectId",
            Value::Binary(_) => "binary",
            Value::DbRef { .. } => "dbref",
            Value::DateTime(_) => "date",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_extended_json(json)
    }
}

/// Recognize the `$`-prefixed single-purpose wrappers of Extended JSON.
fn parse_wrapper(map: &Map<String, JsonValue>) -> Option<Value> {
    let first = map.keys().next()?;
    if !first.starts_with('$') {
        return None;
    }

    if map.len() == 1 {
        let (key, inner) = map.iter().next()?;
        return match (key.as_str(), inner) {
            ("$oid", JsonValue::String(s)) => ObjectId::parse_str(s).map(Value::ObjectId),
            ("$symbol", JsonValue::String(s)) => Some(Value::Symbol(s.clone())),
            ("$numberLong", JsonValue::String(s)) | ("$numberInt", JsonValue::String(s)) => {
                s.parse().ok().map(Value::Int)
            }
            ("$numberDouble", JsonValue::String(s)) => parse_double(s).map(Value::Float),
            ("$date", date) => parse_date(date).map(Value::DateTime),
            ("$binary", JsonValue::Object(bin)) => {
                let data = bin.get("base64")?.as_str()?;
                let subtype = bin.get("subType")?.as_str()?;
                parse_binary(data, subtype)
            }
            _ => None,
        };
    }

    // Legacy binary layout.
    if let (Some(JsonValue::String(data)), Some(JsonValue::String(subtype)), 2) =
        (map.get("$binary"), map.get("$type"), map.len())
    {
        return parse_binary(data, subtype);
    }

    if let (Some(JsonValue::String(collection)), Some(id)) = (map.get("$ref"), map.get("$id")) {
        if map.keys().all(|k| k.starts_with('$')) {
            return Some(Value::DbRef {
                collection: collection.clone(),
                id: Box::new(Value::from_extended_json(id.clone())),
            });
        }
    }

    None
}

fn parse_binary(data: &str, subtype: &str) -> Option<Value> {
    let bytes = BASE64.decode(data).ok()?;
    let subtype = u8::from_str_radix(subtype, 16).ok()?;
    Some(Value::Binary(Binary { subtype, bytes }))
}

fn parse_double(s: &str) -> Option<f64> {
    match s {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

fn parse_date(json: &JsonValue) -> Option<DateTime<Utc>> {
    match json {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        JsonValue::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        JsonValue::Object(inner) => {
            let millis = inner.get("$numberLong")?.as_str()?.parse().ok()?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json_maps_structurally() {
        let doc = Document::from_extended_json(json!({
            "name": "Alice",
            "age": 30,
            "score": 1.5,
            "tags": ["a", null],
            "nested": {"ok": true}
        }))
        .unwrap();

        assert_eq!(doc.get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(doc.get("age"), Some(&Value::Int(30)));
        assert_eq!(doc.get("score"), Some(&Value::Float(1.5)));
        assert_eq!(
            doc.get("tags"),
            Some(&Value::Array(vec![Value::String("a".into()), Value::Null]))
        );
        assert!(doc.get("nested").unwrap().as_document().unwrap().contains_key("ok"));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["name", "age", "score", "tags", "nested"]);
    }

    #[test]
    fn test_extended_json_wrappers() {
        let doc = Document::from_extended_json(json!({
            "_id": {"$oid": "5f1d7b3e9c1a4b2d8e6f0a1b"},
            "when": {"$date": {"$numberLong": "1600000000000"}},
            "blob": {"$binary": {"base64": "AQID", "subType": "00"}},
            "legacy": {"$binary": "AQID", "$type": "04"},
            "big": {"$numberLong": "9007199254740993"},
            "nan": {"$numberDouble": "NaN"},
            "sym": {"$symbol": "abc"},
            "owner": {"$ref": "users", "$id": {"$oid": "5f1d7b3e9c1a4b2d8e6f0a1c"}}
        }))
        .unwrap();

        assert_eq!(
            doc.get("_id").unwrap().id_string(),
            "5f1d7b3e9c1a4b2d8e6f0a1b"
        );
        assert_eq!(
            doc.get("when"),
            Some(&Value::DateTime(Utc.timestamp_millis_opt(1_600_000_000_000).unwrap()))
        );
        assert_eq!(
            doc.get("blob"),
            Some(&Value::Binary(Binary { subtype: 0, bytes: vec![1, 2, 3] }))
        );
        assert_eq!(
            doc.get("legacy"),
            Some(&Value::Binary(Binary { subtype: BINARY_SUBTYPE_UUID, bytes: vec![1, 2, 3] }))
        );
        assert_eq!(doc.get("big"), Some(&Value::Int(9_007_199_254_740_993)));
        assert!(matches!(doc.get("nan"), Some(Value::Float(f)) if f.is_nan()));
        assert_eq!(doc.get("sym"), Some(&Value::Symbol("abc".into())));
        match doc.get("owner") {
            Some(Value::DbRef { collection, id }) => {
                assert_eq!(collection, "users");
                assert_eq!(id.id_string(), "5f1d7b3e9c1a4b2d8e6f0a1c");
            }
            other => panic!("Expected DbRef, got {:?}", other),
        }
    }

    #[test]
    fn test_to_json_sanitizes_binary_and_nan() {
        let doc: Document = vec![
            ("bin".to_string(), Value::Binary(Binary { subtype: 0, bytes: vec![0xff, 0x00] })),
            ("nan".to_string(), Value::Float(f64::NAN)),
            (
                "deep".to_string(),
                Value::Array(vec![Value::Float(f64::INFINITY), Value::Int(1)]),
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            doc.to_json(),
            json!({"bin": "/wA=", "nan": null, "deep": [null, 1]})
        );
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut doc = Document::from_extended_json(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        assert_eq!(doc.remove("b"), Some(Value::Int(2)));
        assert_eq!(doc.remove("missing"), None);
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_object_id_hex() {
        let oid = ObjectId::parse_str("5F1D7B3E9C1A4B2D8E6F0A1B").unwrap();
        assert_eq!(oid.0[0], 0x5f);
        assert_eq!(oid.to_string(), "5f1d7b3e9c1a4b2d8e6f0a1b");
        assert_eq!(ObjectId::parse_str("5f1d7b3e9c1a4b2d8e6f0a"), None);
        assert_eq!(ObjectId::parse_str("zz1d7b3e9c1a4b2d8e6f0a1b"), None);
        assert_eq!(ObjectId::parse_str("+f1d7b3e9c1a4b2d8e6f0a1b"), None);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut doc = Document::from_extended_json(json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(doc.insert("a", Value::Int(9)), Some(Value::Int(1)));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_wide_documents_keep_key_order() {
        let fields: serde_json::Map<String, JsonValue> =
            (0..20_000).map(|i| (format!("f{}", i), json!(i))).collect();
        let mut doc = Document::from_extended_json(JsonValue::Object(fields)).unwrap();

        assert_eq!(doc.len(), 20_000);
        assert_eq!(doc.get("f19999"), Some(&Value::Int(19_999)));
        assert_eq!(doc.remove("f0"), Some(Value::Int(0)));
        assert_eq!(doc.keys().next(), Some("f1"));
    }

    #[test]
    fn test_invalid_object_id_stays_a_document() {
        let value = Value::from_extended_json(json!({"$oid": "nope"}));
        assert!(value.as_document().is_some());
    }
}
