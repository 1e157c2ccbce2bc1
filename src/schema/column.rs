//! Column declarations and their normalization.
//!
//! Schema authors may declare a column in one of four shapes:
//!
//! ```yaml
//! - tags:                          # multi-source: builds a JSON object
//!   sources: [x, y]
//!   keys: [kx, ky]
//!   type: TEXT
//! - var_a:                         # explicit single source (dotted path or $special)
//!   source: vars.a
//!   type: TEXT
//! - _id: TEXT                      # shorthand, source and name are the same
//! - kind:                          # hardcoded value
//!   value: k
//!   type: TEXT
//! ```
//!
//! Each shape is resolved once into a [`ColumnSpec`]; nothing downstream looks
//! at the authored form again.

use crate::error::{Error, Result};
use crate::schema::eval::ValueTransform;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

static ARRAY_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s+array$").unwrap()
});

static EXISTS_SOURCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$exists (.+)$").unwrap()
});

static ELEM_SOURCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$elem\.([A-Za-z_][A-Za-z0-9_]*)\.(\d+)$").unwrap()
});

/// Keys with a fixed meaning inside a column entry. Any other key is the name.
const RESERVED_KEYS: &[&str] = &[
    "source", "sources", "keys", "type", "value", "default", "conversions", "eval",
];

/// Directive sources, written with a leading `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialSource {
    /// `$timestamp`: the store fills in `now()` when the row is loaded.
    Timestamp,
    /// `$exists a.b`: whether the dotted path is present in the document.
    Exists(String),
    /// `$elem.field.N`: the N-th element of a top-level array field.
    Elem { field: String, index: usize },
}

impl SpecialSource {
    pub fn parse(source: &str) -> Option<Self> {
        if source == "$timestamp" {
            return Some(SpecialSource::Timestamp);
        }
        if let Some(caps) = EXISTS_SOURCE_REGEX.captures(source) {
            return Some(SpecialSource::Exists(caps[1].to_string()));
        }
        if let Some(caps) = ELEM_SOURCE_REGEX.captures(source) {
            let index = caps[2].parse().ok()?;
            return Some(SpecialSource::Elem {
                field: caps[1].to_string(),
                index,
            });
        }
        None
    }
}

/// How a column obtains its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The same literal for every row.
    Literal(JsonValue),
    /// A JSON object keyed by `keys[i]` built from top-level fields `sources[i]`.
    Multi { sources: Vec<String>, keys: Vec<String> },
    Special(SpecialSource),
    /// A dotted path into the document; the field is consumed.
    Path(String),
}

/// One target column, in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    /// Set when `sql_type` is `<base> ARRAY`.
    pub element_type: Option<String>,
    /// The authored `source`, if any.
    pub source: Option<String>,
    pub extraction: Extraction,
    pub default: Option<JsonValue>,
    pub conversions: Option<Map<String, JsonValue>>,
    pub eval: Option<ValueTransform>,
}

/// The four authored shapes, before canonicalization.
enum ColumnEntry {
    MultiSource {
        name: String,
        sources: Vec<String>,
        keys: Vec<String>,
        sql_type: String,
    },
    SingleSource {
        name: String,
        source: String,
        value: Option<JsonValue>,
        sql_type: String,
    },
    Shorthand {
        name: String,
        sql_type: String,
    },
    Literal {
        name: String,
        value: JsonValue,
        sql_type: String,
    },
}

/// Strip the leading colon of symbol-style keys (`:source` -> `source`).
pub(crate) fn symbol_key(key: &str) -> &str {
    key.strip_prefix(':').unwrap_or(key)
}

/// Copy of a structural map with symbol-style keys normalized.
pub(crate) fn normalize_keys(map: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    map.iter()
        .map(|(k, v)| (symbol_key(k).to_string(), v.clone()))
        .collect()
}

impl ColumnEntry {
    fn classify(entry: &Map<String, JsonValue>) -> std::result::Result<Self, String> {
        let sql_type = entry.get("type").and_then(JsonValue::as_str);

        if let (Some(JsonValue::Array(sources)), Some(JsonValue::Array(keys)), Some(sql_type)) =
            (entry.get("sources"), entry.get("keys"), sql_type)
        {
            let sources = string_list(sources, "sources")?;
            let keys = string_list(keys, "keys")?;
            if entry.get("value").is_some_and(|v| !v.is_null()) {
                return Err("value cannot be combined with sources".to_string());
            }
            if sources.len() != keys.len() {
                return Err(format!(
                    "sources and keys differ in length ({} vs {})",
                    sources.len(),
                    keys.len()
                ));
            }
            return Ok(ColumnEntry::MultiSource {
                name: column_name(entry)?,
                sources,
                keys,
                sql_type: sql_type.to_string(),
            });
        }

        if let (Some(JsonValue::String(source)), Some(sql_type)) = (entry.get("source"), sql_type) {
            return Ok(ColumnEntry::SingleSource {
                name: column_name(entry)?,
                source: source.clone(),
                value: entry.get("value").filter(|v| !v.is_null()).cloned(),
                sql_type: sql_type.to_string(),
            });
        }

        if entry.len() == 1 {
            if let Some((name, JsonValue::String(sql_type))) = entry.iter().next() {
                return Ok(ColumnEntry::Shorthand {
                    name: name.clone(),
                    sql_type: sql_type.clone(),
                });
            }
        }

        if let (Some(value), Some(sql_type)) = (entry.get("value").filter(|v| !v.is_null()), sql_type) {
            return Ok(ColumnEntry::Literal {
                name: column_name(entry)?,
                value: value.clone(),
                sql_type: sql_type.to_string(),
            });
        }

        Err("Invalid ordered hash entry".to_string())
    }
}

fn string_list(items: &[JsonValue], what: &str) -> std::result::Result<Vec<String>, String> {
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("{} must be a list of strings", what))
        })
        .collect()
}

fn column_name(entry: &Map<String, JsonValue>) -> std::result::Result<String, String> {
    let mut names = entry.keys().filter(|k| !RESERVED_KEYS.contains(&k.as_str()));
    match (names.next(), names.next()) {
        (Some(name), None) => Ok(name.clone()),
        (None, _) => Err("missing column name".to_string()),
        (Some(first), Some(second)) => Err(format!(
            "ambiguous column name ({} or {})",
            first, second
        )),
    }
}

impl ColumnSpec {
    /// Normalize one authored column entry.
    pub fn from_entry(namespace: &str, entry: &JsonValue) -> Result<Self> {
        let invalid = |message: String| Error::schema(namespace, format!("{}: {}", message, entry));

        let map = match entry {
            JsonValue::Object(map) => normalize_keys(map),
            _ => return Err(invalid("Invalid ordered hash entry".to_string())),
        };

        let (name, sql_type, source, extraction) = match ColumnEntry::classify(&map).map_err(invalid)? {
            ColumnEntry::MultiSource { name, sources, keys, sql_type } => {
                (name, sql_type, None, Extraction::Multi { sources, keys })
            }
            ColumnEntry::SingleSource { name, source, value, sql_type } => {
                let extraction = match value {
                    Some(value) => Extraction::Literal(value),
                    None => source_extraction(&source)
                        .ok_or_else(|| invalid(format!("Unknown source: {}", source)))?,
                };
                (name, sql_type, Some(source), extraction)
            }
            ColumnEntry::Shorthand { name, sql_type } => {
                let extraction = source_extraction(&name)
                    .ok_or_else(|| invalid(format!("Unknown source: {}", name)))?;
                (name.clone(), sql_type, Some(name), extraction)
            }
            ColumnEntry::Literal { name, value, sql_type } => {
                (name, sql_type, None, Extraction::Literal(value))
            }
        };

        let conversions = match map.get("conversions") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(table)) => Some(table.clone()),
            Some(_) => return Err(invalid("conversions must be a mapping".to_string())),
        };

        let eval = match map.get("eval") {
            None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
            Some(JsonValue::Bool(true)) => Some(ValueTransform::Literal),
            Some(JsonValue::String(func)) => Some(ValueTransform::from_name(func).ok_or_else(|| {
                invalid(format!(
                    "Unknown eval function {:?} (expected one of {})",
                    func,
                    ValueTransform::NAMES.join(", ")
                ))
            })?),
            Some(_) => return Err(invalid("eval must be a boolean or a function name".to_string())),
        };

        let element_type = ARRAY_TYPE_REGEX
            .captures(&sql_type)
            .map(|caps| caps[1].to_string());

        Ok(ColumnSpec {
            name,
            sql_type,
            element_type,
            source,
            extraction,
            default: map.get("default").filter(|v| !v.is_null()).cloned(),
            conversions,
            eval,
        })
    }

    /// Render back to the explicit authored shape. `from_entry` on the result
    /// yields an equal spec.
    pub fn to_entry(&self) -> JsonValue {
        let mut entry = Map::new();
        entry.insert(self.name.clone(), JsonValue::Null);

        match &self.extraction {
            Extraction::Multi { sources, keys } => {
                entry.insert("sources".into(), JsonValue::from(sources.clone()));
                entry.insert("keys".into(), JsonValue::from(keys.clone()));
            }
            Extraction::Literal(value) => {
                if let Some(source) = &self.source {
                    entry.insert("source".into(), JsonValue::String(source.clone()));
                }
                entry.insert("value".into(), value.clone());
            }
            Extraction::Special(_) | Extraction::Path(_) => {
                if let Some(source) = &self.source {
                    entry.insert("source".into(), JsonValue::String(source.clone()));
                }
            }
        }

        entry.insert("type".into(), JsonValue::String(self.sql_type.clone()));
        if let Some(default) = &self.default {
            entry.insert("default".into(), default.clone());
        }
        if let Some(conversions) = &self.conversions {
            entry.insert("conversions".into(), JsonValue::Object(conversions.clone()));
        }
        if let Some(eval) = self.eval {
            entry.insert("eval".into(), JsonValue::String(eval.name().to_string()));
        }

        JsonValue::Object(entry)
    }

    pub fn is_timestamp_source(&self) -> bool {
        matches!(self.extraction, Extraction::Special(SpecialSource::Timestamp))
    }

    /// Whether the column's row value is part of the bulk-load stream.
    /// `$timestamp` columns are left to the store-side default.
    pub fn is_copied(&self) -> bool {
        !self.is_timestamp_source()
    }
}

fn source_extraction(source: &str) -> Option<Extraction> {
    if source.starts_with('$') {
        SpecialSource::parse(source).map(Extraction::Special)
    } else {
        Some(Extraction::Path(source.to_string()))
    }
}

/// Parse a collection's `columns` list.
pub fn parse_columns(namespace: &str, columns: &JsonValue) -> Result<Vec<ColumnSpec>> {
    let entries = columns
        .as_array()
        .ok_or_else(|| Error::schema(namespace, "columns must be a list"))?;

    let columns = entries
        .iter()
        .map(|entry| ColumnSpec::from_entry(namespace, entry))
        .collect::<Result<Vec<_>>>()?;

    check_columns(namespace, &columns)?;
    Ok(columns)
}

/// Ensure every document field is claimed by at most one column.
pub fn check_columns(namespace: &str, columns: &[ColumnSpec]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();

    for col in columns {
        match &col.extraction {
            Extraction::Multi { sources, .. } => {
                let mut claimed = HashSet::new();
                if sources.iter().any(|s| seen.contains(s.as_str()) || !claimed.insert(s.as_str())) {
                    return Err(Error::schema(
                        namespace,
                        format!(
                            "Duplicate sources {} in column definition {}.",
                            sources.join(" - "),
                            col.name
                        ),
                    ));
                }
                seen.extend(sources.iter().map(String::as_str));
            }
            Extraction::Path(_) | Extraction::Special(_) => {
                let source = col.source.as_deref().unwrap_or(col.name.as_str());
                if !seen.insert(source) {
                    return Err(Error::schema(
                        namespace,
                        format!("Duplicate source {} in column definition {}.", source, col.name),
                    ));
                }
            }
            Extraction::Literal(_) => {
                if let Some(source) = &col.source {
                    seen.insert(source.as_str());
                }
            }
        }
    }

    Ok(())
}
