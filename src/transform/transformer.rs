use crate::document::{Document, Value};
use crate::error::{Error, Result};
use crate::schema::column::{ColumnSpec, Extraction, SpecialSource};
use crate::schema::registry::CollectionSpec;
use crate::transform::cell::{Cell, Row};
use crate::transform::path::{array_element, exists_dotted, take_dotted};
use chrono::Utc;
use serde_json::Map;
use tracing::debug;

/// Produce the row for `document` according to `spec`.
///
/// Columns are evaluated in declaration order against a working copy of the
/// document; each path column consumes its field, and whatever is left at the
/// end becomes `_extra_props`. Special sources read the untouched original.
pub fn transform_document(spec: &CollectionSpec, document: &Document) -> Result<Row> {
    let mut working = document.clone();
    let mut row = Row::with_capacity(spec.columns.len() + 3);

    for col in &spec.columns {
        let cell = extract(col, &mut working, document)?;
        let cell = convert(col, cell);
        row.push(apply_default(col, cell));
    }

    if spec.meta.timestamps {
        let now = Utc::now();
        row.push(Cell::Timestamp(now));
        row.push(Cell::Timestamp(now));
    }

    if spec.meta.extra_props.is_some() {
        row.push(Cell::Text(working.to_json().to_string()));
    }

    debug!(target: "smelter::transform", "Transformed {}: {:?}", spec.namespace, row);
    Ok(row)
}

fn extract(col: &ColumnSpec, working: &mut Document, original: &Document) -> Result<Cell> {
    match &col.extraction {
        Extraction::Literal(value) => Ok(Cell::from_literal(value, col.element_type.as_deref())),
        Extraction::Multi { sources, keys } => Ok(Cell::Text(take_multiple(working, sources, keys))),
        Extraction::Special(special) => Ok(special_source(col, special, original)),
        Extraction::Path(path) => {
            let value = match (take_dotted(working, path), col.eval) {
                (Some(value), Some(func)) if value.is_truthy() => func
                    .apply(value)
                    .map_err(|message| Error::transform(&col.name, message))?,
                (Some(value), _) => value,
                (None, _) => return Ok(Cell::Null),
            };
            Ok(classify(col, value))
        }
    }
}

/// Build a JSON object from several top-level fields, consuming them.
fn take_multiple(working: &mut Document, sources: &[String], keys: &[String]) -> String {
    let mut object = Map::with_capacity(sources.len());
    for (source, key) in sources.iter().zip(keys) {
        match working.remove(source) {
            Some(value) if !value.is_null() => {
                object.insert(key.clone(), value.to_json());
            }
            _ => {}
        }
    }
    serde_json::Value::Object(object).to_string()
}

fn special_source(col: &ColumnSpec, special: &SpecialSource, original: &Document) -> Cell {
    match special {
        SpecialSource::Timestamp => Cell::StoreNow,
        SpecialSource::Exists(path) => Cell::Bool(exists_dotted(original, path)),
        SpecialSource::Elem { field, index } => match array_element(original, field, *index) {
            Some(Value::Document(doc)) => Cell::Text(doc.to_json().to_string()),
            Some(element) => Cell::from_primitive(element.clone(), Some(col.sql_type.as_str())),
            None => Cell::Null,
        },
    }
}

fn classify(col: &ColumnSpec, value: Value) -> Cell {
    match value {
        Value::Document(doc) => Cell::Text(doc.to_json().to_string()),
        Value::Array(items) => {
            if let Some(element_type) = &col.element_type {
                Cell::Array {
                    element_type: element_type.clone(),
                    items: items
                        .into_iter()
                        .map(|item| Cell::from_primitive(item, Some(element_type.as_str())))
                        .collect(),
                }
            } else if col.sql_type.eq_ignore_ascii_case("bit varying") {
                Cell::Text(items.iter().map(|b| if b.is_truthy() { '1' } else { '0' }).collect())
            } else {
                Cell::Text(Value::Array(items).to_json().to_string())
            }
        }
        other => Cell::from_primitive(other, Some(col.sql_type.as_str())),
    }
}

/// A hit in the conversion table replaces the value; a miss or a `null`
/// replacement keeps it.
fn convert(col: &ColumnSpec, cell: Cell) -> Cell {
    let Some(table) = &col.conversions else {
        return cell;
    };
    match cell.conversion_key().and_then(|key| table.get(&key)) {
        Some(replacement) if !replacement.is_null() => {
            Cell::from_literal(replacement, col.element_type.as_deref())
        }
        _ => cell,
    }
}

fn apply_default(col: &ColumnSpec, cell: Cell) -> Cell {
    match &col.default {
        Some(default) if cell.is_null() => Cell::from_literal(default, col.element_type.as_deref()),
        _ => cell,
    }
}
