//! PostgreSQL `COPY ... FROM STDIN` text-format encoding.

use crate::transform::cell::Cell;

/// Timestamp layout accepted for `timestamptz` input, microsecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f %z";

/// Encode one cell as a COPY field. `None` means the cell has no textual form
/// and the field is left out of the row entirely.
pub fn quote_copy(cell: &Cell) -> Option<String> {
    let field = match cell {
        Cell::Null => "\\N".to_string(),
        Cell::Bool(b) => bool_text(*b).to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => float_text(*f),
        Cell::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        // `\\x` is unescaped by COPY to the bytea hex prefix `\x`.
        Cell::Blob(bytes) => format!("\\\\x{}", hex::encode(bytes)),
        Cell::Text(s) => escape_copy_text(s),
        Cell::Array { .. } => escape_copy_text(&array_literal(cell)),
        Cell::StoreNow => return None,
    };
    Some(field)
}

/// Append one encoded row, tab separated and newline terminated.
pub fn encode_row(row: &[Cell], out: &mut String) {
    let mut first = true;
    for field in row.iter().filter_map(quote_copy) {
        if !first {
            out.push('\t');
        }
        out.push_str(&field);
        first = false;
    }
    out.push('\n');
}

/// Backslash-escape the characters that are significant in COPY text format.
pub fn escape_copy_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The statement that opens a load session for `table`.
pub fn copy_statement(table: &str, columns: &[String]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("COPY {} ({}) FROM STDIN", quote_ident(table), columns.join(", "))
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "f"
    }
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        f.to_string()
    }
}

/// Array input syntax (`{1,2,"a b",NULL}`), before COPY escaping.
fn array_literal(cell: &Cell) -> String {
    let Cell::Array { items, .. } = cell else {
        return String::new();
    };
    let elements: Vec<String> = items.iter().map(array_element).collect();
    format!("{{{}}}", elements.join(","))
}

fn array_element(cell: &Cell) -> String {
    match cell {
        Cell::Null | Cell::StoreNow => "NULL".to_string(),
        Cell::Bool(b) => bool_text(*b).to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => float_text(*f),
        Cell::Array { .. } => array_literal(cell),
        Cell::Text(s) => quote_array_string(s),
        Cell::Timestamp(ts) => quote_array_string(&ts.format(TIMESTAMP_FORMAT).to_string()),
        Cell::Blob(bytes) => quote_array_string(&format!("\\x{}", hex::encode(bytes))),
    }
}

fn quote_array_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
