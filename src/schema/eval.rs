//! Named value transforms selectable with a column's `eval` key.
//!
//! Only the functions listed in [`ValueTransform`] exist; there is no general
//! expression evaluation. `eval: true` selects [`ValueTransform::Literal`].

use crate::document::Value;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    /// Parse a string holding a JSON literal (`"[1, 2]"`, `"{\"a\": 1}"`, `"42"`).
    Literal,
    Integer,
    Float,
    Boolean,
    Downcase,
    Upcase,
    Trim,
}

impl ValueTransform {
    pub const NAMES: &'static [&'static str] = &[
        "literal", "json", "integer", "float", "boolean", "downcase", "upcase", "trim",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "literal" | "json" => ValueTransform::Literal,
            "integer" => ValueTransform::Integer,
            "float" => ValueTransform::Float,
            "boolean" => ValueTransform::Boolean,
            "downcase" => ValueTransform::Downcase,
            "upcase" => ValueTransform::Upcase,
            "trim" => ValueTransform::Trim,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueTransform::Literal => "literal",
            ValueTransform::Integer => "integer",
            ValueTransform::Float => "float",
            ValueTransform::Boolean => "boolean",
            ValueTransform::Downcase => "downcase",
            ValueTransform::Upcase => "upcase",
            ValueTransform::Trim => "trim",
        }
    }

    /// Apply to an extracted value. Values the function is not defined on pass
    /// through unchanged; a string that fails to parse is an error.
    pub fn apply(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (ValueTransform::Literal, Value::String(s)) => serde_json::from_str::<JsonValue>(&s)
                .map(Value::from_extended_json)
                .map_err(|e| format!("cannot parse {:?} as a literal: {}", s, e)),

            (ValueTransform::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("cannot parse {:?} as an integer: {}", s, e)),
            (ValueTransform::Integer, Value::Float(f)) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),

            (ValueTransform::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| format!("cannot parse {:?} as a float: {}", s, e)),
            (ValueTransform::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),

            (ValueTransform::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "f" | "0" | "no" => Ok(Value::Bool(false)),
                    _ => Err(format!("cannot parse {:?} as a boolean", s)),
                }
            }
            (ValueTransform::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),

            (ValueTransform::Downcase, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
            (ValueTransform::Upcase, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
            (ValueTransform::Trim, Value::String(s)) => Ok(Value::String(s.trim().to_string())),

            (_, other) => Ok(other),
        }
    }
}
