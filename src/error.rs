//! Error types shared by schema parsing, transformation and bulk loading.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid schema definition. Raised at startup, never per document.
    #[error("In spec for {namespace}: {message}")]
    Schema { namespace: String, message: String },

    /// A namespace was required to have a mapping but none exists.
    #[error("No mapping for namespace: {namespace}")]
    NoMapping { namespace: String },

    /// A single document could not be transformed.
    #[error("Failed to transform column {column}: {message}")]
    Transform { column: String, message: String },

    /// The sink rejected the load session. The message is the sink's own.
    #[error("{message}")]
    Load { table: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transform(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transform {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Whether the error only concerns the current document, so a caller may
    /// skip it and keep going.
    pub fn is_per_document(&self) -> bool {
        matches!(self, Error::Transform { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_displays_sink_message_verbatim() {
        let err = Error::Load {
            table: "users".to_string(),
            message: "ERROR:  duplicate key value violates unique constraint".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR:  duplicate key value violates unique constraint"
        );
    }

    #[test]
    fn test_schema_error_names_namespace() {
        let err = Error::schema("db.users", "Duplicate source name in column definition name");
        assert!(err.to_string().contains("db.users"));
        assert!(!err.is_per_document());
        assert!(Error::transform("age", "bad").is_per_document());
    }
}
