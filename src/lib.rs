//! # Smelter - document-to-relational mapping
//!
//! Maps documents from a document database into flat relational rows using a
//! declarative per-collection schema, and streams the rows into PostgreSQL
//! with `COPY ... FROM STDIN`.
//!
//! ## Modules
//!
//! - **schema**: parse and validate schema definitions, resolve namespaces, plan tables
//! - **transform**: turn a document into the ordered row of its table
//! - **copy**: encode rows in COPY text format and drive load sessions
//!
//! ## Quick Start
//!
//! ```rust
//! use smelter::{CopyScriptSink, Document, LoadConfig, SchemaRegistry};
//! use serde_json::json;
//!
//! # fn main() -> smelter::Result<()> {
//! let registry = SchemaRegistry::from_yaml_str(r#"
//! blog:
//!   posts:
//!     meta:
//!       table: blog_posts
//!       extra_props: true
//!     columns:
//!       - _id: TEXT
//!       - author:
//!         source: author.name
//!         type: TEXT
//! "#)?;
//!
//! let doc = Document::from_extended_json(json!({
//!     "_id": "p1",
//!     "author": {"name": "Alice"},
//!     "body": "hello"
//! })).unwrap();
//!
//! let mut sink = CopyScriptSink::new(Vec::new());
//! smelter::load_namespace(&registry, &mut sink, "blog.posts", [&doc], LoadConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod copy;
pub mod document;
pub mod error;
pub mod schema;
pub mod transform;

// Re-export commonly used types for convenience
pub use copy::{BulkLoader, BulkSink, CopyScriptSink, LoadConfig, SinkError};
pub use document::{Document, Value};
pub use error::{Error, Result};
pub use schema::{CollectionSpec, ColumnSpec, SchemaRegistry, TableCreator, TablePlan};
pub use transform::{Cell, Row};

/// Main entry point: transform documents of one namespace and load them in a
/// single session.
///
/// Every document is transformed before the session opens, so a document
/// that fails to transform aborts the batch without touching the sink.
pub fn load_namespace<'a, S, I>(
    registry: &SchemaRegistry,
    sink: &mut S,
    namespace: &str,
    documents: I,
    config: LoadConfig,
) -> Result<u64>
where
    S: BulkSink + ?Sized,
    I: IntoIterator<Item = &'a Document>,
{
    let spec = registry.resolve_namespace_strict(namespace)?;
    let rows = documents
        .into_iter()
        .map(|doc| spec.transform(doc))
        .collect::<Result<Vec<_>>>()?;

    BulkLoader::new(config).load(sink, &spec.meta.table, &spec.copy_columns(), rows)
}
