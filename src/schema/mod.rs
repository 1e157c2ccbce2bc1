//! Declarative collection-to-table mappings
//!
//! This module parses schema definitions into validated column specs,
//! resolves namespaces to them and derives table plans.

pub mod column;
pub mod eval;
pub mod plan;
pub mod registry;

pub use column::{check_columns, parse_columns, ColumnSpec, Extraction, SpecialSource};
pub use eval::ValueTransform;
pub use plan::{PlannedColumn, PrimaryKey, TableCreator, TablePlan};
pub use registry::{CollectionMeta, CollectionSpec, DatabaseSpec, ExtraPropsType, SchemaRegistry};
