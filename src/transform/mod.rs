//! Document-to-row transformation
//!
//! Turns one document into the ordered row for its collection's table,
//! following the column specs of a [`CollectionSpec`](crate::schema::CollectionSpec).

pub mod cell;
pub mod path;
pub mod transformer;

pub use cell::{Cell, Row};
pub use path::{array_element, exists_dotted, take_dotted};
pub use transformer::transform_document;
