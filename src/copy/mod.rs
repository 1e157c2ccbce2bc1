//! Bulk loading through the store's `COPY ... FROM STDIN` protocol
//!
//! Rows are encoded in COPY text format and streamed to a [`BulkSink`] in
//! chunks. A load session either succeeds as a whole or fails as a whole.

pub mod encoder;
pub mod loader;

pub use encoder::{copy_statement, encode_row, escape_copy_text, quote_copy, quote_ident};
pub use loader::{BulkLoader, BulkSink, CopyScriptSink, LoadConfig, SinkError};
