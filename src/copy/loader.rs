use crate::copy::encoder::{copy_statement, encode_row};
use crate::error::{Error, Result};
use crate::transform::Row;
use std::io::Write;
use thiserror::Error as ThisError;
use tracing::{info, warn};

/// Failure reported by a sink, carrying the store's message as-is.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{0}")]
pub struct SinkError(pub String);

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError(err.to_string())
    }
}

/// The store side of a bulk-load session.
///
/// A sink holds at most one open session. The loader calls `begin_load`,
/// then `stream_bytes` any number of times, then `end_load` and `result`.
pub trait BulkSink {
    fn begin_load(&mut self, table: &str, columns: &[String]) -> std::result::Result<(), SinkError>;

    fn stream_bytes(&mut self, chunk: &[u8]) -> std::result::Result<(), SinkError>;

    fn end_load(&mut self) -> std::result::Result<(), SinkError>;

    /// Outcome of the session once the end of the load has been sent.
    fn result(&mut self) -> std::result::Result<(), SinkError>;

    /// Abandon an open session after a failure. Nothing is committed.
    fn abort_load(&mut self, _reason: &str) {}
}

/// Configuration for bulk loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Encoded bytes buffered before they are handed to the sink
    pub chunk_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            chunk_size: 64 * 1024,
        }
    }
}

/// Drives load sessions: encodes rows and streams them to a sink.
pub struct BulkLoader {
    config: LoadConfig,
}

impl BulkLoader {
    pub fn new(config: LoadConfig) -> Self {
        BulkLoader { config }
    }

    /// Load `rows` into `table` in one session. Either every row is accepted
    /// or the whole batch fails with [`Error::Load`].
    pub fn load<S, I>(&self, sink: &mut S, table: &str, columns: &[String], rows: I) -> Result<u64>
    where
        S: BulkSink + ?Sized,
        I: IntoIterator<Item = Row>,
    {
        self.try_load(sink, table, columns, rows.into_iter().map(Ok::<Row, Error>))
    }

    /// Like [`load`](Self::load), for rows produced while the session is
    /// open. The first `Err` abandons the session and is returned as-is.
    pub fn try_load<S, I, E>(
        &self,
        sink: &mut S,
        table: &str,
        columns: &[String],
        rows: I,
    ) -> std::result::Result<u64, E>
    where
        S: BulkSink + ?Sized,
        I: IntoIterator<Item = std::result::Result<Row, E>>,
        E: From<Error> + std::fmt::Display,
    {
        let fail = |err: SinkError| {
            warn!(target: "smelter::copy", "Load into '{}' failed: {}", table, err);
            E::from(Error::Load {
                table: table.to_string(),
                message: err.0,
            })
        };

        sink.begin_load(table, columns).map_err(fail)?;
        info!(target: "smelter::copy", "{} began", copy_statement(table, columns));

        let mut buffer = String::with_capacity(self.config.chunk_size);
        let mut count = 0u64;

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    let reason = err.to_string();
                    warn!(target: "smelter::copy", "Load into '{}' abandoned: {}", table, reason);
                    sink.abort_load(&reason);
                    return Err(err);
                }
            };
            encode_row(&row, &mut buffer);
            count += 1;
            if buffer.len() >= self.config.chunk_size {
                if let Err(err) = sink.stream_bytes(buffer.as_bytes()) {
                    sink.abort_load(&err.0);
                    return Err(fail(err));
                }
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            if let Err(err) = sink.stream_bytes(buffer.as_bytes()) {
                sink.abort_load(&err.0);
                return Err(fail(err));
            }
        }

        if let Err(err) = sink.end_load().and_then(|()| sink.result()) {
            sink.abort_load(&err.0);
            return Err(fail(err));
        }

        info!(target: "smelter::copy", "Loaded {} rows into '{}'", count, table);
        Ok(count)
    }
}

/// Writes load sessions as a psql-compatible script:
/// the `COPY` statement, the data lines, then the `\.` terminator.
pub struct CopyScriptSink<W: Write> {
    writer: W,
    open_table: Option<String>,
}

impl<W: Write> CopyScriptSink<W> {
    pub fn new(writer: W) -> Self {
        CopyScriptSink {
            writer,
            open_table: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BulkSink for CopyScriptSink<W> {
    fn begin_load(&mut self, table: &str, columns: &[String]) -> std::result::Result<(), SinkError> {
        if let Some(open) = &self.open_table {
            return Err(SinkError(format!(
                "a load session for '{}' is already open",
                open
            )));
        }
        writeln!(self.writer, "{};", copy_statement(table, columns))?;
        self.open_table = Some(table.to_string());
        Ok(())
    }

    fn stream_bytes(&mut self, chunk: &[u8]) -> std::result::Result<(), SinkError> {
        if self.open_table.is_none() {
            return Err(SinkError("no load session is open".to_string()));
        }
        self.writer.write_all(chunk)?;
        Ok(())
    }

    fn end_load(&mut self) -> std::result::Result<(), SinkError> {
        if self.open_table.take().is_none() {
            return Err(SinkError("no load session is open".to_string()));
        }
        self.writer.write_all(b"\\.\n")?;
        Ok(())
    }

    fn result(&mut self) -> std::result::Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn abort_load(&mut self, _reason: &str) {
        self.open_table = None;
    }
}
