//! smelter-load: Transform documents of one namespace into a COPY script
//!
//! Reads newline-delimited Extended JSON documents, maps each one to a row of
//! the namespace's table and writes a psql-compatible `COPY ... FROM STDIN`
//! script.
//!
//! Usage:
//!   # Read from file, write the script to stdout
//!   smelter-load --schema collections.yml --ns blog.posts posts.jsonl
//!
//!   # Read from stdin and pipe straight into psql
//!   mongoexport -c posts | smelter-load --schema collections.yml --ns blog.posts | psql
//!
//!   # Skip documents that fail to transform instead of aborting
//!   smelter-load --schema collections.yml --ns blog.posts posts.jsonl --skip-errors -o posts.sql

use anyhow::{bail, Context, Result};
use clap::Parser;
use smelter::{BulkLoader, CopyScriptSink, Document, LoadConfig, SchemaRegistry};
use std::fs::{self, File};
use std::io::{stdin, stdout, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "smelter-load")]
#[command(about = "Transform documents into a PostgreSQL COPY script", long_about = None)]
struct Args {
    /// Input file of newline-delimited documents (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Schema definition (YAML, or JSON when the extension is .json)
    #[arg(short, long, value_name = "SCHEMA")]
    schema: PathBuf,

    /// Namespace the documents belong to (db.collection)
    #[arg(long, value_name = "NS")]
    ns: String,

    /// Output file (use stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log and skip documents that fail to transform
    #[arg(long)]
    skip_errors: bool,

    /// Bytes buffered before each write to the output
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.chunk_size == 0 {
        bail!("--chunk-size must be greater than zero");
    }

    let registry = load_registry(&args.schema)?;
    let spec = registry.resolve_namespace_strict(&args.ns)?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(stdin())),
    };

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(stdout().lock())),
    };

    let mut skipped = 0usize;

    // Rows are transformed while the session is open; a failing line
    // abandons it.
    let rows = reader.lines().enumerate().filter_map(|(index, line)| {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => return Some(Err(anyhow::Error::new(err))),
        };
        if line.trim().is_empty() {
            return None;
        }

        let document = match parse_document(line.into_bytes()) {
            Ok(document) => document,
            Err(err) => return Some(Err(err.context(format!("Line {}: invalid document", line_no)))),
        };

        match spec.transform(&document) {
            Ok(row) => Some(Ok(row)),
            Err(err) if args.skip_errors && err.is_per_document() => {
                warn!("Line {}: skipping document: {}", line_no, err);
                skipped += 1;
                None
            }
            Err(err) => Some(Err(anyhow::Error::new(err).context(format!("Line {}", line_no)))),
        }
    });

    let mut sink = CopyScriptSink::new(writer);
    let loader = BulkLoader::new(LoadConfig {
        chunk_size: args.chunk_size,
    });
    let count = loader.try_load(&mut sink, &spec.meta.table, &spec.copy_columns(), rows)?;

    info!(
        "Wrote {} rows for {} into '{}' ({} skipped)",
        count, args.ns, spec.meta.table, skipped
    );
    Ok(())
}

/// Parse one line of Extended JSON into a document.
fn parse_document(mut bytes: Vec<u8>) -> Result<Document> {
    let value: serde_json::Value = simd_json::serde::from_slice(&mut bytes)?;
    match Document::from_extended_json(value) {
        Some(document) => Ok(document),
        None => bail!("expected a JSON object"),
    }
}

fn load_registry(path: &Path) -> Result<SchemaRegistry> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema definition {}", path.display()))?;

    let registry = if path.extension().is_some_and(|ext| ext == "json") {
        SchemaRegistry::from_json_str(&text)?
    } else {
        SchemaRegistry::from_yaml_str(&text)?
    };
    Ok(registry)
}
