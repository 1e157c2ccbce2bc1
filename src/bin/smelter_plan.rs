//! smelter-plan: Print the DDL for every table a schema definition maps to
//!
//! Usage:
//!   # CREATE TABLE statements for every mapped collection
//!   smelter-plan collections.yml
//!
//!   # Drop and recreate, one namespace only
//!   smelter-plan collections.yml --drop --ns blog.posts
//!
//!   # Table plans as JSON
//!   smelter-plan collections.yml --json

use anyhow::{Context, Result};
use clap::Parser;
use smelter::{SchemaRegistry, TableCreator, TablePlan};
use std::fs;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "smelter-plan")]
#[command(about = "Print the tables a schema definition maps documents into", long_about = None)]
struct Args {
    /// Schema definition (YAML, or JSON when the extension is .json)
    #[arg(value_name = "SCHEMA")]
    schema: PathBuf,

    /// Emit DROP TABLE IF EXISTS before each CREATE TABLE
    #[arg(long)]
    drop: bool,

    /// Only plan this namespace (db.collection)
    #[arg(long, value_name = "NS")]
    ns: Option<String>,

    /// Print table plans as JSON instead of SQL
    #[arg(long)]
    json: bool,
}

/// Writes each table plan as SQL statements.
struct SqlWriter<W: Write> {
    out: W,
}

impl<W: Write> TableCreator for SqlWriter<W> {
    fn create_table(&mut self, plan: &TablePlan, drop: bool) -> smelter::Result<()> {
        writeln!(self.out, "{}", plan.create_table_sql(drop))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = load_registry(&args.schema)?;

    let plans = match &args.ns {
        Some(ns) => vec![registry.resolve_namespace_strict(ns)?.plan()],
        None => registry.plans(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    let mut writer = SqlWriter { out: stdout().lock() };
    match &args.ns {
        Some(_) => {
            for plan in &plans {
                writer.create_table(plan, args.drop)?;
            }
        }
        None => registry.create_schema(&mut writer, args.drop)?,
    }

    Ok(())
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
