//! Per-database, per-collection schema lookup.
//!
//! A schema definition looks like:
//!
//! ```yaml
//! blog:
//!   meta:
//!     alias: ["blog_\\d+"]
//!   posts:
//!     meta:
//!       table: blog_posts
//!       extra_props: JSONB
//!     columns:
//!       - _id: TEXT
//!       - title: TEXT
//! ```
//!
//! The registry is immutable once built, apart from an internal memo of alias
//! lookups, and can be shared between threads.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::schema::column::{normalize_keys, parse_columns, symbol_key, ColumnSpec};
use crate::schema::plan::{TableCreator, TablePlan};
use crate::transform::{self, Row};
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Physical type of the `_extra_props` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtraPropsType {
    Text,
    Json,
    Jsonb,
}

impl ExtraPropsType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ExtraPropsType::Text => "TEXT",
            ExtraPropsType::Json => "JSON",
            ExtraPropsType::Jsonb => "JSONB",
        }
    }

    fn from_meta(value: Option<&JsonValue>) -> Option<Self> {
        match value? {
            JsonValue::Null | JsonValue::Bool(false) => None,
            JsonValue::String(s) if s.eq_ignore_ascii_case("json") => Some(ExtraPropsType::Json),
            JsonValue::String(s) if s.eq_ignore_ascii_case("jsonb") => Some(ExtraPropsType::Jsonb),
            _ => Some(ExtraPropsType::Text),
        }
    }
}

/// Collection-level `meta` block.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMeta {
    pub table: String,
    pub composite_key: Option<Vec<String>>,
    pub timestamps: bool,
    pub extra_props: Option<ExtraPropsType>,
    pub auto_increment_id_pkey: bool,
}

impl CollectionMeta {
    fn parse(namespace: &str, collection: &str, meta: Option<&JsonValue>) -> Result<Self> {
        let meta = match meta {
            None | Some(JsonValue::Null) => Map::new(),
            Some(JsonValue::Object(map)) => normalize_keys(map),
            Some(_) => return Err(Error::schema(namespace, "meta must be a mapping")),
        };

        let table = match meta.get("table") {
            None | Some(JsonValue::Null) => collection.to_string(),
            Some(JsonValue::String(table)) => table.clone(),
            Some(other) => {
                return Err(Error::schema(namespace, format!("Invalid table name {}", other)))
            }
        };

        let composite_key = match meta.get("composite_key") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(key)) => Some(vec![key.clone()]),
            Some(JsonValue::Array(keys)) => Some(
                keys.iter()
                    .map(|k| {
                        k.as_str().map(str::to_string).ok_or_else(|| {
                            Error::schema(namespace, format!("Invalid composite_key entry {}", k))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(Error::schema(namespace, format!("Invalid composite_key {}", other)))
            }
        };

        Ok(CollectionMeta {
            table,
            composite_key,
            timestamps: flag(meta.get("timestamps")),
            extra_props: ExtraPropsType::from_meta(meta.get("extra_props")),
            auto_increment_id_pkey: flag(meta.get("auto_increment_id_pkey")),
        })
    }
}

fn flag(value: Option<&JsonValue>) -> bool {
    matches!(value, Some(v) if !v.is_null() && *v != JsonValue::Bool(false))
}

/// A parsed collection mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    /// `db.collection` as written in the schema definition.
    pub namespace: String,
    pub meta: CollectionMeta,
    pub columns: Vec<ColumnSpec>,
}

impl CollectionSpec {
    pub fn parse(database: &str, collection: &str, spec: &JsonValue) -> Result<Self> {
        let namespace = format!("{}.{}", database, collection);
        let spec = match spec {
            JsonValue::Object(map) => normalize_keys(map),
            _ => return Err(Error::schema(&namespace, "collection spec must be a mapping")),
        };

        let columns = spec
            .get("columns")
            .ok_or_else(|| Error::schema(&namespace, "key not found: columns"))?;

        Ok(CollectionSpec {
            meta: CollectionMeta::parse(&namespace, collection, spec.get("meta"))?,
            columns: parse_columns(&namespace, columns)?,
            namespace,
        })
    }

    /// Names of every value in a transformed row, in row order.
    pub fn all_columns(&self) -> Vec<String> {
        self.column_names(false)
    }

    /// Column names for the load-begin request. `$timestamp` columns are left
    /// out since their row value is dropped from the stream.
    pub fn copy_columns(&self) -> Vec<String> {
        self.column_names(true)
    }

    fn column_names(&self, copy: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .columns
            .iter()
            .filter(|col| !copy || col.is_copied())
            .map(|col| col.name.clone())
            .collect();
        if self.meta.timestamps {
            names.push("created_at".to_string());
            names.push("updated_at".to_string());
        }
        if self.meta.extra_props.is_some() {
            names.push("_extra_props".to_string());
        }
        names
    }

    pub fn plan(&self) -> TablePlan {
        TablePlan::from_spec(self)
    }

    pub fn transform(&self, document: &Document) -> Result<Row> {
        transform::transform_document(self, document)
    }
}

/// Everything registered under one source database.
#[derive(Debug)]
pub struct DatabaseSpec {
    pub name: String,
    pub aliases: Vec<Regex>,
    pub collections: BTreeMap<String, CollectionSpec>,
}

impl DatabaseSpec {
    fn parse(name: &str, spec: &JsonValue) -> Result<Self> {
        let spec = spec
            .as_object()
            .ok_or_else(|| Error::schema(name, "database spec must be a mapping"))?;

        let mut aliases = Vec::new();
        let mut collections = BTreeMap::new();

        for (key, value) in spec {
            if symbol_key(key) == "meta" {
                aliases = parse_aliases(name, value)?;
                continue;
            }
            collections.insert(key.clone(), CollectionSpec::parse(name, key, value)?);
        }

        Ok(DatabaseSpec {
            name: name.to_string(),
            aliases,
            collections,
        })
    }

    fn matches_alias(&self, database: &str) -> bool {
        self.aliases.iter().any(|alias| alias.is_match(database))
    }
}

fn parse_aliases(database: &str, meta: &JsonValue) -> Result<Vec<Regex>> {
    let alias = match meta {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Object(map) => normalize_keys(map).remove("alias"),
        _ => return Err(Error::schema(database, "meta must be a mapping")),
    };

    let patterns = match alias {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items,
        Some(scalar) => vec![scalar],
    };

    patterns
        .iter()
        .map(|pattern| {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| Error::schema(database, format!("Invalid alias {}", pattern)))?;
            Regex::new(pattern).map_err(|e| {
                Error::schema(database, format!("Invalid alias pattern {:?}: {}", pattern, e))
            })
        })
        .collect()
}

/// Resolves namespaces to collection specs.
#[derive(Debug)]
pub struct SchemaRegistry {
    databases: Vec<DatabaseSpec>,
    by_name: HashMap<String, usize>,
    /// Alias resolutions, including misses.
    alias_memo: RwLock<HashMap<String, Option<usize>>>,
}

impl SchemaRegistry {
    /// Build from a parsed declarative definition.
    pub fn from_value(definition: &JsonValue) -> Result<Self> {
        let map = definition
            .as_object()
            .ok_or_else(|| Error::schema("<root>", "schema definition must be a mapping"))?;

        let mut databases = Vec::with_capacity(map.len());
        let mut by_name = HashMap::with_capacity(map.len());
        for (name, spec) in map {
            by_name.insert(name.clone(), databases.len());
            databases.push(DatabaseSpec::parse(name, spec)?);
        }

        Ok(SchemaRegistry {
            databases,
            by_name,
            alias_memo: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let definition: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(&definition)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: JsonValue = serde_json::from_str(json)?;
        Self::from_value(&definition)
    }

    /// Find the database spec for `name`, directly or by alias. The first
    /// database whose alias matches wins; the outcome is memoized.
    pub fn resolve_database(&self, name: &str) -> Option<&DatabaseSpec> {
        if let Some(&idx) = self.by_name.get(name) {
            return Some(&self.databases[idx]);
        }

        if let Some(memo) = self.alias_memo.read().get(name) {
            return memo.map(|idx| &self.databases[idx]);
        }

        let found = self.databases.iter().position(|db| db.matches_alias(name));
        self.alias_memo.write().insert(name.to_string(), found);
        found.map(|idx| &self.databases[idx])
    }

    /// Look up `db.collection`. An unmapped namespace is `None`, not an error.
    pub fn resolve_namespace(&self, namespace: &str) -> Option<&CollectionSpec> {
        let (db, collection) = namespace.split_once('.').unwrap_or((namespace, ""));
        let spec = self.resolve_database(db)?;
        let collection = spec.collections.get(collection);
        if collection.is_none() {
            debug!(target: "smelter::schema", "No mapping for ns: {}", namespace);
        }
        collection
    }

    /// Like [`resolve_namespace`](Self::resolve_namespace), but a missing
    /// mapping is an error.
    pub fn resolve_namespace_strict(&self, namespace: &str) -> Result<&CollectionSpec> {
        self.resolve_namespace(namespace).ok_or_else(|| Error::NoMapping {
            namespace: namespace.to_string(),
        })
    }

    pub fn transform(&self, namespace: &str, document: &Document) -> Result<Row> {
        self.resolve_namespace_strict(namespace)?.transform(document)
    }

    pub fn table_for_ns(&self, namespace: &str) -> Result<&str> {
        Ok(&self.resolve_namespace_strict(namespace)?.meta.table)
    }

    pub fn primary_key_for_ns(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self.resolve_namespace_strict(namespace)?.plan().primary_key_columns())
    }

    /// Registered database names, in definition order.
    pub fn databases(&self) -> Vec<&str> {
        self.databases.iter().map(|db| db.name.as_str()).collect()
    }

    /// Collection names of a database (directly registered names only).
    pub fn collections(&self, database: &str) -> Vec<&str> {
        self.by_name
            .get(database)
            .map(|&idx| self.databases[idx].collections.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every collection spec, database by database.
    pub fn collection_specs(&self) -> impl Iterator<Item = &CollectionSpec> {
        self.databases.iter().flat_map(|db| db.collections.values())
    }

    /// Plans for every mapped table.
    pub fn plans(&self) -> Vec<TablePlan> {
        self.collection_specs().map(CollectionSpec::plan).collect()
    }

    /// Hand every table plan to the external table creator, once per collection.
    pub fn create_schema<C: TableCreator + ?Sized>(&self, creator: &mut C, drop_tables: bool) -> Result<()> {
        for plan in self.plans() {
            if drop_tables {
                info!(target: "smelter::schema", "Dropping and creating table '{}'...", plan.table);
            }
            creator.create_table(&plan, drop_tables)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_MAP: &str = r#"
db:
  collection:
    :meta:
      :table: sqltable
    :columns:
      - _id: TEXT
      - var: INTEGER
      - arry: INTEGER ARRAY
  with_extra_props:
    meta:
      table: sqltable2
      extra_props: true
    columns:
      - _id: TEXT
  with_composite:
    meta:
      table: sqltable3
      composite_key: [a, b]
      timestamps: true
      extra_props: JSONB
    columns:
      - a: TEXT
      - b: TEXT
      - made:
        source: $timestamp
        type: TIMESTAMP
other:
  meta:
    alias: "other_\\d+"
  things:
    columns:
      - thing: TEXT
"#;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_yaml_str(TEST_MAP).unwrap()
    }

    #[test]
    fn test_parses_yaml_definition() {
        let reg = registry();
        assert_eq!(reg.databases(), vec!["db", "other"]);
        assert_eq!(reg.collections("db"), vec!["collection", "with_composite", "with_extra_props"]);

        let spec = reg.resolve_namespace("db.collection").unwrap();
        assert_eq!(spec.meta.table, "sqltable");
        assert_eq!(spec.columns.len(), 3);
        assert_eq!(spec.columns[2].element_type.as_deref(), Some("INTEGER"));
    }

    #[test]
    fn test_meta_flags() {
        let reg = registry();
        let spec = reg.resolve_namespace("db.with_extra_props").unwrap();
        assert_eq!(spec.meta.extra_props, Some(ExtraPropsType::Text));
        assert!(!spec.meta.timestamps);

        let spec = reg.resolve_namespace("db.with_composite").unwrap();
        assert_eq!(spec.meta.extra_props, Some(ExtraPropsType::Jsonb));
        assert_eq!(spec.meta.composite_key, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(spec.meta.timestamps);

        // Missing table name falls back to the collection name.
        assert_eq!(reg.table_for_ns("other.things").unwrap(), "things");
    }

    #[test]
    fn test_column_lists() {
        let reg = registry();
        let spec = reg.resolve_namespace("db.with_composite").unwrap();
        assert_eq!(
            spec.all_columns(),
            vec!["a", "b", "made", "created_at", "updated_at", "_extra_props"]
        );
        assert_eq!(
            spec.copy_columns(),
            vec!["a", "b", "created_at", "updated_at", "_extra_props"]
        );
    }

    #[test]
    fn test_unmapped_namespaces() {
        let reg = registry();
        assert!(reg.resolve_namespace("db.nope").is_none());
        assert!(reg.resolve_namespace("nope.collection").is_none());
        assert!(reg.resolve_namespace("db").is_none());

        let err = reg.resolve_namespace_strict("db.nope").unwrap_err();
        assert!(matches!(err, Error::NoMapping { ref namespace } if namespace == "db.nope"));
        assert!(reg.table_for_ns("db.nope").is_err());
    }

    #[test]
    fn test_alias_resolution_is_memoized() {
        let reg = registry();
        assert_eq!(reg.resolve_database("other_12").unwrap().name, "other");
        assert!(reg.alias_memo.read().contains_key("other_12"));
        assert_eq!(reg.resolve_database("other_12").unwrap().name, "other");
        assert!(reg.resolve_namespace("other_7.things").is_some());

        assert!(reg.resolve_database("unrelated").is_none());
        assert_eq!(reg.alias_memo.read().get("unrelated"), Some(&None));
        assert!(reg.resolve_database("unrelated").is_none());
    }

    #[test]
    fn test_first_alias_match_wins() {
        let reg = SchemaRegistry::from_value(&json!({
            "first": {"meta": {"alias": ["^shard"]}, "c": {"columns": [{"a": "TEXT"}]}},
            "second": {"meta": {"alias": ["^shard_\\d+$"]}, "c": {"columns": [{"b": "TEXT"}]}}
        }))
        .unwrap();
        assert_eq!(reg.resolve_database("shard_1").unwrap().name, "first");
    }

    #[test]
    fn test_invalid_alias_pattern_is_rejected() {
        let err = SchemaRegistry::from_value(&json!({
            "db": {"meta": {"alias": "("}, "c": {"columns": [{"a": "TEXT"}]}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Invalid alias pattern"));
    }

    #[test]
    fn test_validation_errors_name_the_namespace() {
        let err = SchemaRegistry::from_value(&json!({
            "db": {"coll": {"columns": [
                {"var_a": null, "source": "vars.a", "type": "TEXT"},
                {"var_b": null, "source": "vars.a", "type": "TEXT"}
            ]}}
        }))
        .unwrap_err();
        assert!(err.to_string().starts_with("In spec for db.coll:"));

        let err = SchemaRegistry::from_value(&json!({"db": {"coll": {"meta": {}}}})).unwrap_err();
        assert!(err.to_string().contains("db.coll"));
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn test_primary_keys() {
        let reg = registry();
        assert_eq!(reg.primary_key_for_ns("db.collection").unwrap(), vec!["_id"]);
        assert_eq!(reg.primary_key_for_ns("db.with_composite").unwrap(), vec!["a", "b"]);
        assert_eq!(reg.primary_key_for_ns("other.things").unwrap(), vec!["id"]);
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<SchemaRegistry>();
    }
}
