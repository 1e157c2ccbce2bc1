//! Table plans for the external table creator.
//!
//! A plan lists the physical columns and primary key of one mapped
//! collection. Nothing here talks to the store; `create_table_sql` only
//! renders text for callers that want it.

use crate::copy::quote_ident;
use crate::error::Result;
use crate::schema::registry::{CollectionSpec, ExtraPropsType};
use serde::Serialize;

/// Name of the synthetic auto-increment key column.
pub const SYNTHETIC_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedColumn {
    pub name: String,
    pub sql_type: String,
    /// The store fills the column with `now()` when no value is loaded.
    pub default_now: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum PrimaryKey {
    /// Key made of declared columns.
    Columns(Vec<String>),
    /// A synthetic auto-increment `id` column.
    AutoIncrement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub columns: Vec<PlannedColumn>,
    pub primary_key: PrimaryKey,
    pub timestamps: bool,
    pub extra_props: Option<ExtraPropsType>,
}

/// The collaborator that physically creates tables.
pub trait TableCreator {
    /// Create the table, or drop and recreate it when `drop` is set.
    fn create_table(&mut self, plan: &TablePlan, drop: bool) -> Result<()>;
}

impl TablePlan {
    pub fn from_spec(spec: &CollectionSpec) -> Self {
        let meta = &spec.meta;

        let mut columns: Vec<PlannedColumn> = spec
            .columns
            .iter()
            .map(|col| PlannedColumn {
                name: col.name.clone(),
                sql_type: col.sql_type.clone(),
                default_now: col.is_timestamp_source(),
            })
            .collect();

        if meta.timestamps {
            for name in ["created_at", "updated_at"] {
                columns.push(PlannedColumn {
                    name: name.to_string(),
                    sql_type: "TIMESTAMP".to_string(),
                    default_now: false,
                });
            }
        }

        if let Some(extra) = meta.extra_props {
            columns.push(PlannedColumn {
                name: "_extra_props".to_string(),
                sql_type: extra.sql_type().to_string(),
                default_now: false,
            });
        }

        let primary_key = if meta.auto_increment_id_pkey {
            PrimaryKey::AutoIncrement
        } else if let Some(keys) = &meta.composite_key {
            PrimaryKey::Columns(keys.clone())
        } else if let Some(col) = spec.columns.iter().find(|c| c.source.as_deref() == Some("_id")) {
            PrimaryKey::Columns(vec![col.name.clone()])
        } else {
            PrimaryKey::AutoIncrement
        };

        TablePlan {
            table: meta.table.clone(),
            columns,
            primary_key,
            timestamps: meta.timestamps,
            extra_props: meta.extra_props,
        }
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        match &self.primary_key {
            PrimaryKey::Columns(keys) => keys.clone(),
            PrimaryKey::AutoIncrement => vec![SYNTHETIC_KEY.to_string()],
        }
    }

    /// `(name, sql_type)` pairs in table order, without the synthetic key.
    pub fn column_types(&self) -> Vec<(&str, &str)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.sql_type.as_str()))
            .collect()
    }

    /// Render PostgreSQL DDL. With `drop`, the table is dropped first.
    pub fn create_table_sql(&self, drop: bool) -> String {
        let table = quote_ident(&self.table);
        let mut lines = Vec::with_capacity(self.columns.len() + 2);

        if self.primary_key == PrimaryKey::AutoIncrement {
            lines.push(format!("  {} BIGSERIAL", quote_ident(SYNTHETIC_KEY)));
        }
        for col in &self.columns {
            let default = if col.default_now { " DEFAULT now()" } else { "" };
            lines.push(format!("  {} {}{}", quote_ident(&col.name), col.sql_type, default));
        }

        let keys: Vec<String> = self.primary_key_columns().iter().map(|k| quote_ident(k)).collect();
        lines.push(format!("  PRIMARY KEY ({})", keys.join(", ")));

        let mut sql = String::new();
        if drop {
            sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", table));
            sql.push_str(&format!("CREATE TABLE {} (\n", table));
        } else {
            sql.push_str(&format!("CREATE TABLE IF NOT EXISTS {} (\n", table));
        }
        sql.push_str(&lines.join(",\n"));
        sql.push_str("\n);\n");
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry::CollectionSpec;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> CollectionSpec {
        CollectionSpec::parse("db", "coll", &value).unwrap()
    }

    #[test]
    fn test_plan_with_id_source() {
        let plan = spec(json!({
            "meta": {"table": "users"},
            "columns": [{"uid": null, "source": "_id", "type": "TEXT"}, {"age": "INTEGER"}]
        }))
        .plan();

        assert_eq!(plan.table, "users");
        assert_eq!(plan.column_types(), vec![("uid", "TEXT"), ("age", "INTEGER")]);
        assert_eq!(plan.primary_key, PrimaryKey::Columns(vec!["uid".into()]));
    }

    #[test]
    fn test_plan_trailing_columns() {
        let plan = spec(json!({
            "meta": {"table": "t", "timestamps": true, "extra_props": "JSON"},
            "columns": [{"_id": "TEXT"}]
        }))
        .plan();

        assert_eq!(
            plan.column_types(),
            vec![
                ("_id", "TEXT"),
                ("created_at", "TIMESTAMP"),
                ("updated_at", "TIMESTAMP"),
                ("_extra_props", "JSON")
            ]
        );
        assert!(plan.timestamps);
        assert_eq!(plan.extra_props, Some(ExtraPropsType::Json));
    }

    #[test]
    fn test_composite_and_synthetic_keys() {
        let composite = spec(json!({
            "meta": {"table": "t", "composite_key": ["b", "a"]},
            "columns": [{"_id": "TEXT"}, {"a": "TEXT"}, {"b": "TEXT"}]
        }))
        .plan();
        assert_eq!(composite.primary_key_columns(), vec!["b", "a"]);

        let synthetic = spec(json!({"meta": {"table": "t"}, "columns": [{"a": "TEXT"}]})).plan();
        assert_eq!(synthetic.primary_key, PrimaryKey::AutoIncrement);
        assert_eq!(synthetic.primary_key_columns(), vec!["id"]);

        let forced = spec(json!({
            "meta": {"table": "t", "auto_increment_id_pkey": true, "composite_key": ["a"]},
            "columns": [{"_id": "TEXT"}, {"a": "TEXT"}]
        }))
        .plan();
        assert_eq!(forced.primary_key, PrimaryKey::AutoIncrement);
    }

    #[test]
    fn test_timestamp_source_gets_store_default() {
        let plan = spec(json!({
            "meta": {"table": "t"},
            "columns": [{"_id": "TEXT"}, {"seen": null, "source": "$timestamp", "type": "TIMESTAMP"}]
        }))
        .plan();
        assert!(!plan.columns[0].default_now);
        assert!(plan.columns[1].default_now);
    }

    #[test]
    fn test_create_table_sql() {
        let plan = spec(json!({
            "meta": {"table": "t"},
            "columns": [{"a": "TEXT"}, {"seen": null, "source": "$timestamp", "type": "TIMESTAMP"}]
        }))
        .plan();

        assert_eq!(
            plan.create_table_sql(false),
            "CREATE TABLE IF NOT EXISTS \"t\" (\n  \"id\" BIGSERIAL,\n  \"a\" TEXT,\n  \"seen\" TIMESTAMP DEFAULT now(),\n  PRIMARY KEY (\"id\")\n);\n"
        );
        assert!(plan.create_table_sql(true).starts_with("DROP TABLE IF EXISTS \"t\";\nCREATE TABLE \"t\" (\n"));
    }

    #[test]
    fn test_plan_serializes() {
        let plan = spec(json!({"meta": {"table": "t"}, "columns": [{"_id": "TEXT"}]})).plan();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["primary_key"], json!({"kind": "columns", "columns": ["_id"]}));
    }
}
