//! Schema metadata types for tables, columns, indexes, and constraints.
//!
//! These types provide a database-agnostic description of one logical schema.
//! Adapters populate them during introspection; the diff engine and the SQL
//! generators treat them as immutable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind of relation reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Table,
    View,
    Unknown,
}

impl TableKind {
    /// Map a raw `information_schema.tables.table_type` value.
    ///
    /// Unknown kinds are discarded during introspection.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "BASE TABLE" | "TABLE" => TableKind::Table,
            "VIEW" | "MATERIALIZED VIEW" => TableKind::View,
            _ => TableKind::Unknown,
        }
    }
}

/// All tables and views of one logical schema, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: HashMap<String, Table>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

/// Table (or view) metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Relation kind.
    pub kind: TableKind,

    /// Owning schema name (MySQL: the database name).
    pub schema: String,

    /// Table comment; empty when absent.
    pub comment: String,

    /// Column definitions keyed by column name.
    pub columns: HashMap<String, Column>,

    /// Secondary indexes keyed by index name.
    pub indexes: HashMap<String, Index>,

    /// Primary key, when one exists.
    pub primary_key: Option<PrimaryKey>,

    /// Foreign keys keyed by constraint name.
    pub foreign_keys: HashMap<String, ForeignKey>,

    /// View definition, populated only when `kind` is `View`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewDefinition>,
}

impl Table {
    /// Create an empty table shell for an adapter to fill in.
    pub fn new(name: impl Into<String>, kind: TableKind, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            schema: schema.into(),
            comment: String::new(),
            columns: HashMap::new(),
            indexes: HashMap::new(),
            primary_key: None,
            foreign_keys: HashMap::new(),
            view: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns sorted by ordinal position.
    ///
    /// Position order is the canonical column order for generated DDL and
    /// INSERT/UPDATE column lists.
    pub fn columns_by_position(&self) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self.columns.values().collect();
        cols.sort_by_key(|c| c.position);
        cols
    }

    /// Column names in ordinal position order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns_by_position()
            .into_iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Primary key column names; empty when the table has no primary key.
    pub fn primary_key_columns(&self) -> &[String] {
        match &self.primary_key {
            Some(pk) => &pk.columns,
            None => &[],
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Raw source-engine data type (e.g. "varchar", "character varying").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Default literal, verbatim from the catalog.
    pub default: Option<String>,

    /// Extra modifier string (e.g. "auto_increment", "unsigned").
    pub extra: String,

    /// Column comment.
    pub comment: Option<String>,

    /// Maximum length for character/binary types.
    pub char_max_len: Option<i64>,

    /// Numeric precision.
    pub numeric_precision: Option<i64>,

    /// Numeric scale.
    pub numeric_scale: Option<i64>,

    /// Ordinal position, 1-based.
    pub position: i32,
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub unique: bool,

    /// Whether the catalog reports this index as backing the primary key.
    pub primary: bool,

    /// Access method (btree, hash, gin, gist, ...).
    pub method: String,

    /// Partial-index predicate (PostgreSQL).
    pub where_clause: Option<String>,

    /// Expression-index expression.
    pub expression: Option<String>,
}

/// Primary key metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name.
    pub name: String,

    /// Key column names, in key order. These drive the data-diff ordering.
    pub columns: Vec<String>,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Local column names.
    pub columns: Vec<String>,

    /// Referenced schema name.
    pub referenced_schema: String,

    /// Referenced table name.
    pub referenced_table: String,

    /// Referenced column names, parallel to `columns`.
    pub referenced_columns: Vec<String>,

    /// ON DELETE action (CASCADE, RESTRICT, SET NULL, ...).
    pub on_delete: String,

    /// ON UPDATE action.
    pub on_update: String,
}

/// View definition metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// The SELECT statement that defines the view.
    pub select_statement: String,

    /// Tables or views this view depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Whether the view is updatable.
    #[serde(default)]
    pub is_updatable: bool,

    /// Security mode (DEFINER/INVOKER).
    #[serde(default)]
    pub security_type: String,

    /// View definer.
    #[serde(default)]
    pub definer: String,

    /// Check option: NONE, LOCAL, CASCADED, or empty when unknown.
    #[serde(default)]
    pub check_option: String,

    /// View comment.
    #[serde(default)]
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_at(name: &str, position: i32) -> Column {
        Column {
            name: name.to_string(),
            data_type: "int".to_string(),
            nullable: true,
            default: None,
            extra: String::new(),
            comment: None,
            char_max_len: None,
            numeric_precision: None,
            numeric_scale: None,
            position,
        }
    }

    #[test]
    fn test_table_kind_parse() {
        assert_eq!(TableKind::parse("BASE TABLE"), TableKind::Table);
        assert_eq!(TableKind::parse("TABLE"), TableKind::Table);
        assert_eq!(TableKind::parse("VIEW"), TableKind::View);
        assert_eq!(TableKind::parse("MATERIALIZED VIEW"), TableKind::View);
        assert_eq!(TableKind::parse("SYSTEM VIEW"), TableKind::Unknown);
        assert_eq!(TableKind::parse(""), TableKind::Unknown);
    }

    #[test]
    fn test_columns_by_position() {
        let mut table = Table::new("t", TableKind::Table, "public");
        table.columns.insert("c".into(), column_at("c", 3));
        table.columns.insert("a".into(), column_at("a", 1));
        table.columns.insert("b".into(), column_at("b", 2));

        let names = table.column_names();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_primary_key_columns_cover_columns() {
        let mut table = Table::new("t", TableKind::Table, "public");
        table.columns.insert("id".into(), column_at("id", 1));
        table.columns.insert("sub".into(), column_at("sub", 2));
        table.primary_key = Some(PrimaryKey {
            name: "t_pkey".to_string(),
            columns: vec!["id".to_string(), "sub".to_string()],
        });

        for pk_col in table.primary_key_columns() {
            assert!(table.column(pk_col).is_some());
        }
    }

    #[test]
    fn test_primary_key_columns_empty_without_pk() {
        let table = Table::new("t", TableKind::Table, "public");
        assert!(table.primary_key_columns().is_empty());
    }
}
