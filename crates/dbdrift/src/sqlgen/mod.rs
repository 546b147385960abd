//! Dialect-specific SQL generation.
//!
//! One generator per target dialect renders table/view DDL, per-operation
//! alterations, and row-level DML from the neutral model. Generation never
//! fails; inputs a dialect cannot express render as empty strings, which the
//! orchestration drops.

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use crate::config::DbType;
use crate::core::schema::{Column, Index, PrimaryKey, Table, TableKind};
use crate::core::value::Record;
use crate::diff::{SchemaDiff, TableDiff};

/// SQL rendering capability set, one implementation per dialect.
pub trait SqlDialect {
    /// INSERT for one row, columns in ordinal position order.
    fn generate_insert_sql(&self, table: &Table, row: &Record) -> String;

    /// DELETE matching the row's primary key; NULL key parts render `IS NULL`.
    fn generate_delete_sql(&self, table: &Table, row: &Record) -> String;

    /// UPDATE of `update_cols` (all columns when empty), excluding primary key
    /// columns from the SET clause; WHERE matches the primary key.
    fn generate_update_sql(&self, table: &Table, row: &Record, update_cols: &[String]) -> String;

    fn generate_create_index_sql(&self, table: &Table, idx: &Index) -> String;

    fn generate_drop_index_sql(&self, table: &Table, idx: &Index) -> String;

    fn generate_add_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String;

    fn generate_drop_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String;

    fn generate_drop_table_sql(&self, table: &Table) -> String;

    /// Full CREATE TABLE including inline primary key and foreign keys,
    /// followed by secondary index and comment statements.
    fn generate_table_ddl(&self, table: &Table) -> String;

    /// CREATE VIEW from the stored definition, plus check option and comment.
    fn generate_view_ddl(&self, table: &Table) -> String;

    fn generate_drop_view_sql(&self, table: &Table) -> String;

    fn generate_add_column_sql(&self, table: &Table, col: &Column) -> String;

    fn generate_drop_column_sql(&self, table: &Table, col: &Column) -> String;

    fn generate_alter_column_sql(&self, table: &Table, old: &Column, new: &Column) -> String;
}

/// Static dispatch over the supported dialects, keyed by the target database
/// type.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    pub fn from_db_type(db_type: DbType) -> Self {
        match db_type {
            DbType::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DbType::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }
}

impl SqlDialect for DialectImpl {
    fn generate_insert_sql(&self, table: &Table, row: &Record) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_insert_sql(table, row),
            DialectImpl::Postgres(d) => d.generate_insert_sql(table, row),
        }
    }

    fn generate_delete_sql(&self, table: &Table, row: &Record) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_delete_sql(table, row),
            DialectImpl::Postgres(d) => d.generate_delete_sql(table, row),
        }
    }

    fn generate_update_sql(&self, table: &Table, row: &Record, update_cols: &[String]) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_update_sql(table, row, update_cols),
            DialectImpl::Postgres(d) => d.generate_update_sql(table, row, update_cols),
        }
    }

    fn generate_create_index_sql(&self, table: &Table, idx: &Index) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_create_index_sql(table, idx),
            DialectImpl::Postgres(d) => d.generate_create_index_sql(table, idx),
        }
    }

    fn generate_drop_index_sql(&self, table: &Table, idx: &Index) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_drop_index_sql(table, idx),
            DialectImpl::Postgres(d) => d.generate_drop_index_sql(table, idx),
        }
    }

    fn generate_add_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_add_primary_key_sql(table, pk),
            DialectImpl::Postgres(d) => d.generate_add_primary_key_sql(table, pk),
        }
    }

    fn generate_drop_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_drop_primary_key_sql(table, pk),
            DialectImpl::Postgres(d) => d.generate_drop_primary_key_sql(table, pk),
        }
    }

    fn generate_drop_table_sql(&self, table: &Table) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_drop_table_sql(table),
            DialectImpl::Postgres(d) => d.generate_drop_table_sql(table),
        }
    }

    fn generate_table_ddl(&self, table: &Table) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_table_ddl(table),
            DialectImpl::Postgres(d) => d.generate_table_ddl(table),
        }
    }

    fn generate_view_ddl(&self, table: &Table) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_view_ddl(table),
            DialectImpl::Postgres(d) => d.generate_view_ddl(table),
        }
    }

    fn generate_drop_view_sql(&self, table: &Table) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_drop_view_sql(table),
            DialectImpl::Postgres(d) => d.generate_drop_view_sql(table),
        }
    }

    fn generate_add_column_sql(&self, table: &Table, col: &Column) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_add_column_sql(table, col),
            DialectImpl::Postgres(d) => d.generate_add_column_sql(table, col),
        }
    }

    fn generate_drop_column_sql(&self, table: &Table, col: &Column) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_drop_column_sql(table, col),
            DialectImpl::Postgres(d) => d.generate_drop_column_sql(table, col),
        }
    }

    fn generate_alter_column_sql(&self, table: &Table, old: &Column, new: &Column) -> String {
        match self {
            DialectImpl::Mysql(d) => d.generate_alter_column_sql(table, old, new),
            DialectImpl::Postgres(d) => d.generate_alter_column_sql(table, old, new),
        }
    }
}

/// Flatten a schema diff into an ordered SQL script for the target dialect.
///
/// Base-table statements come first (creations, drops, then alterations),
/// followed by all view statements.
pub fn generate_schema_sql(diff: &SchemaDiff, db_type: DbType) -> Vec<String> {
    let dialect = DialectImpl::from_db_type(db_type);
    let mut sqls = Vec::new();
    let mut views = Vec::new();

    for table in &diff.tables_added {
        if table.kind == TableKind::View {
            views.push(dialect.generate_view_ddl(table));
        } else {
            sqls.push(dialect.generate_table_ddl(table));
        }
    }
    for table in &diff.tables_dropped {
        if table.kind == TableKind::View {
            views.push(dialect.generate_drop_view_sql(table));
        } else {
            sqls.push(dialect.generate_drop_table_sql(table));
        }
    }
    for table_diff in &diff.tables_modified {
        if table_diff.table.kind == TableKind::View {
            views.extend(gen_alter_view(table_diff, &dialect));
        } else {
            sqls.extend(gen_alter_table(table_diff, &dialect));
        }
    }

    sqls.append(&mut views);
    sqls
}

/// Alter statements for one table, in the fixed order column ops, index ops
/// (modified indexes as drop+create), then primary key drop+add.
fn gen_alter_table(diff: &TableDiff, dialect: &DialectImpl) -> Vec<String> {
    let mut sqls = Vec::new();
    let table = &diff.table;

    for col in &diff.columns_added {
        sqls.push(dialect.generate_add_column_sql(table, col));
    }
    for col in &diff.columns_dropped {
        sqls.push(dialect.generate_drop_column_sql(table, col));
    }
    for change in &diff.columns_modified {
        sqls.push(dialect.generate_alter_column_sql(table, &change.old, &change.new));
    }
    for idx in &diff.indexes_added {
        sqls.push(dialect.generate_create_index_sql(table, idx));
    }
    for idx in &diff.indexes_dropped {
        sqls.push(dialect.generate_drop_index_sql(table, idx));
    }
    for change in &diff.indexes_modified {
        sqls.push(dialect.generate_drop_index_sql(table, &change.old));
        sqls.push(dialect.generate_create_index_sql(table, &change.new));
    }
    if let Some(pk_change) = &diff.primary_key_change {
        if let Some(old) = &pk_change.old {
            sqls.push(dialect.generate_drop_primary_key_sql(table, old));
        }
        if let Some(new) = &pk_change.new {
            sqls.push(dialect.generate_add_primary_key_sql(table, new));
        }
    }
    // Foreign key alterations are left to the operator.

    sqls
}

/// An altered view is dropped and recreated with the new definition.
fn gen_alter_view(diff: &TableDiff, dialect: &DialectImpl) -> Vec<String> {
    let mut sqls = Vec::new();
    let table = &diff.table;
    if let Some(change) = &diff.view_definition_change {
        sqls.push(dialect.generate_drop_view_sql(table));
        let mut recreated = Table::new(table.name.clone(), TableKind::View, table.schema.clone());
        recreated.view = Some(change.new.clone());
        sqls.push(dialect.generate_view_ddl(&recreated));
    }
    sqls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ViewDefinition;
    use crate::diff::{ColumnDiff, PrimaryKeyDiff};

    fn column(name: &str, data_type: &str, position: i32) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
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
    fn test_tables_precede_views() {
        let mut view = Table::new("v", TableKind::View, "public");
        view.view = Some(ViewDefinition {
            select_statement: "SELECT 1".to_string(),
            ..Default::default()
        });
        let mut table = Table::new("t", TableKind::Table, "public");
        table
            .columns
            .insert("id".to_string(), column("id", "integer", 1));

        let diff = SchemaDiff {
            tables_added: vec![view, table],
            ..Default::default()
        };

        let sqls = generate_schema_sql(&diff, DbType::Postgres);
        assert_eq!(sqls.len(), 2);
        assert!(sqls[0].starts_with("CREATE TABLE"));
        assert!(sqls[1].starts_with("CREATE VIEW"));
    }

    #[test]
    fn test_alter_order_columns_indexes_pk() {
        let mut table = Table::new("t", TableKind::Table, "public");
        table
            .columns
            .insert("id".to_string(), column("id", "integer", 1));

        let mut diff = TableDiff::new(table);
        diff.columns_added.push(column("added", "text", 2));
        diff.columns_modified.push(ColumnDiff {
            old: column("id", "integer", 1),
            new: column("id", "bigint", 1),
        });
        diff.indexes_added.push(Index {
            name: "idx_added".to_string(),
            columns: vec!["added".to_string()],
            unique: false,
            primary: false,
            method: "btree".to_string(),
            where_clause: None,
            expression: None,
        });
        diff.primary_key_change = Some(PrimaryKeyDiff {
            old: Some(PrimaryKey {
                name: "t_pkey".to_string(),
                columns: vec!["id".to_string()],
            }),
            new: Some(PrimaryKey {
                name: "t_pkey".to_string(),
                columns: vec!["id".to_string(), "added".to_string()],
            }),
        });

        let schema_diff = SchemaDiff {
            tables_modified: vec![diff],
            ..Default::default()
        };
        let sqls = generate_schema_sql(&schema_diff, DbType::Postgres);

        let add_col = sqls.iter().position(|s| s.contains("ADD COLUMN")).unwrap();
        let create_idx = sqls.iter().position(|s| s.contains("CREATE INDEX")).unwrap();
        let drop_pk = sqls.iter().position(|s| s.contains("DROP CONSTRAINT")).unwrap();
        let add_pk = sqls
            .iter()
            .position(|s| s.contains("ADD CONSTRAINT") && s.contains("PRIMARY KEY"))
            .unwrap();

        assert!(add_col < create_idx);
        assert!(create_idx < drop_pk);
        assert!(drop_pk < add_pk);
    }

    #[test]
    fn test_altered_view_drops_then_recreates() {
        let mut view = Table::new("v", TableKind::View, "public");
        view.view = Some(ViewDefinition {
            select_statement: "SELECT 1".to_string(),
            ..Default::default()
        });

        let mut diff = TableDiff::new(view);
        diff.view_definition_change = Some(crate::diff::ViewDefinitionDiff {
            old: ViewDefinition {
                select_statement: "SELECT 1".to_string(),
                ..Default::default()
            },
            new: ViewDefinition {
                select_statement: "SELECT 2".to_string(),
                ..Default::default()
            },
        });

        let schema_diff = SchemaDiff {
            tables_modified: vec![diff],
            ..Default::default()
        };
        let sqls = generate_schema_sql(&schema_diff, DbType::Postgres);
        assert_eq!(sqls.len(), 2);
        assert!(sqls[0].starts_with("DROP VIEW"));
        assert!(sqls[1].contains("SELECT 2"));
    }
}
