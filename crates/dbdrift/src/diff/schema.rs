//! Schema diff engine.
//!
//! Compares two [`DatabaseSchema`] values by name and value. The comparison is
//! not dialect-aware; cross-dialect runs compare the raw catalog strings as
//! extracted. Iteration order follows the backing maps, so the diff is
//! deterministic in content only; renderers impose any ordering they need.

use crate::adapter::DbAdapter;
use crate::core::schema::{Column, DatabaseSchema, ForeignKey, Index, PrimaryKey, Table, TableKind};
use crate::error::Result;

use super::{
    ColumnDiff, ForeignKeyDiff, IndexDiff, PrimaryKeyDiff, SchemaDiff, TableDiff,
    ViewDefinitionDiff,
};

/// Read both schemas through their adapters and diff them.
pub async fn compare_schemas_with_adapters(
    src: &dyn DbAdapter,
    tgt: &dyn DbAdapter,
) -> Result<SchemaDiff> {
    let src_schema = src.read_schema().await?;
    let tgt_schema = tgt.read_schema().await?;
    Ok(compare_schemas(&src_schema, &tgt_schema))
}

/// Compute the structural diff that turns `tgt` into `src`.
pub fn compare_schemas(src: &DatabaseSchema, tgt: &DatabaseSchema) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for (name, table) in &src.tables {
        if !tgt.tables.contains_key(name) {
            diff.tables_added.push(table.clone());
        }
    }
    for (name, table) in &tgt.tables {
        if !src.tables.contains_key(name) {
            diff.tables_dropped.push(table.clone());
        }
    }
    for (name, src_table) in &src.tables {
        let Some(tgt_table) = tgt.tables.get(name) else {
            continue;
        };
        if let Some(table_diff) = compare_table(src_table, tgt_table) {
            diff.tables_modified.push(table_diff);
        }
    }

    diff
}

/// Diff one jointly present table; `None` when there is nothing to change.
///
/// Kind mismatches (table on one side, view on the other) emit nothing; the
/// operator resolves those manually.
fn compare_table(src: &Table, tgt: &Table) -> Option<TableDiff> {
    if src.kind != tgt.kind {
        return None;
    }

    if src.kind == TableKind::View {
        let (Some(src_view), Some(tgt_view)) = (&src.view, &tgt.view) else {
            return None;
        };
        if src_view.select_statement != tgt_view.select_statement {
            let mut d = TableDiff::new(tgt.clone());
            d.view_definition_change = Some(ViewDefinitionDiff {
                old: tgt_view.clone(),
                new: src_view.clone(),
            });
            return Some(d);
        }
        return None;
    }

    let mut d = TableDiff::new(tgt.clone());

    for (name, col) in &src.columns {
        if !tgt.columns.contains_key(name) {
            d.columns_added.push(col.clone());
        }
    }
    for (name, col) in &tgt.columns {
        if !src.columns.contains_key(name) {
            d.columns_dropped.push(col.clone());
        }
    }
    for (name, src_col) in &src.columns {
        if let Some(tgt_col) = tgt.columns.get(name) {
            if !equal_column(src_col, tgt_col) {
                d.columns_modified.push(ColumnDiff {
                    old: tgt_col.clone(),
                    new: src_col.clone(),
                });
            }
        }
    }

    for (name, idx) in &src.indexes {
        if !tgt.indexes.contains_key(name) {
            d.indexes_added.push(idx.clone());
        }
    }
    for (name, idx) in &tgt.indexes {
        if !src.indexes.contains_key(name) {
            d.indexes_dropped.push(idx.clone());
        }
    }
    for (name, src_idx) in &src.indexes {
        if let Some(tgt_idx) = tgt.indexes.get(name) {
            if !equal_index(src_idx, tgt_idx) {
                d.indexes_modified.push(IndexDiff {
                    old: tgt_idx.clone(),
                    new: src_idx.clone(),
                });
            }
        }
    }

    if !equal_primary_key(src.primary_key.as_ref(), tgt.primary_key.as_ref()) {
        d.primary_key_change = Some(PrimaryKeyDiff {
            old: tgt.primary_key.clone(),
            new: src.primary_key.clone(),
        });
    }

    for (name, fk) in &src.foreign_keys {
        if !tgt.foreign_keys.contains_key(name) {
            d.foreign_keys_added.push(fk.clone());
        }
    }
    for (name, fk) in &tgt.foreign_keys {
        if !src.foreign_keys.contains_key(name) {
            d.foreign_keys_dropped.push(fk.clone());
        }
    }
    for (name, src_fk) in &src.foreign_keys {
        if let Some(tgt_fk) = tgt.foreign_keys.get(name) {
            if !equal_foreign_key(src_fk, tgt_fk) {
                d.foreign_keys_modified.push(ForeignKeyDiff {
                    old: tgt_fk.clone(),
                    new: src_fk.clone(),
                });
            }
        }
    }

    if d.is_empty() {
        None
    } else {
        Some(d)
    }
}

fn equal_option<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn equal_column(a: &Column, b: &Column) -> bool {
    a.name == b.name
        && a.data_type == b.data_type
        && a.nullable == b.nullable
        && a.extra == b.extra
        && equal_option(a.default.as_ref(), b.default.as_ref())
        && equal_comment(a.comment.as_deref(), b.comment.as_deref())
        && equal_option(a.char_max_len.as_ref(), b.char_max_len.as_ref())
        && equal_option(a.numeric_precision.as_ref(), b.numeric_precision.as_ref())
        && equal_option(a.numeric_scale.as_ref(), b.numeric_scale.as_ref())
}

fn equal_index(a: &Index, b: &Index) -> bool {
    a.name == b.name
        && a.unique == b.unique
        && a.primary == b.primary
        && a.method == b.method
        && a.columns == b.columns
        && equal_option(a.where_clause.as_ref(), b.where_clause.as_ref())
        && equal_option(a.expression.as_ref(), b.expression.as_ref())
}

fn equal_primary_key(a: Option<&PrimaryKey>, b: Option<&PrimaryKey>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.name == b.name && a.columns == b.columns,
        _ => false,
    }
}

fn equal_foreign_key(a: &ForeignKey, b: &ForeignKey) -> bool {
    a.name == b.name
        && a.referenced_schema == b.referenced_schema
        && a.referenced_table == b.referenced_table
        && a.on_delete == b.on_delete
        && a.on_update == b.on_update
        && a.columns == b.columns
        && a.referenced_columns == b.referenced_columns
}

/// Comments compare equal after stripping CR and LF from both sides, since
/// engines disagree on embedded line endings.
fn equal_comment(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            let strip = |s: &str| s.replace(['\n', '\r'], "");
            strip(a) == strip(b)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ViewDefinition;

    fn basic_column(name: &str, data_type: &str, position: i32) -> Column {
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

    fn table_with_columns(name: &str, cols: &[(&str, &str)]) -> Table {
        let mut table = Table::new(name, TableKind::Table, "public");
        for (i, (col_name, data_type)) in cols.iter().enumerate() {
            table.columns.insert(
                col_name.to_string(),
                basic_column(col_name, data_type, i as i32 + 1),
            );
        }
        table
    }

    fn schema_of(tables: Vec<Table>) -> DatabaseSchema {
        let mut schema = DatabaseSchema::default();
        for t in tables {
            schema.tables.insert(t.name.clone(), t);
        }
        schema
    }

    #[test]
    fn test_added_and_dropped_tables() {
        let src = schema_of(vec![table_with_columns("a", &[("id", "int")])]);
        let tgt = schema_of(vec![table_with_columns("b", &[("id", "int")])]);

        let diff = compare_schemas(&src, &tgt);
        assert_eq!(diff.tables_added.len(), 1);
        assert_eq!(diff.tables_added[0].name, "a");
        assert_eq!(diff.tables_dropped.len(), 1);
        assert_eq!(diff.tables_dropped[0].name, "b");
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_identical_schemas_empty_diff() {
        let src = schema_of(vec![table_with_columns("t", &[("id", "int"), ("v", "text")])]);
        let tgt = schema_of(vec![table_with_columns("t", &[("id", "int"), ("v", "text")])]);

        let diff = compare_schemas(&src, &tgt);
        assert!(diff.tables_added.is_empty());
        assert!(diff.tables_dropped.is_empty());
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_column_add_drop_modify() {
        let src = schema_of(vec![table_with_columns(
            "t",
            &[("id", "bigint"), ("email", "varchar")],
        )]);
        let tgt = schema_of(vec![table_with_columns(
            "t",
            &[("id", "int"), ("name", "varchar")],
        )]);

        let diff = compare_schemas(&src, &tgt);
        assert_eq!(diff.tables_modified.len(), 1);
        let td = &diff.tables_modified[0];
        assert_eq!(td.columns_added.len(), 1);
        assert_eq!(td.columns_added[0].name, "email");
        assert_eq!(td.columns_dropped.len(), 1);
        assert_eq!(td.columns_dropped[0].name, "name");
        assert_eq!(td.columns_modified.len(), 1);
        assert_eq!(td.columns_modified[0].old.data_type, "int");
        assert_eq!(td.columns_modified[0].new.data_type, "bigint");
    }

    #[test]
    fn test_kind_mismatch_emits_nothing() {
        let mut view = table_with_columns("t", &[("id", "int")]);
        view.kind = TableKind::View;
        let src = schema_of(vec![view]);
        let tgt = schema_of(vec![table_with_columns("t", &[("id", "bigint")])]);

        let diff = compare_schemas(&src, &tgt);
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_view_definition_change() {
        let mut src_view = Table::new("v", TableKind::View, "public");
        src_view.view = Some(ViewDefinition {
            select_statement: "SELECT id FROM t".to_string(),
            ..Default::default()
        });
        let mut tgt_view = Table::new("v", TableKind::View, "public");
        tgt_view.view = Some(ViewDefinition {
            select_statement: "SELECT id, name FROM t".to_string(),
            ..Default::default()
        });

        let diff = compare_schemas(&schema_of(vec![src_view]), &schema_of(vec![tgt_view]));
        assert_eq!(diff.tables_modified.len(), 1);
        let change = diff.tables_modified[0]
            .view_definition_change
            .as_ref()
            .unwrap();
        assert_eq!(change.new.select_statement, "SELECT id FROM t");
        assert_eq!(change.old.select_statement, "SELECT id, name FROM t");
    }

    #[test]
    fn test_primary_key_change() {
        let mut src = table_with_columns("t", &[("id", "int"), ("sub", "int")]);
        src.primary_key = Some(PrimaryKey {
            name: "t_pkey".to_string(),
            columns: vec!["id".to_string(), "sub".to_string()],
        });
        let mut tgt = table_with_columns("t", &[("id", "int"), ("sub", "int")]);
        tgt.primary_key = Some(PrimaryKey {
            name: "t_pkey".to_string(),
            columns: vec!["id".to_string()],
        });

        let diff = compare_schemas(&schema_of(vec![src]), &schema_of(vec![tgt]));
        assert_eq!(diff.tables_modified.len(), 1);
        assert!(diff.tables_modified[0].primary_key_change.is_some());
    }

    #[test]
    fn test_nil_primary_keys_equal() {
        let src = table_with_columns("t", &[("id", "int")]);
        let tgt = table_with_columns("t", &[("id", "int")]);
        let diff = compare_schemas(&schema_of(vec![src]), &schema_of(vec![tgt]));
        assert!(diff.tables_modified.is_empty());
    }

    #[test]
    fn test_equal_comment_strips_line_endings() {
        assert!(equal_comment(Some("a\nb"), Some("ab")));
        assert!(equal_comment(Some("a\r\nb"), Some("ab")));
        assert!(!equal_comment(Some("a b"), Some("ab")));
        assert!(equal_comment(None, None));
        assert!(!equal_comment(Some(""), None));
    }

    #[test]
    fn test_column_default_nil_vs_present() {
        let mut a = basic_column("c", "int", 1);
        let b = basic_column("c", "int", 1);
        assert!(equal_column(&a, &b));

        a.default = Some("0".to_string());
        assert!(!equal_column(&a, &b));
    }

    #[test]
    fn test_index_equality() {
        let idx = |unique: bool, cols: &[&str]| Index {
            name: "i".to_string(),
            columns: cols.iter().map(|s| s.to_string()).collect(),
            unique,
            primary: false,
            method: "btree".to_string(),
            where_clause: None,
            expression: None,
        };

        assert!(equal_index(&idx(true, &["a", "b"]), &idx(true, &["a", "b"])));
        assert!(!equal_index(&idx(true, &["a", "b"]), &idx(false, &["a", "b"])));
        assert!(!equal_index(&idx(true, &["a", "b"]), &idx(true, &["b", "a"])));

        let mut partial = idx(true, &["a"]);
        partial.where_clause = Some("(a > 0)".to_string());
        assert!(!equal_index(&partial, &idx(true, &["a"])));
    }

    #[test]
    fn test_foreign_key_modified() {
        let fk = |on_delete: &str| ForeignKey {
            name: "fk_user".to_string(),
            columns: vec!["user_id".to_string()],
            referenced_schema: "public".to_string(),
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
            on_delete: on_delete.to_string(),
            on_update: "NO ACTION".to_string(),
        };

        let mut src = table_with_columns("t", &[("user_id", "int")]);
        src.foreign_keys.insert("fk_user".to_string(), fk("CASCADE"));
        let mut tgt = table_with_columns("t", &[("user_id", "int")]);
        tgt.foreign_keys.insert("fk_user".to_string(), fk("RESTRICT"));

        let diff = compare_schemas(&schema_of(vec![src]), &schema_of(vec![tgt]));
        assert_eq!(diff.tables_modified.len(), 1);
        assert_eq!(diff.tables_modified[0].foreign_keys_modified.len(), 1);
    }
}
