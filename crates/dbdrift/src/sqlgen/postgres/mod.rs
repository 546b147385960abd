//! PostgreSQL SQL generator.

mod convert;

pub use convert::PostgresTypeConverter;

use crate::core::schema::{Column, Index, PrimaryKey, Table, TableKind};
use crate::core::value::{Record, SqlValue};
use crate::util::join_wrap;

use super::SqlDialect;

/// PostgreSQL dialect: double-quote identifier quoting, COMMENT ON
/// statements, decomposed column alterations.
///
/// Table DDL, index creation, and table drops qualify the table with its
/// schema only when it is non-empty and not `public`; column- and
/// constraint-level alterations always qualify.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    converter: PostgresTypeConverter,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self {
            converter: PostgresTypeConverter::new(),
        }
    }

    fn schema_prefix(&self, table: &Table) -> String {
        if !table.schema.is_empty() && table.schema != "public" {
            format!("\"{}\".", table.schema)
        } else {
            String::new()
        }
    }

    fn escaped_value(&self, data_type: &str, val: &SqlValue) -> String {
        let dt = data_type.to_lowercase();
        if val.is_null() {
            return "NULL".to_string();
        }
        if dt.contains("char") || dt.contains("text") || dt.contains("json") {
            format!("'{}'", escape_string(&val.to_string()))
        } else if dt.contains("date") || dt.contains("time") || dt.contains("uuid") {
            format!("'{}'", val)
        } else {
            val.to_string()
        }
    }

    fn row_value(&self, table: &Table, row: &Record, column: &str) -> String {
        let data_type = table
            .column(column)
            .map(|c| c.data_type.as_str())
            .unwrap_or_default();
        let val = row.get(column).unwrap_or(&SqlValue::Null);
        self.escaped_value(data_type, val)
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "''")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace('\u{8}', "\\b")
        .replace('\u{c}', "\\f")
}

impl SqlDialect for PostgresDialect {
    fn generate_insert_sql(&self, table: &Table, row: &Record) -> String {
        let mut col_names = Vec::new();
        let mut values = Vec::new();
        for col in table.columns_by_position() {
            col_names.push(format!("\"{}\"", col.name));
            let val = row.get(&col.name).unwrap_or(&SqlValue::Null);
            values.push(self.escaped_value(&col.data_type, val));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            table.name,
            col_names.join(", "),
            values.join(", ")
        )
    }

    fn generate_delete_sql(&self, table: &Table, row: &Record) -> String {
        let mut where_parts = Vec::new();
        for k in table.primary_key_columns() {
            match row.get(k) {
                None | Some(SqlValue::Null) => where_parts.push(format!("\"{}\" IS NULL", k)),
                Some(_) => {
                    where_parts.push(format!("\"{}\" = {}", k, self.row_value(table, row, k)))
                }
            }
        }
        format!(
            "DELETE FROM {} WHERE {};",
            table.name,
            where_parts.join(" AND ")
        )
    }

    fn generate_update_sql(&self, table: &Table, row: &Record, update_cols: &[String]) -> String {
        let pks = table.primary_key_columns();
        let cols = if update_cols.is_empty() {
            table.column_names()
        } else {
            update_cols.to_vec()
        };

        let mut set_parts = Vec::new();
        for c in &cols {
            if pks.contains(c) {
                continue;
            }
            set_parts.push(format!("\"{}\" = {}", c, self.row_value(table, row, c)));
        }

        let mut where_parts = Vec::new();
        for k in pks {
            match row.get(k) {
                None | Some(SqlValue::Null) => where_parts.push(format!("\"{}\" IS NULL", k)),
                Some(_) => {
                    where_parts.push(format!("\"{}\" = {}", k, self.row_value(table, row, k)))
                }
            }
        }

        format!(
            "UPDATE {} SET {} WHERE {};",
            table.name,
            set_parts.join(", "),
            where_parts.join(" AND ")
        )
    }

    fn generate_create_index_sql(&self, table: &Table, idx: &Index) -> String {
        if idx.primary {
            // The primary key index is covered by the table constraint.
            return String::new();
        }

        let mut ddl = String::from("CREATE ");
        if idx.unique {
            ddl.push_str("UNIQUE ");
        }
        ddl.push_str(&format!(
            "INDEX \"{}\" ON {}\"{}\"",
            idx.name,
            self.schema_prefix(table),
            table.name
        ));
        if !idx.method.is_empty() && idx.method != "btree" {
            ddl.push_str(&format!(" USING {}", idx.method));
        }
        ddl.push_str(&format!(" ({})", join_wrap(&idx.columns, "\"", ", ")));
        if let Some(where_clause) = &idx.where_clause {
            ddl.push_str(&format!(" WHERE {}", where_clause));
        }
        ddl.push(';');
        ddl
    }

    fn generate_drop_index_sql(&self, table: &Table, idx: &Index) -> String {
        format!("DROP INDEX {}\"{}\";", self.schema_prefix(table), idx.name)
    }

    fn generate_add_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String {
        format!(
            "ALTER TABLE \"{}\".\"{}\" ADD CONSTRAINT \"{}\" PRIMARY KEY ({});",
            table.schema,
            table.name,
            pk.name,
            join_wrap(&pk.columns, "\"", ", ")
        )
    }

    fn generate_drop_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String {
        format!(
            "ALTER TABLE \"{}\".\"{}\" DROP CONSTRAINT \"{}\";",
            table.schema, table.name, pk.name
        )
    }

    fn generate_drop_table_sql(&self, table: &Table) -> String {
        format!("DROP TABLE {}\"{}\";", self.schema_prefix(table), table.name)
    }

    fn generate_table_ddl(&self, table: &Table) -> String {
        if table.kind != TableKind::Table {
            return String::new();
        }

        let mut ddl = format!(
            "CREATE TABLE {}\"{}\" (\n",
            self.schema_prefix(table),
            table.name
        );

        let mut defs: Vec<String> = table
            .columns_by_position()
            .iter()
            .map(|col| format!("  {}", self.converter.generate_column_ddl(col)))
            .collect();

        if let Some(pk) = &table.primary_key {
            if !pk.columns.is_empty() {
                defs.push(format!(
                    "  CONSTRAINT \"{}\" PRIMARY KEY ({})",
                    pk.name,
                    join_wrap(&pk.columns, "\"", ", ")
                ));
            }
        }

        for fk in table.foreign_keys.values() {
            let mut def = format!(
                "  CONSTRAINT \"{}\" FOREIGN KEY ({}) REFERENCES \"{}\".\"{}\" ({})",
                fk.name,
                join_wrap(&fk.columns, "\"", ", "),
                fk.referenced_schema,
                fk.referenced_table,
                join_wrap(&fk.referenced_columns, "\"", ", ")
            );
            if !fk.on_delete.is_empty() {
                def.push_str(&format!(" ON DELETE {}", fk.on_delete));
            }
            if !fk.on_update.is_empty() {
                def.push_str(&format!(" ON UPDATE {}", fk.on_update));
            }
            defs.push(def);
        }

        ddl.push_str(&defs.join(",\n"));
        ddl.push_str("\n);");

        for idx in table.indexes.values() {
            if idx.primary {
                continue;
            }
            ddl.push_str("\n\n");
            ddl.push_str(&self.generate_create_index_sql(table, idx));
        }

        for col in table.columns_by_position() {
            if let Some(comment) = &col.comment {
                ddl.push_str(&format!(
                    "\n\nCOMMENT ON COLUMN \"{}\".\"{}\".\"{}\" IS '{}';",
                    table.schema, table.name, col.name, comment
                ));
            }
        }

        if !table.comment.is_empty() {
            ddl.push_str(&format!(
                "\n\nCOMMENT ON TABLE \"{}\".\"{}\" IS '{}';",
                table.schema, table.name, table.comment
            ));
        }

        ddl
    }

    fn generate_view_ddl(&self, table: &Table) -> String {
        let Some(view) = &table.view else {
            return String::new();
        };
        if table.kind != TableKind::View {
            return String::new();
        }

        let mut ddl = format!(
            "CREATE VIEW {}\"{}\" AS\n",
            self.schema_prefix(table),
            table.name
        );
        ddl.push_str(&view.select_statement);
        if !view.check_option.is_empty() && view.check_option != "NONE" {
            ddl.push_str(&format!("\nWITH {} CHECK OPTION", view.check_option));
        }
        ddl.push(';');

        if !view.comment.is_empty() {
            ddl.push_str(&format!(
                "\n\nCOMMENT ON VIEW \"{}\".\"{}\" IS '{}';",
                table.schema, table.name, view.comment
            ));
        }

        ddl
    }

    fn generate_drop_view_sql(&self, table: &Table) -> String {
        format!("DROP VIEW \"{}\".\"{}\";", table.schema, table.name)
    }

    fn generate_add_column_sql(&self, table: &Table, col: &Column) -> String {
        format!(
            "ALTER TABLE \"{}\".\"{}\" ADD COLUMN {};",
            table.schema,
            table.name,
            self.converter.generate_column_ddl(col)
        )
    }

    fn generate_drop_column_sql(&self, table: &Table, col: &Column) -> String {
        format!(
            "ALTER TABLE \"{}\".\"{}\" DROP COLUMN \"{}\";",
            table.schema, table.name, col.name
        )
    }

    fn generate_alter_column_sql(&self, table: &Table, old: &Column, new: &Column) -> String {
        let mut ddl = String::new();
        let prefix = format!("ALTER TABLE \"{}\".\"{}\"", table.schema, table.name);

        if old.name != new.name {
            ddl.push_str(&format!(
                "{} RENAME COLUMN \"{}\" TO \"{}\";",
                prefix, old.name, new.name
            ));
        }

        let old_type = self.converter.convert_type(old);
        let new_type = self.converter.convert_type(new);
        if old_type != new_type {
            let using = if matches!(new_type.as_str(), "int2" | "int4" | "int8" | "jsonb" | "json")
            {
                format!(" USING \"{}\"::{}", new.name, new_type)
            } else {
                String::new()
            };
            ddl.push_str(&format!(
                "{} ALTER COLUMN \"{}\" TYPE {}{};",
                prefix, new.name, new_type, using
            ));
        }

        if let Some(default) = &new.default {
            let changed = match &old.default {
                None => true,
                Some(old_default) => old_default != default,
            };
            if changed {
                ddl.push_str(&format!(
                    "{} ALTER COLUMN \"{}\" SET DEFAULT {};",
                    prefix, new.name, default
                ));
            }
        }

        if old.nullable != new.nullable {
            if new.nullable {
                ddl.push_str(&format!(
                    "{} ALTER COLUMN \"{}\" DROP NOT NULL;",
                    prefix, new.name
                ));
            } else {
                ddl.push_str(&format!(
                    "{} ALTER COLUMN \"{}\" SET NOT NULL;",
                    prefix, new.name
                ));
            }
        }

        if let Some(comment) = &new.comment {
            let changed = match &old.comment {
                None => true,
                Some(old_comment) => old_comment != comment,
            };
            if changed {
                ddl.push_str(&format!(
                    "COMMENT ON COLUMN \"{}\".\"{}\".\"{}\" IS '{}';",
                    table.schema, table.name, new.name, comment
                ));
            }
        }

        ddl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn users_table() -> Table {
        let mut table = Table::new("users", TableKind::Table, "public");
        let mut id = column("id", "bigint", 1);
        id.nullable = false;
        table.columns.insert("id".to_string(), id);
        let mut name = column("name", "character varying", 2);
        name.char_max_len = Some(100);
        table.columns.insert("name".to_string(), name);
        table.primary_key = Some(PrimaryKey {
            name: "users_pkey".to_string(),
            columns: vec!["id".to_string()],
        });
        table
    }

    fn record(pairs: &[(&str, SqlValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_add_column_qualifies_public_schema() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let mut email = column("email", "character varying", 3);
        email.char_max_len = Some(200);
        email.nullable = false;

        assert_eq!(
            dialect.generate_add_column_sql(&table, &email),
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"email\" varchar(200) NOT NULL;"
        );
    }

    #[test]
    fn test_table_ddl_skips_public_prefix() {
        let dialect = PostgresDialect::new();
        let ddl = dialect.generate_table_ddl(&users_table());
        assert!(ddl.starts_with("CREATE TABLE \"users\" (\n"));
        assert!(ddl.contains("  \"id\" int8 NOT NULL"));
        assert!(ddl.contains("  \"name\" varchar(100)"));
        assert!(ddl.contains("  CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_table_ddl_qualifies_non_public_schema() {
        let dialect = PostgresDialect::new();
        let mut table = users_table();
        table.schema = "app".to_string();
        let ddl = dialect.generate_table_ddl(&table);
        assert!(ddl.starts_with("CREATE TABLE \"app\".\"users\" (\n"));
    }

    #[test]
    fn test_insert_sql_unqualified_table() {
        let dialect = PostgresDialect::new();
        let row = record(&[
            ("id", SqlValue::Int(1)),
            ("name", SqlValue::Text("ann".into())),
        ]);
        assert_eq!(
            dialect.generate_insert_sql(&users_table(), &row),
            "INSERT INTO users (\"id\", \"name\") VALUES (1, 'ann');"
        );
    }

    #[test]
    fn test_delete_and_update_sql() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let row = record(&[
            ("id", SqlValue::Int(1)),
            ("name", SqlValue::Text("ann".into())),
        ]);

        assert_eq!(
            dialect.generate_delete_sql(&table, &row),
            "DELETE FROM users WHERE \"id\" = 1;"
        );
        assert_eq!(
            dialect.generate_update_sql(&table, &row, &[]),
            "UPDATE users SET \"name\" = 'ann' WHERE \"id\" = 1;"
        );
    }

    #[test]
    fn test_escaping() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.escaped_value("text", &SqlValue::Text("a'b".into())),
            "'a''b'"
        );
        assert_eq!(
            dialect.escaped_value("character varying", &SqlValue::Text("line1\nline2".into())),
            "'line1\\nline2'"
        );
        assert_eq!(
            dialect.escaped_value(
                "uuid",
                &SqlValue::Text("9f2e6a32-7f6e-47e4-9bbb-000000000000".into())
            ),
            "'9f2e6a32-7f6e-47e4-9bbb-000000000000'"
        );
        assert_eq!(dialect.escaped_value("int8", &SqlValue::Int(5)), "5");
        assert_eq!(dialect.escaped_value("text", &SqlValue::Null), "NULL");
    }

    #[test]
    fn test_create_index_for_primary_is_empty() {
        let dialect = PostgresDialect::new();
        let idx = Index {
            name: "users_pkey".to_string(),
            columns: vec!["id".to_string()],
            unique: true,
            primary: true,
            method: "btree".to_string(),
            where_clause: None,
            expression: None,
        };
        assert_eq!(dialect.generate_create_index_sql(&users_table(), &idx), "");
    }

    #[test]
    fn test_create_index_with_method_and_predicate() {
        let dialect = PostgresDialect::new();
        let idx = Index {
            name: "idx_tags".to_string(),
            columns: vec!["tags".to_string()],
            unique: false,
            primary: false,
            method: "gin".to_string(),
            where_clause: Some("(deleted_at IS NULL)".to_string()),
            expression: None,
        };
        assert_eq!(
            dialect.generate_create_index_sql(&users_table(), &idx),
            "CREATE INDEX \"idx_tags\" ON \"users\" USING gin (\"tags\") WHERE (deleted_at IS NULL);"
        );
    }

    #[test]
    fn test_alter_column_type_change_with_using() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let old = column("age", "character varying", 3);
        let new = column("age", "integer", 3);
        assert_eq!(
            dialect.generate_alter_column_sql(&table, &old, &new),
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"age\" TYPE int4 USING \"age\"::int4;"
        );
    }

    #[test]
    fn test_alter_column_rename_and_nullability() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let old = column("nick", "text", 3);
        let mut new = column("nickname", "text", 3);
        new.nullable = false;

        let sql = dialect.generate_alter_column_sql(&table, &old, &new);
        assert!(sql.contains("RENAME COLUMN \"nick\" TO \"nickname\";"));
        assert!(sql.contains("ALTER COLUMN \"nickname\" SET NOT NULL;"));
        assert!(!sql.contains(" TYPE "));
    }

    #[test]
    fn test_alter_column_default_change() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let old = column("n", "integer", 3);
        let mut new = column("n", "integer", 3);
        new.default = Some("0".to_string());
        assert_eq!(
            dialect.generate_alter_column_sql(&table, &old, &new),
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"n\" SET DEFAULT 0;"
        );
    }

    #[test]
    fn test_alter_column_no_change_is_empty() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let old = column("n", "integer", 3);
        let new = column("n", "integer", 3);
        assert_eq!(dialect.generate_alter_column_sql(&table, &old, &new), "");
    }

    #[test]
    fn test_primary_key_sql() {
        let dialect = PostgresDialect::new();
        let table = users_table();
        let pk = PrimaryKey {
            name: "users_pkey".to_string(),
            columns: vec!["id".to_string()],
        };
        assert_eq!(
            dialect.generate_add_primary_key_sql(&table, &pk),
            "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\");"
        );
        assert_eq!(
            dialect.generate_drop_primary_key_sql(&table, &pk),
            "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"users_pkey\";"
        );
    }

    #[test]
    fn test_view_ddl_with_comment() {
        let dialect = PostgresDialect::new();
        let mut view = Table::new("v_users", TableKind::View, "public");
        view.view = Some(crate::core::schema::ViewDefinition {
            select_statement: "SELECT id FROM users".to_string(),
            comment: "active users".to_string(),
            ..Default::default()
        });

        let ddl = dialect.generate_view_ddl(&view);
        assert!(ddl.starts_with("CREATE VIEW \"v_users\" AS\nSELECT id FROM users;"));
        assert!(ddl.contains("COMMENT ON VIEW \"public\".\"v_users\" IS 'active users';"));
    }
}
