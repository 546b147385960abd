//! MySQL SQL generator.

mod convert;

pub use convert::MysqlTypeConverter;

use crate::core::schema::{Column, Index, PrimaryKey, Table, TableKind};
use crate::core::value::{Record, SqlValue};
use crate::util::join_wrap;

use super::SqlDialect;

/// MySQL dialect: backtick identifier quoting, table-option comments,
/// backslash literal escaping.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect {
    converter: MysqlTypeConverter,
}

impl MysqlDialect {
    pub fn new() -> Self {
        Self {
            converter: MysqlTypeConverter::new(),
        }
    }

    fn escaped_value(&self, data_type: &str, val: &SqlValue) -> String {
        let dt = data_type.to_lowercase();
        if val.is_null() {
            return "NULL".to_string();
        }
        if dt.starts_with("char")
            || dt.starts_with("varchar")
            || dt.starts_with("text")
            || dt.starts_with("json")
        {
            format!("'{}'", escape_string(&val.to_string()))
        } else if dt.starts_with("date")
            || dt.starts_with("time")
            || dt.starts_with("enum")
            || dt.starts_with("set")
            || dt.starts_with("blob")
        {
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

impl SqlDialect for MysqlDialect {
    fn generate_insert_sql(&self, table: &Table, row: &Record) -> String {
        let mut col_names = Vec::new();
        let mut values = Vec::new();
        for col in table.columns_by_position() {
            col_names.push(format!("`{}`", col.name));
            let val = row.get(&col.name).unwrap_or(&SqlValue::Null);
            values.push(self.escaped_value(&col.data_type, val));
        }
        format!(
            "INSERT INTO `{}` ({}) VALUES ({});",
            table.name,
            col_names.join(", "),
            values.join(", ")
        )
    }

    fn generate_delete_sql(&self, table: &Table, row: &Record) -> String {
        let mut where_parts = Vec::new();
        for k in table.primary_key_columns() {
            match row.get(k) {
                None | Some(SqlValue::Null) => where_parts.push(format!("`{}` IS NULL", k)),
                Some(_) => where_parts.push(format!("`{}` = {}", k, self.row_value(table, row, k))),
            }
        }
        format!(
            "DELETE FROM `{}` WHERE {};",
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
            set_parts.push(format!("`{}` = {}", c, self.row_value(table, row, c)));
        }

        let mut where_parts = Vec::new();
        for k in pks {
            match row.get(k) {
                None | Some(SqlValue::Null) => where_parts.push(format!("`{}` IS NULL", k)),
                Some(_) => where_parts.push(format!("`{}` = {}", k, self.row_value(table, row, k))),
            }
        }

        format!(
            "UPDATE `{}` SET {} WHERE {};",
            table.name,
            set_parts.join(", "),
            where_parts.join(" AND ")
        )
    }

    fn generate_create_index_sql(&self, table: &Table, idx: &Index) -> String {
        if idx.primary {
            return format!(
                "ALTER TABLE `{}` ADD PRIMARY KEY ({});",
                table.name,
                join_wrap(&idx.columns, "`", ", ")
            );
        }

        let mut ddl = String::from("CREATE ");
        if idx.unique {
            ddl.push_str("UNIQUE ");
        }
        ddl.push_str(&format!(
            "INDEX `{}` ON `{}` ({})",
            idx.name,
            table.name,
            join_wrap(&idx.columns, "`", ", ")
        ));
        if let Some(where_clause) = &idx.where_clause {
            ddl.push_str(&format!(" WHERE {}", where_clause));
        }
        ddl.push(';');
        ddl
    }

    fn generate_drop_index_sql(&self, table: &Table, idx: &Index) -> String {
        format!("DROP INDEX `{}` ON `{}`;", idx.name, table.name)
    }

    fn generate_add_primary_key_sql(&self, table: &Table, pk: &PrimaryKey) -> String {
        format!(
            "ALTER TABLE `{}` ADD CONSTRAINT `{}` PRIMARY KEY ({});",
            table.name,
            pk.name,
            join_wrap(&pk.columns, "`", ", ")
        )
    }

    fn generate_drop_primary_key_sql(&self, table: &Table, _pk: &PrimaryKey) -> String {
        format!("ALTER TABLE `{}` DROP PRIMARY KEY;", table.name)
    }

    fn generate_drop_table_sql(&self, table: &Table) -> String {
        format!("DROP TABLE `{}`;", table.name)
    }

    fn generate_table_ddl(&self, table: &Table) -> String {
        if table.kind != TableKind::Table {
            return String::new();
        }

        let mut ddl = format!("CREATE TABLE `{}` (\n", table.name);

        let mut defs: Vec<String> = table
            .columns_by_position()
            .iter()
            .map(|col| format!("  {}", self.converter.generate_column_ddl(col)))
            .collect();

        if let Some(pk) = &table.primary_key {
            if !pk.columns.is_empty() {
                defs.push(format!("  PRIMARY KEY ({})", join_wrap(&pk.columns, "`", ", ")));
            }
        }

        for fk in table.foreign_keys.values() {
            let mut def = format!(
                "  CONSTRAINT `{}` FOREIGN KEY ({}) REFERENCES `{}` ({})",
                fk.name,
                join_wrap(&fk.columns, "`", ", "),
                fk.referenced_table,
                join_wrap(&fk.referenced_columns, "`", ", ")
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
        ddl.push_str("\n)");

        if !table.comment.is_empty() {
            ddl.push_str(&format!(" COMMENT='{}'", table.comment.replace('\'', "''")));
        }
        ddl.push(';');

        for idx in table.indexes.values() {
            if idx.primary {
                continue;
            }
            ddl.push_str("\n\n");
            ddl.push_str(&self.generate_create_index_sql(table, idx));
        }

        for col in table.columns_by_position() {
            if let Some(comment) = &col.comment {
                if !comment.is_empty() {
                    ddl.push_str(&format!(
                        "\n\nALTER TABLE `{}` MODIFY COLUMN `{}` {} COMMENT '{}';",
                        table.name,
                        col.name,
                        self.converter.generate_column_type(col),
                        comment.replace('\'', "''")
                    ));
                }
            }
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

        let mut ddl = format!("CREATE VIEW `{}` AS\n", table.name);
        ddl.push_str(&view.select_statement);
        if !view.check_option.is_empty() && view.check_option != "NONE" {
            ddl.push_str(&format!("\nWITH {} CHECK OPTION", view.check_option));
        }
        ddl.push(';');

        if !view.comment.is_empty() {
            ddl.push_str(&format!(
                "\n\nALTER VIEW `{}` COMMENT = '{}';",
                table.name,
                view.comment.replace('\'', "''")
            ));
        }

        ddl
    }

    fn generate_drop_view_sql(&self, table: &Table) -> String {
        format!("DROP VIEW `{}`;", table.name)
    }

    fn generate_add_column_sql(&self, table: &Table, col: &Column) -> String {
        format!(
            "ALTER TABLE `{}` ADD COLUMN {};",
            table.name,
            self.converter.generate_column_ddl(col)
        )
    }

    fn generate_drop_column_sql(&self, table: &Table, col: &Column) -> String {
        format!("ALTER TABLE `{}` DROP COLUMN `{}`;", table.name, col.name)
    }

    fn generate_alter_column_sql(&self, table: &Table, _old: &Column, new: &Column) -> String {
        // MySQL rewrites the whole column definition.
        format!(
            "ALTER TABLE `{}` MODIFY COLUMN {};",
            table.name,
            self.converter.generate_column_ddl(new)
        )
    }
}
