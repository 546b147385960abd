//! MySQL type conversion and column DDL rendering.

use crate::core::schema::Column;

/// Maps lowercased raw data types to MySQL type text.
///
/// Unknown types pass through verbatim; conversion never fails.
#[derive(Debug, Clone, Default)]
pub struct MysqlTypeConverter;

impl MysqlTypeConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn convert_type(&self, col: &Column) -> String {
        match col.data_type.to_lowercase().as_str() {
            // Character types
            "varchar" => sized(col, "varchar", 255),
            "char" => sized(col, "char", 1),
            "text" => "text".to_string(),
            "tinytext" => "tinytext".to_string(),
            "mediumtext" => "mediumtext".to_string(),
            "longtext" => "longtext".to_string(),

            // Numeric types
            "int" | "integer" => "int".to_string(),
            "bigint" => "bigint".to_string(),
            "smallint" => "smallint".to_string(),
            "tinyint" => "tinyint".to_string(),
            "mediumint" => "mediumint".to_string(),
            "decimal" | "numeric" => match (col.numeric_precision, col.numeric_scale) {
                (Some(p), Some(s)) => format!("decimal({},{})", p, s),
                (Some(p), None) => format!("decimal({})", p),
                _ => "decimal(10,0)".to_string(),
            },
            "float" => match (col.numeric_precision, col.numeric_scale) {
                (Some(p), Some(s)) => format!("float({},{})", p, s),
                _ => "float".to_string(),
            },
            "double" | "real" => match (col.numeric_precision, col.numeric_scale) {
                (Some(p), Some(s)) => format!("double({},{})", p, s),
                _ => "double".to_string(),
            },

            // Serial
            "serial" => "bigint unsigned NOT NULL AUTO_INCREMENT".to_string(),

            // Boolean
            "boolean" | "bool" => "tinyint(1)".to_string(),

            // Date/time types
            "datetime" => "datetime".to_string(),
            "timestamp" => "timestamp".to_string(),
            "date" => "date".to_string(),
            "time" => "time".to_string(),
            "year" => "year".to_string(),

            // Binary types
            "blob" => "blob".to_string(),
            "tinyblob" => "tinyblob".to_string(),
            "mediumblob" => "mediumblob".to_string(),
            "longblob" => "longblob".to_string(),
            "binary" => sized(col, "binary", 1),
            "varbinary" => sized(col, "varbinary", 255),

            // JSON
            "json" => "json".to_string(),

            // Enum and set reconstruct their value list from the extra string
            "enum" => {
                if let Some(rest) = col.extra.strip_prefix("enum(") {
                    format!("enum({}", rest)
                } else {
                    "enum".to_string()
                }
            }
            "set" => {
                if let Some(rest) = col.extra.strip_prefix("set(") {
                    format!("set({}", rest)
                } else {
                    "set".to_string()
                }
            }

            // Spatial types
            "geometry" => "geometry".to_string(),
            "point" => "point".to_string(),
            "linestring" => "linestring".to_string(),
            "polygon" => "polygon".to_string(),
            "multipoint" => "multipoint".to_string(),
            "multilinestring" => "multilinestring".to_string(),
            "multipolygon" => "multipolygon".to_string(),
            "geometrycollection" => "geometrycollection".to_string(),

            _ => col.data_type.clone(),
        }
    }

    /// The column's data type text alone, without constraints.
    pub fn generate_column_type(&self, col: &Column) -> String {
        self.convert_type(col)
    }

    /// Full column clause: quoted name, type, NOT NULL, DEFAULT, extras.
    pub fn generate_column_ddl(&self, col: &Column) -> String {
        let mut parts = vec![format!("`{}`", col.name), self.convert_type(col)];

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default {
            if !default.is_empty() {
                parts.push(format!("DEFAULT {}", default));
            }
        }

        let extra_lower = col.extra.to_lowercase();
        if extra_lower.contains("auto_increment") {
            parts.push("AUTO_INCREMENT".to_string());
        } else if !col.extra.is_empty() {
            parts.push(col.extra.clone());
        }

        parts.join(" ")
    }
}

fn sized(col: &Column, base: &str, default_len: i64) -> String {
    match col.char_max_len {
        Some(len) if len > 0 => format!("{}({})", base, len),
        _ => format!("{}({})", base, default_len),
    }
}
