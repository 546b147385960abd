//! PostgreSQL type conversion and column DDL rendering.

use crate::core::schema::Column;

/// Maps lowercased raw data types to PostgreSQL type text.
///
/// Unknown types pass through verbatim; conversion never fails.
#[derive(Debug, Clone, Default)]
pub struct PostgresTypeConverter;

impl PostgresTypeConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn convert_type(&self, col: &Column) -> String {
        match col.data_type.to_lowercase().as_str() {
            // Character types
            "character varying" | "varchar" => match col.char_max_len {
                Some(len) if len > 0 => format!("varchar({})", len),
                _ => "varchar".to_string(),
            },
            "character" | "char" => match col.char_max_len {
                Some(len) if len > 0 => format!("char({})", len),
                _ => "char(1)".to_string(),
            },
            "text" => "text".to_string(),

            // Numeric types
            "integer" | "int" | "int4" => "int4".to_string(),
            "bigint" | "int8" => "int8".to_string(),
            "smallint" | "int2" => "int2".to_string(),
            "numeric" | "decimal" => match (col.numeric_precision, col.numeric_scale) {
                (Some(p), Some(s)) => format!("numeric({},{})", p, s),
                (Some(p), None) => format!("numeric({})", p),
                _ => "numeric".to_string(),
            },
            "real" | "float4" => "real".to_string(),
            "double precision" | "float8" => "double precision".to_string(),
            "money" => "money".to_string(),

            // Serial
            "serial" => "serial".to_string(),
            "bigserial" => "bigserial".to_string(),
            "smallserial" => "smallserial".to_string(),

            // Boolean
            "boolean" | "bool" => "boolean".to_string(),

            // Date/time types
            "timestamp" | "timestamp without time zone" => "timestamp".to_string(),
            "timestamp with time zone" | "timestamptz" => "timestamp with time zone".to_string(),
            "date" => "date".to_string(),
            "time" | "time without time zone" => "time".to_string(),
            "time with time zone" | "timetz" => "time with time zone".to_string(),
            "interval" => "interval".to_string(),

            // Binary
            "bytea" => "bytea".to_string(),

            // UUID
            "uuid" => "uuid".to_string(),

            // JSON
            "json" => "json".to_string(),
            "jsonb" => "jsonb".to_string(),

            // Network address types
            "inet" => "inet".to_string(),
            "cidr" => "cidr".to_string(),
            "macaddr" => "macaddr".to_string(),

            // Geometric types
            "point" => "point".to_string(),
            "line" => "line".to_string(),
            "lseg" => "lseg".to_string(),
            "box" => "box".to_string(),
            "path" => "path".to_string(),
            "polygon" => "polygon".to_string(),
            "circle" => "circle".to_string(),

            _ => {
                // The catalog reports element arrays as the literal "ARRAY".
                if col.data_type == "ARRAY" {
                    "ARRAY".to_string()
                } else {
                    col.data_type.clone()
                }
            }
        }
    }

    /// Full column clause: quoted name, type, NOT NULL, DEFAULT.
    pub fn generate_column_ddl(&self, col: &Column) -> String {
        let mut parts = vec![format!("\"{}\"", col.name), self.convert_type(col)];

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default {
            if !default.is_empty() {
                parts.push(format!("DEFAULT {}", default));
            }
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(data_type: &str) -> Column {
        Column {
            name: "c".to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
            extra: String::new(),
            comment: None,
            char_max_len: None,
            numeric_precision: None,
            numeric_scale: None,
            position: 1,
        }
    }

    #[test]
    fn test_character_varying() {
        let conv = PostgresTypeConverter::new();
        let mut c = col("character varying");
        assert_eq!(conv.convert_type(&c), "varchar");
        c.char_max_len = Some(200);
        assert_eq!(conv.convert_type(&c), "varchar(200)");
    }

    #[test]
    fn test_integer_aliases() {
        let conv = PostgresTypeConverter::new();
        assert_eq!(conv.convert_type(&col("integer")), "int4");
        assert_eq!(conv.convert_type(&col("int4")), "int4");
        assert_eq!(conv.convert_type(&col("bigint")), "int8");
        assert_eq!(conv.convert_type(&col("smallint")), "int2");
    }

    #[test]
    fn test_numeric_precision_rules() {
        let conv = PostgresTypeConverter::new();
        let mut c = col("numeric");
        assert_eq!(conv.convert_type(&c), "numeric");
        c.numeric_precision = Some(10);
        assert_eq!(conv.convert_type(&c), "numeric(10)");
        c.numeric_scale = Some(2);
        assert_eq!(conv.convert_type(&c), "numeric(10,2)");
    }

    #[test]
    fn test_timestamps() {
        let conv = PostgresTypeConverter::new();
        assert_eq!(conv.convert_type(&col("timestamp without time zone")), "timestamp");
        assert_eq!(
            conv.convert_type(&col("timestamptz")),
            "timestamp with time zone"
        );
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let conv = PostgresTypeConverter::new();
        assert_eq!(conv.convert_type(&col("tsvector")), "tsvector");
    }

    #[test]
    fn test_column_ddl() {
        let conv = PostgresTypeConverter::new();
        let mut c = col("character varying");
        c.name = "email".to_string();
        c.char_max_len = Some(200);
        c.nullable = false;
        assert_eq!(conv.generate_column_ddl(&c), "\"email\" varchar(200) NOT NULL");

        c.default = Some("''::character varying".to_string());
        assert_eq!(
            conv.generate_column_ddl(&c),
            "\"email\" varchar(200) NOT NULL DEFAULT ''::character varying"
        );
    }
}
