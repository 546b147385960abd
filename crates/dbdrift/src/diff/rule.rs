//! Comparison rules deciding MODIFY detection for the data diff.

use crate::core::schema::Table;
use crate::core::value::{Record, SqlValue};

/// Captures which fields are compared when both sides hold the same key.
pub trait CompareRule: Send + Sync {
    /// Whether two rows count as unchanged.
    fn is_equal(&self, a: &Record, b: &Record) -> bool;

    /// Table this rule applies to.
    fn table(&self) -> &str;
}

/// Default rule: stringified equality over a fixed column list.
///
/// Values are compared by their default string form, so `NULL` and the empty
/// string differ, and a column missing from a row compares like NULL.
pub struct FieldsEqualRule {
    pub table: String,
    pub columns: Vec<String>,
}

impl CompareRule for FieldsEqualRule {
    fn is_equal(&self, a: &Record, b: &Record) -> bool {
        self.columns
            .iter()
            .all(|c| value_string(a, c) == value_string(b, c))
    }

    fn table(&self) -> &str {
        &self.table
    }
}

fn value_string(row: &Record, column: &str) -> String {
    row.get(column).unwrap_or(&SqlValue::Null).to_string()
}

/// Build the rule for one table: the configured comparison key, or every
/// column of the table when the key list is empty.
pub fn create_compare_rule(table: &Table, comparison_key: &[String]) -> FieldsEqualRule {
    let columns = if comparison_key.is_empty() {
        table.column_names()
    } else {
        comparison_key.to_vec()
    };
    FieldsEqualRule {
        table: table.name.clone(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TableKind;

    fn record(pairs: &[(&str, SqlValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fields_equal_rule() {
        let rule = FieldsEqualRule {
            table: "t".to_string(),
            columns: vec!["val".to_string()],
        };

        let a = record(&[("id", SqlValue::Int(1)), ("val", SqlValue::Text("x".into()))]);
        let b = record(&[("id", SqlValue::Int(2)), ("val", SqlValue::Text("x".into()))]);
        let c = record(&[("id", SqlValue::Int(1)), ("val", SqlValue::Text("y".into()))]);

        assert!(rule.is_equal(&a, &b));
        assert!(!rule.is_equal(&a, &c));
    }

    #[test]
    fn test_null_vs_empty_string_unequal() {
        let rule = FieldsEqualRule {
            table: "t".to_string(),
            columns: vec!["val".to_string()],
        };
        let a = record(&[("val", SqlValue::Null)]);
        let b = record(&[("val", SqlValue::Text(String::new()))]);
        assert!(!rule.is_equal(&a, &b));
    }

    #[test]
    fn test_missing_column_compares_like_null() {
        let rule = FieldsEqualRule {
            table: "t".to_string(),
            columns: vec!["val".to_string()],
        };
        let a = record(&[("id", SqlValue::Int(1))]);
        let b = record(&[("id", SqlValue::Int(1)), ("val", SqlValue::Null)]);
        assert!(rule.is_equal(&a, &b));
    }

    #[test]
    fn test_create_rule_defaults_to_all_columns() {
        let mut table = Table::new("t", TableKind::Table, "public");
        for (i, name) in ["id", "a", "b"].iter().enumerate() {
            table.columns.insert(
                name.to_string(),
                crate::core::schema::Column {
                    name: name.to_string(),
                    data_type: "int".to_string(),
                    nullable: true,
                    default: None,
                    extra: String::new(),
                    comment: None,
                    char_max_len: None,
                    numeric_precision: None,
                    numeric_scale: None,
                    position: i as i32 + 1,
                },
            );
        }

        let rule = create_compare_rule(&table, &[]);
        assert_eq!(rule.columns, vec!["id", "a", "b"]);

        let key = vec!["a".to_string()];
        let rule = create_compare_rule(&table, &key);
        assert_eq!(rule.columns, vec!["a"]);
    }
}
