//! Streaming data diff.
//!
//! Compares one table's rows between source and target with memory bounded by
//! the batch size: two PK-ordered batch iterators feed a merge walk that
//! classifies every row as added, dropped, or modified.
//!
//! Primary keys compare by the default string form of their values, column by
//! column in declared key order. For numeric keys this matches the database
//! ordering only when every value has the same decimal width; text and uuid
//! keys are always safe.

use std::cmp::Ordering;

use crate::adapter::DbAdapter;
use crate::core::value::{Record, SqlValue};
use crate::error::Result;

use super::rule::CompareRule;
use super::{DataDiff, DiffType, ModifiedRow};

/// Merge-walk both sides of `rule.table()` and invoke `handle` for every
/// differing row, in ascending PK order.
///
/// The column list and primary key are resolved from the target side; a
/// missing primary key fails the run.
pub async fn stream_compare_data<F>(
    src: &dyn DbAdapter,
    tgt: &dyn DbAdapter,
    rule: &dyn CompareRule,
    batch_size: usize,
    mut handle: F,
) -> Result<()>
where
    F: FnMut(DiffType, Option<&Record>, Option<&Record>),
{
    let table = tgt.extract_table(rule.table()).await?;
    let cols = table.column_names();
    let pks: Vec<String> = table.primary_key_columns().to_vec();

    let mut src_iter = RowBatchIterator::new(src, rule.table(), &cols, &pks, batch_size);
    let mut tgt_iter = RowBatchIterator::new(tgt, rule.table(), &cols, &pks, batch_size);

    let mut src_buf: Vec<Record> = Vec::new();
    let mut tgt_buf: Vec<Record> = Vec::new();
    let mut src_idx = 0;
    let mut tgt_idx = 0;
    let mut src_done = false;
    let mut tgt_done = false;

    loop {
        if src_idx >= src_buf.len() && !src_done {
            match src_iter.next_batch().await? {
                Some(batch) => {
                    src_buf = batch;
                    src_idx = 0;
                }
                None => src_done = true,
            }
        }
        if tgt_idx >= tgt_buf.len() && !tgt_done {
            match tgt_iter.next_batch().await? {
                Some(batch) => {
                    tgt_buf = batch;
                    tgt_idx = 0;
                }
                None => tgt_done = true,
            }
        }

        let src_row = src_buf.get(src_idx);
        let tgt_row = tgt_buf.get(tgt_idx);

        let cmp = match (src_row, tgt_row) {
            (None, None) => break,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(s), Some(t)) => compare_pk_record(s, t, &pks),
        };

        match cmp {
            Ordering::Less => {
                handle(DiffType::Add, src_row, None);
                src_idx += 1;
            }
            Ordering::Greater => {
                handle(DiffType::Drop, None, tgt_row);
                tgt_idx += 1;
            }
            Ordering::Equal => {
                if let (Some(s), Some(t)) = (src_row, tgt_row) {
                    if !rule.is_equal(s, t) {
                        handle(DiffType::Modify, Some(s), Some(t));
                    }
                }
                src_idx += 1;
                tgt_idx += 1;
            }
        }
    }

    Ok(())
}

/// Run [`stream_compare_data`] and collect the events into a [`DataDiff`].
pub async fn stream_compare_to_diff(
    src: &dyn DbAdapter,
    tgt: &dyn DbAdapter,
    rule: &dyn CompareRule,
    batch_size: usize,
) -> Result<DataDiff> {
    let mut diff = DataDiff::default();
    stream_compare_data(src, tgt, rule, batch_size, |diff_type, src_row, tgt_row| {
        match diff_type {
            DiffType::Add => {
                if let Some(row) = src_row {
                    diff.added.push(row.clone());
                }
            }
            DiffType::Drop => {
                if let Some(row) = tgt_row {
                    diff.dropped.push(row.clone());
                }
            }
            DiffType::Modify => {
                if let (Some(new), Some(old)) = (src_row, tgt_row) {
                    diff.modified.push(ModifiedRow {
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
            }
        }
    })
    .await?;
    Ok(diff)
}

/// PK-keyed batch iterator: a finite, non-restartable lazy sequence of row
/// batches. Owns the last-PK cursor; an empty batch closes the stream.
struct RowBatchIterator<'a> {
    db: &'a dyn DbAdapter,
    table: &'a str,
    cols: &'a [String],
    pk: &'a [String],
    limit: usize,
    last_pk: Vec<SqlValue>,
    closed: bool,
}

impl<'a> RowBatchIterator<'a> {
    fn new(
        db: &'a dyn DbAdapter,
        table: &'a str,
        cols: &'a [String],
        pk: &'a [String],
        limit: usize,
    ) -> Self {
        Self {
            db,
            table,
            cols,
            pk,
            limit,
            last_pk: Vec::new(),
            closed: false,
        }
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Record>>> {
        if self.closed {
            return Ok(None);
        }
        let batch = self
            .db
            .table_data_batch(self.table, self.cols, self.pk, &self.last_pk, self.limit)
            .await?;
        if batch.is_empty() {
            self.closed = true;
            return Ok(None);
        }
        if let Some(last) = batch.last() {
            self.last_pk = extract_pk(last, self.pk);
        }
        Ok(Some(batch))
    }
}

/// Compare two rows by their primary key values, column by column in key
/// order, using the default string form of each value. The first unequal
/// column decides.
pub(crate) fn compare_pk_record(a: &Record, b: &Record, pk: &[String]) -> Ordering {
    for k in pk {
        let av = a.get(k).unwrap_or(&SqlValue::Null).to_string();
        let bv = b.get(k).unwrap_or(&SqlValue::Null).to_string();
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn extract_pk(row: &Record, pk: &[String]) -> Vec<SqlValue> {
    pk.iter()
        .map(|k| row.get(k).cloned().unwrap_or(SqlValue::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbType;
    use crate::core::schema::{Column, DatabaseSchema, PrimaryKey, Table, TableKind};
    use crate::diff::rule::FieldsEqualRule;
    use async_trait::async_trait;

    /// In-memory adapter serving a fixed, PK-ordered row list.
    struct MockAdapter {
        rows: Vec<Record>,
        cols: Vec<String>,
        pk: Vec<String>,
    }

    impl MockAdapter {
        fn new(cols: &[&str], pk: &[&str], rows: Vec<Record>) -> Self {
            Self {
                rows,
                cols: cols.iter().map(|s| s.to_string()).collect(),
                pk: pk.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl DbAdapter for MockAdapter {
        fn db_type(&self) -> DbType {
            DbType::Mysql
        }

        fn table_schema(&self) -> &str {
            "test"
        }

        fn dbname(&self) -> &str {
            "test"
        }

        async fn read_schema(&self) -> Result<DatabaseSchema> {
            unimplemented!("not used by the data diff")
        }

        async fn extract_table(&self, table: &str) -> Result<Table> {
            let mut t = Table::new(table, TableKind::Table, "test");
            for (i, c) in self.cols.iter().enumerate() {
                t.columns.insert(
                    c.clone(),
                    Column {
                        name: c.clone(),
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
            t.primary_key = Some(PrimaryKey {
                name: "pk".to_string(),
                columns: self.pk.clone(),
            });
            Ok(t)
        }

        async fn extract_view(&self, _view: &str) -> Result<Table> {
            unimplemented!("not used by the data diff")
        }

        async fn table_data_batch(
            &self,
            _table: &str,
            _cols: &[String],
            pk: &[String],
            last_pk: &[SqlValue],
            limit: usize,
        ) -> Result<Vec<Record>> {
            let mut start = 0;
            if !last_pk.is_empty() {
                for (i, row) in self.rows.iter().enumerate() {
                    let matches = pk.iter().zip(last_pk.iter()).all(|(k, v)| {
                        row.get(k).unwrap_or(&SqlValue::Null).to_string() == v.to_string()
                    });
                    if matches {
                        start = i + 1;
                        break;
                    }
                }
            }
            let end = (start + limit).min(self.rows.len());
            Ok(self.rows[start..end].to_vec())
        }

        async fn execute(&self, _sql: &str) -> Result<()> {
            unimplemented!("not used by the data diff")
        }

        async fn query_scalar_string(&self, _sql: &str) -> Result<Option<String>> {
            unimplemented!("not used by the data diff")
        }

        async fn execute_rollback(&self, _scripts: &[(String, String)]) -> Result<()> {
            unimplemented!("not used by the data diff")
        }

        async fn close(&self) {}
    }

    fn row(pairs: &[(&str, SqlValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn id_val(id: i64, val: &str) -> Record {
        row(&[("id", SqlValue::Int(id)), ("val", SqlValue::Text(val.into()))])
    }

    async fn run_case(
        src_rows: Vec<Record>,
        tgt_rows: Vec<Record>,
        cols: &[&str],
        pk: &[&str],
        compare: &[&str],
        key_cols: &[&str],
    ) -> Vec<String> {
        let src = MockAdapter::new(cols, pk, src_rows);
        let tgt = MockAdapter::new(cols, pk, tgt_rows);
        let rule = FieldsEqualRule {
            table: "t".to_string(),
            columns: compare.iter().map(|s| s.to_string()).collect(),
        };

        let mut got = Vec::new();
        stream_compare_data(&src, &tgt, &rule, 2, |diff_type, src_row, tgt_row| {
            let row = src_row.or(tgt_row).expect("one side present");
            let key: Vec<String> = key_cols
                .iter()
                .map(|k| row.get(*k).unwrap_or(&SqlValue::Null).to_string())
                .collect();
            got.push(format!("{}:{}", diff_type, key.join(":")));
        })
        .await
        .unwrap();
        got
    }

    #[tokio::test]
    async fn test_all_add() {
        let got = run_case(
            vec![id_val(1, "a"), id_val(2, "b")],
            vec![],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["ADD:1", "ADD:2"]);
    }

    #[tokio::test]
    async fn test_all_drop() {
        let got = run_case(
            vec![],
            vec![id_val(1, "a"), id_val(2, "b")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["DROP:1", "DROP:2"]);
    }

    #[tokio::test]
    async fn test_identical_sides_no_events() {
        let got = run_case(
            vec![id_val(1, "a"), id_val(2, "b")],
            vec![id_val(1, "a"), id_val(2, "b")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_modify_and_add() {
        let got = run_case(
            vec![id_val(1, "a"), id_val(2, "b"), id_val(3, "c")],
            vec![id_val(1, "a"), id_val(2, "B")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["MODIFY:2", "ADD:3"]);
    }

    #[tokio::test]
    async fn test_unbalanced_batches() {
        let got = run_case(
            vec![id_val(1, "a"), id_val(2, "b"), id_val(3, "c"), id_val(4, "d")],
            vec![id_val(3, "c"), id_val(4, "D")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["ADD:1", "ADD:2", "MODIFY:4"]);
    }

    #[tokio::test]
    async fn test_interleaved() {
        let got = run_case(
            vec![id_val(1, "a"), id_val(3, "c"), id_val(5, "e")],
            vec![id_val(2, "b"), id_val(3, "C"), id_val(4, "d")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["ADD:1", "DROP:2", "MODIFY:3", "DROP:4", "ADD:5"]);
    }

    #[tokio::test]
    async fn test_target_side_longer() {
        let got = run_case(
            vec![id_val(2, "b"), id_val(4, "d")],
            vec![id_val(1, "a"), id_val(2, "b"), id_val(3, "c"), id_val(4, "D")],
            &["id", "val"],
            &["id"],
            &["val"],
            &["id"],
        )
        .await;
        assert_eq!(got, vec!["DROP:1", "DROP:3", "MODIFY:4"]);
    }

    fn multi(id: i64, sub: i64, a: &str, b: &str) -> Record {
        row(&[
            ("id", SqlValue::Int(id)),
            ("sub", SqlValue::Int(sub)),
            ("a", SqlValue::Text(a.into())),
            ("b", SqlValue::Text(b.into())),
        ])
    }

    #[tokio::test]
    async fn test_multi_pk_multi_compare() {
        let got = run_case(
            vec![multi(1, 1, "a", "b"), multi(2, 2, "c", "d")],
            vec![multi(1, 2, "C", "d"), multi(2, 1, "c", "d")],
            &["id", "sub", "a", "b"],
            &["id", "sub"],
            &["a", "b"],
            &["id", "sub"],
        )
        .await;
        assert_eq!(got, vec!["ADD:1:1", "DROP:1:2", "DROP:2:1", "ADD:2:2"]);
    }

    #[tokio::test]
    async fn test_multi_pk_modify() {
        let got = run_case(
            vec![multi(1, 1, "x", "y"), multi(1, 2, "x", "z")],
            vec![multi(1, 1, "x", "y"), multi(1, 2, "x", "y")],
            &["id", "sub", "a", "b"],
            &["id", "sub"],
            &["a", "b"],
            &["id", "sub"],
        )
        .await;
        assert_eq!(got, vec!["MODIFY:1:2"]);
    }

    #[test]
    fn test_compare_pk_record_trichotomy() {
        let pk = vec!["id".to_string()];
        let a = row(&[("id", SqlValue::Int(1))]);
        let b = row(&[("id", SqlValue::Int(2))]);

        assert_eq!(compare_pk_record(&a, &b, &pk), Ordering::Less);
        assert_eq!(compare_pk_record(&b, &a, &pk), Ordering::Greater);
        assert_eq!(compare_pk_record(&a, &a, &pk), Ordering::Equal);
    }

    #[test]
    fn test_compare_pk_record_is_lexicographic() {
        // Stringified comparison: "10" sorts before "9". Known property of
        // the comparator; numeric keys need uniform decimal width.
        let pk = vec!["id".to_string()];
        let nine = row(&[("id", SqlValue::Int(9))]);
        let ten = row(&[("id", SqlValue::Int(10))]);
        assert_eq!(compare_pk_record(&ten, &nine, &pk), Ordering::Less);
    }

    #[test]
    fn test_compare_pk_record_null_collides() {
        let pk = vec!["id".to_string()];
        let a = row(&[("id", SqlValue::Null)]);
        let b = row(&[]);
        assert_eq!(compare_pk_record(&a, &b, &pk), Ordering::Equal);
    }
}
