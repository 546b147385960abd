//! MySQL adapter.
//!
//! Uses SQLx for pooling and async query execution. Introspection goes
//! through `information_schema`; catalog strings are CAST to CHAR to dodge
//! collation surprises where the server reports VARBINARY.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as _, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::{ConnConfig, DbType};
use crate::core::schema::{
    Column, DatabaseSchema, ForeignKey, Index, PrimaryKey, Table, TableKind, ViewDefinition,
};
use crate::core::value::{Record, SqlValue};
use crate::error::{DriftError, Result};
use crate::tunnel::Tunnel;
use crate::util::join_wrap;

use super::{DbAdapter, PING_ATTEMPTS, PING_INTERVAL};

const POOL_MAX_CONNECTIONS: u32 = 4;
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL implementation of [`DbAdapter`].
pub struct MysqlAdapter {
    pool: MySqlPool,
    cfg: ConnConfig,
    tunnel: Option<Tunnel>,
}

impl MysqlAdapter {
    /// Connect and ping. MySQL conflates schema and database, so the
    /// configured `dbname` becomes the introspected schema.
    pub async fn connect(mut cfg: ConnConfig, tunnel: Option<Tunnel>) -> Result<Self> {
        cfg.table_schema = cfg.dbname.clone();

        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.dbname)
            .username(&cfg.user)
            .password(&cfg.password)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);

        if let Err(e) = Self::ping(&pool).await {
            pool.close().await;
            if let Some(t) = &tunnel {
                t.stop();
            }
            return Err(e);
        }

        info!("connected to mysql {}:{}/{}", cfg.host, cfg.port, cfg.dbname);
        Ok(Self { pool, cfg, tunnel })
    }

    async fn ping(pool: &MySqlPool) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..PING_ATTEMPTS {
            match sqlx::query("SELECT 1").execute(pool).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    debug!("mysql ping attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                    if attempt + 1 < PING_ATTEMPTS {
                        tokio::time::sleep(PING_INTERVAL).await;
                    }
                }
            }
        }
        Err(DriftError::connection(
            "mysql",
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn extract_columns(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(column_name AS CHAR(255)) AS column_name,
                CAST(data_type AS CHAR(255)) AS data_type,
                CAST(is_nullable AS CHAR(8)) AS is_nullable,
                CAST(column_default AS CHAR(2048)) AS column_default,
                CAST(column_comment AS CHAR(2048)) AS column_comment,
                CAST(character_maximum_length AS SIGNED) AS char_max_len,
                CAST(numeric_precision AS SIGNED) AS numeric_precision,
                CAST(numeric_scale AS SIGNED) AS numeric_scale,
                CAST(ordinal_position AS SIGNED) AS ordinal_position,
                CAST(extra AS CHAR(255)) AS extra
            FROM information_schema.columns
            WHERE table_schema = ? AND table_name = ?
            ORDER BY ordinal_position
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = HashMap::new();
        for row in rows {
            let nullable: String = row.get("is_nullable");
            let col = Column {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: nullable == "YES",
                default: row.get("column_default"),
                comment: row.get("column_comment"),
                char_max_len: row.get("char_max_len"),
                numeric_precision: row.get("numeric_precision"),
                numeric_scale: row.get("numeric_scale"),
                position: row.get::<i64, _>("ordinal_position") as i32,
                extra: row.get("extra"),
            };
            columns.insert(col.name.clone(), col);
        }
        table.columns = columns;
        Ok(())
    }

    async fn extract_primary_key(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(tc.constraint_name AS CHAR(255)) AS constraint_name,
                GROUP_CONCAT(CAST(kcu.column_name AS CHAR(255)) ORDER BY kcu.ordinal_position) AS columns
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name
            WHERE tc.table_schema = ?
              AND tc.table_name = ?
              AND tc.constraint_type = 'PRIMARY KEY'
            GROUP BY tc.constraint_name
        "#;

        let row: Option<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            let columns: String = row.get("columns");
            table.primary_key = Some(PrimaryKey {
                name: row.get("constraint_name"),
                columns: columns.split(',').map(|s| s.to_string()).collect(),
            });
        }
        Ok(())
    }

    /// Secondary indexes; the PRIMARY index is represented by the primary key
    /// itself and excluded here.
    async fn extract_indexes(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(index_name AS CHAR(255)) AS index_name,
                (non_unique = 0) AS is_unique,
                CAST(index_type AS CHAR(32)) AS method,
                GROUP_CONCAT(CAST(column_name AS CHAR(255)) ORDER BY seq_in_index) AS columns
            FROM information_schema.statistics
            WHERE table_schema = ? AND table_name = ? AND index_name != 'PRIMARY'
            GROUP BY index_name, non_unique, index_type
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let columns: String = row.get("columns");
            let idx = Index {
                name: row.get("index_name"),
                columns: columns.split(',').map(|s| s.to_string()).collect(),
                unique: row.get::<i64, _>("is_unique") == 1,
                primary: false,
                method: row.get("method"),
                where_clause: None,
                expression: None,
            };
            table.indexes.insert(idx.name.clone(), idx);
        }
        Ok(())
    }

    /// Foreign key information is soft on MySQL: `constraint_column_usage`
    /// is not reliably populated, so a failing or empty lookup leaves the
    /// table without foreign keys rather than erroring.
    async fn extract_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(tc.constraint_name AS CHAR(255)) AS constraint_name,
                GROUP_CONCAT(CAST(kcu.column_name AS CHAR(255)) ORDER BY kcu.ordinal_position) AS columns,
                CAST(ccu.table_schema AS CHAR(255)) AS referenced_schema,
                CAST(ccu.table_name AS CHAR(255)) AS referenced_table,
                GROUP_CONCAT(CAST(ccu.column_name AS CHAR(255)) ORDER BY kcu.ordinal_position) AS referenced_columns,
                CAST(rc.delete_rule AS CHAR(32)) AS delete_rule,
                CAST(rc.update_rule AS CHAR(32)) AS update_rule
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name
            JOIN information_schema.constraint_column_usage ccu ON ccu.constraint_name = tc.constraint_name
            JOIN information_schema.referential_constraints rc ON rc.constraint_name = tc.constraint_name
            WHERE tc.table_schema = ?
              AND tc.table_name = ?
              AND tc.constraint_type = 'FOREIGN KEY'
            GROUP BY tc.constraint_name, ccu.table_schema, ccu.table_name, rc.delete_rule, rc.update_rule
        "#;

        let rows: Vec<MySqlRow> = match sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "foreign key lookup unavailable for {}.{}: {}",
                    table.schema, table.name, e
                );
                return Ok(());
            }
        };

        for row in rows {
            let columns: String = row.get("columns");
            let referenced_columns: String = row.get("referenced_columns");
            let fk = ForeignKey {
                name: row.get("constraint_name"),
                columns: columns.split(',').map(|s| s.to_string()).collect(),
                referenced_schema: row.get("referenced_schema"),
                referenced_table: row.get("referenced_table"),
                referenced_columns: referenced_columns
                    .split(',')
                    .map(|s| s.to_string())
                    .collect(),
                on_delete: row.get("delete_rule"),
                on_update: row.get("update_rule"),
            };
            table.foreign_keys.insert(fk.name.clone(), fk);
        }
        Ok(())
    }

    async fn extract_view_definition(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(view_definition AS CHAR(65535)) AS view_definition,
                CAST(is_updatable AS CHAR(8)) AS is_updatable,
                CAST(check_option AS CHAR(32)) AS check_option
            FROM information_schema.views
            WHERE table_schema = ? AND table_name = ?
        "#;

        let row: MySqlRow = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_one(&self.pool)
            .await?;

        let is_updatable: Option<String> = row.get("is_updatable");
        table.view = Some(ViewDefinition {
            select_statement: row.get::<Option<String>, _>("view_definition").unwrap_or_default(),
            is_updatable: is_updatable.as_deref() == Some("YES"),
            check_option: row.get::<Option<String>, _>("check_option").unwrap_or_default(),
            ..Default::default()
        });
        Ok(())
    }

    /// Table/view comment; lookup failures degrade to an empty comment.
    async fn table_comment(&self, name: &str) -> String {
        let query = r#"
            SELECT CAST(table_comment AS CHAR(2048)) AS table_comment
            FROM information_schema.tables
            WHERE table_schema = ? AND table_name = ?
        "#;

        let row: Option<MySqlRow> = sqlx::query(query)
            .bind(&self.cfg.table_schema)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();

        row.and_then(|r| r.get::<Option<String>, _>("table_comment"))
            .unwrap_or_default()
    }

    fn batch_query(table: &str, cols: &[String], pk: &[String], last_pk_len: usize) -> String {
        let col_list = join_wrap(cols, "`", ", ");
        let pk_list = join_wrap(pk, "`", ", ");
        let mut query = format!("SELECT {} FROM `{}`", col_list, table);
        if last_pk_len > 0 {
            let placeholders = vec!["?"; last_pk_len].join(", ");
            query.push_str(&format!(" WHERE ({}) > ({})", pk_list, placeholders));
        }
        query.push_str(&format!(" ORDER BY {} LIMIT ?", pk_list));
        query
    }
}

type MysqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_value<'q>(q: MysqlQuery<'q>, value: &SqlValue) -> MysqlQuery<'q> {
    match value {
        SqlValue::Null => q.bind(Option::<String>::None),
        SqlValue::Bool(v) => q.bind(*v),
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Float(v) => q.bind(*v),
        SqlValue::Decimal(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.clone()),
        SqlValue::Bytes(v) => q.bind(v.clone()),
        SqlValue::Uuid(v) => q.bind(v.to_string()),
        SqlValue::Date(v) => q.bind(*v),
        SqlValue::Time(v) => q.bind(*v),
        SqlValue::DateTime(v) => q.bind(*v),
        SqlValue::DateTimeOffset(v) => q.bind(v.naive_utc()),
    }
}

/// Decode one cell by the driver-reported column type, falling back through
/// text and bytes for anything unrecognized.
fn sql_value_from_row(row: &MySqlRow, idx: usize) -> SqlValue {
    let is_null = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return SqlValue::Null;
    }

    let type_name = row.column(idx).type_info().name().to_string();
    match type_name.as_str() {
        "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "TINYINT" => row
            .try_get::<i8, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "SMALLINT" => row
            .try_get::<i16, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "MEDIUMINT" | "INT" => row
            .try_get::<i32, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "BIGINT" => row
            .try_get::<i64, _>(idx)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        "TINYINT UNSIGNED" => row
            .try_get::<u8, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "SMALLINT UNSIGNED" | "YEAR" => row
            .try_get::<u16, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => row
            .try_get::<u32, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(idx)
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "FLOAT" => row
            .try_get::<f32, _>(idx)
            .map(|v| SqlValue::Float(v as f64))
            .unwrap_or(SqlValue::Null),
        "DOUBLE" => row
            .try_get::<f64, _>(idx)
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        "DECIMAL" => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        "JSON" => row
            .try_get::<serde_json::Value, _>(idx)
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<String, _>(idx)
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(SqlValue::Text)
            .or_else(|_| row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes))
            .unwrap_or(SqlValue::Null),
    }
}

#[async_trait]
impl DbAdapter for MysqlAdapter {
    fn db_type(&self) -> DbType {
        DbType::Mysql
    }

    fn table_schema(&self) -> &str {
        &self.cfg.table_schema
    }

    fn dbname(&self) -> &str {
        &self.cfg.dbname
    }

    async fn read_schema(&self) -> Result<DatabaseSchema> {
        let rows: Vec<MySqlRow> = sqlx::query(
            r#"
            SELECT
                CAST(table_name AS CHAR(255)) AS table_name,
                CAST(table_type AS CHAR(64)) AS table_type
            FROM information_schema.tables
            WHERE table_schema = ?
            "#,
        )
        .bind(&self.cfg.table_schema)
        .fetch_all(&self.pool)
        .await?;

        let mut schema = DatabaseSchema::default();
        for row in rows {
            let name: String = row.get("table_name");
            let table_type: String = row.get("table_type");
            let table = match TableKind::parse(&table_type) {
                TableKind::Table => self.extract_table(&name).await?,
                TableKind::View => self.extract_view(&name).await?,
                TableKind::Unknown => continue,
            };
            schema.tables.insert(name, table);
        }
        Ok(schema)
    }

    async fn extract_table(&self, name: &str) -> Result<Table> {
        let mut table = Table::new(name, TableKind::Table, self.cfg.table_schema.clone());
        self.extract_columns(&mut table).await?;
        self.extract_primary_key(&mut table).await?;
        self.extract_indexes(&mut table).await?;
        self.extract_foreign_keys(&mut table).await?;
        table.comment = self.table_comment(name).await;
        Ok(table)
    }

    async fn extract_view(&self, name: &str) -> Result<Table> {
        let mut view = Table::new(name, TableKind::View, self.cfg.table_schema.clone());
        self.extract_columns(&mut view).await?;
        self.extract_view_definition(&mut view).await?;
        view.comment = self.table_comment(name).await;
        Ok(view)
    }

    async fn table_data_batch(
        &self,
        table: &str,
        cols: &[String],
        pk: &[String],
        last_pk: &[SqlValue],
        limit: usize,
    ) -> Result<Vec<Record>> {
        if pk.is_empty() {
            return Err(DriftError::NoPrimaryKey(table.to_string()));
        }

        let query = Self::batch_query(table, cols, pk, last_pk.len());
        let mut q = sqlx::query(&query);
        for value in last_pk {
            q = bind_value(q, value);
        }
        q = q.bind(limit as i64);

        let rows: Vec<MySqlRow> = q.fetch_all(&self.pool).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut rec = Record::with_capacity(cols.len());
            for (i, col) in cols.iter().enumerate() {
                rec.insert(col.clone(), sql_value_from_row(&row, i));
            }
            result.push(rec);
        }
        Ok(result)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn query_scalar_string(&self, sql: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(sql).fetch_optional(&self.pool).await?;
        Ok(value)
    }

    async fn execute_rollback(&self, scripts: &[(String, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (label, sql) in scripts {
            if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
                return Err(DriftError::migration(label.clone(), e.to_string()));
            }
        }
        tx.rollback().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        if let Some(tunnel) = &self.tunnel {
            tunnel.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_batch_query_without_cursor() {
        let query = MysqlAdapter::batch_query(
            "users",
            &strings(&["id", "name"]),
            &strings(&["id"]),
            0,
        );
        assert_eq!(
            query,
            "SELECT `id`, `name` FROM `users` ORDER BY `id` LIMIT ?"
        );
    }

    #[test]
    fn test_batch_query_with_composite_cursor() {
        let query = MysqlAdapter::batch_query(
            "events",
            &strings(&["id", "sub", "payload"]),
            &strings(&["id", "sub"]),
            2,
        );
        assert_eq!(
            query,
            "SELECT `id`, `sub`, `payload` FROM `events` WHERE (`id`, `sub`) > (?, ?) ORDER BY `id`, `sub` LIMIT ?"
        );
    }
}
