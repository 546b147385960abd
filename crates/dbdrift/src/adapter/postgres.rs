//! PostgreSQL adapter.
//!
//! Uses tokio-postgres pooled with deadpool. Introspection combines
//! `information_schema` with the `pg_catalog` views for comments, index
//! methods, and partial-index predicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;
use tokio_postgres_rustls::MakeRustlsConnect;
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

const POOL_MAX_SIZE: usize = 4;

/// PostgreSQL implementation of [`DbAdapter`].
pub struct PostgresAdapter {
    pool: Pool,
    cfg: ConnConfig,
    tunnel: Option<Tunnel>,
}

impl PostgresAdapter {
    /// Connect and ping. An empty `tableSchema` defaults to `public`.
    pub async fn connect(mut cfg: ConnConfig, tunnel: Option<Tunnel>) -> Result<Self> {
        if cfg.table_schema.is_empty() {
            cfg.table_schema = "public".to_string();
        }

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&cfg.host)
            .port(cfg.port)
            .dbname(&cfg.dbname)
            .user(&cfg.user)
            .password(&cfg.password);

        for (key, value) in cfg.extra_pairs() {
            match key.as_str() {
                "application_name" => {
                    pg_config.application_name(&value);
                }
                "connect_timeout" => {
                    if let Ok(secs) = value.parse::<u64>() {
                        pg_config.connect_timeout(Duration::from_secs(secs));
                    }
                }
                "options" => {
                    pg_config.options(&value);
                }
                // TLS is driven by the ssl flag.
                "sslmode" => {}
                other => warn!("ignoring unsupported extra connection parameter {}", other),
            }
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = if cfg.ssl {
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();
            let connector = MakeRustlsConnect::new(tls_config);
            let mgr = Manager::from_config(pg_config, connector, mgr_config);
            Pool::builder(mgr).max_size(POOL_MAX_SIZE).build()
        } else {
            let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
            Pool::builder(mgr).max_size(POOL_MAX_SIZE).build()
        }
        .map_err(|e| DriftError::connection("postgres", e.to_string()))?;

        if let Err(e) = Self::ping(&pool).await {
            pool.close();
            if let Some(t) = &tunnel {
                t.stop();
            }
            return Err(e);
        }

        info!(
            "connected to postgres {}:{}/{} schema {}",
            cfg.host, cfg.port, cfg.dbname, cfg.table_schema
        );
        Ok(Self { pool, cfg, tunnel })
    }

    async fn ping(pool: &Pool) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..PING_ATTEMPTS {
            let result = match pool.get().await {
                Ok(client) => client.simple_query("SELECT 1").await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    debug!("postgres ping attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                    if attempt + 1 < PING_ATTEMPTS {
                        tokio::time::sleep(PING_INTERVAL).await;
                    }
                }
            }
        }
        Err(DriftError::connection(
            "postgres",
            last_err.unwrap_or_default(),
        ))
    }

    async fn extract_columns(&self, table: &mut Table) -> Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text,
                c.column_default::text,
                pgd.description,
                c.character_maximum_length::int8,
                c.numeric_precision::int8,
                c.numeric_scale::int8,
                c.ordinal_position::int4
            FROM information_schema.columns c
                LEFT JOIN pg_catalog.pg_statio_all_tables st ON c.table_name = st.relname
                LEFT JOIN pg_catalog.pg_description pgd
                    ON pgd.objoid = st.relid AND pgd.objsubid = c.ordinal_position
            WHERE c.table_name = $1 AND c.table_schema = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client.query(query, &[&table.name, &table.schema]).await?;
        let mut columns = HashMap::new();
        for row in rows {
            let nullable: String = row.try_get(2)?;
            let col = Column {
                name: row.try_get(0)?,
                data_type: row.try_get(1)?,
                nullable: nullable == "YES",
                default: row.try_get(3)?,
                comment: row.try_get(4)?,
                char_max_len: row.try_get(5)?,
                numeric_precision: row.try_get(6)?,
                numeric_scale: row.try_get(7)?,
                position: row.try_get(8)?,
                extra: String::new(),
            };
            columns.insert(col.name.clone(), col);
        }
        table.columns = columns;
        Ok(())
    }

    async fn extract_primary_key(&self, table: &mut Table) -> Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                tc.constraint_name::text,
                array_agg(kcu.column_name::text ORDER BY kcu.ordinal_position) AS columns
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            GROUP BY tc.constraint_name
        "#;

        if let Some(row) = client
            .query_opt(query, &[&table.schema, &table.name])
            .await?
        {
            table.primary_key = Some(PrimaryKey {
                name: row.try_get(0)?,
                columns: row.try_get(1)?,
            });
        }
        Ok(())
    }

    /// All indexes, including the one backing the primary key, which the
    /// catalog flags with `indisprimary`.
    async fn extract_indexes(&self, table: &mut Table) -> Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                i.relname::text AS index_name,
                ix.indisunique,
                ix.indisprimary,
                am.amname::text AS method,
                pg_get_expr(ix.indpred, ix.indrelid) AS where_clause,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS columns
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_am am ON am.oid = i.relam
            LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = $1 AND t.relname = $2
            GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname, ix.indpred, ix.indrelid
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;
        for row in rows {
            let idx = Index {
                name: row.try_get(0)?,
                unique: row.try_get(1)?,
                primary: row.try_get(2)?,
                method: row.try_get(3)?,
                where_clause: row.try_get(4)?,
                columns: row.try_get(5)?,
                expression: None,
            };
            table.indexes.insert(idx.name.clone(), idx);
        }
        Ok(())
    }

    async fn extract_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                tc.constraint_name::text,
                array_agg(kcu.column_name::text ORDER BY kcu.ordinal_position) AS columns,
                ccu.table_schema::text AS referenced_schema,
                ccu.table_name::text AS referenced_table,
                array_agg(ccu.column_name::text ORDER BY kcu.ordinal_position) AS referenced_columns,
                rc.delete_rule::text,
                rc.update_rule::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name
            JOIN information_schema.constraint_column_usage ccu ON ccu.constraint_name = tc.constraint_name
            JOIN information_schema.referential_constraints rc ON rc.constraint_name = tc.constraint_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'FOREIGN KEY'
            GROUP BY tc.constraint_name, ccu.table_schema, ccu.table_name, rc.delete_rule, rc.update_rule
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;
        for row in rows {
            let fk = ForeignKey {
                name: row.try_get(0)?,
                columns: row.try_get(1)?,
                referenced_schema: row.try_get(2)?,
                referenced_table: row.try_get(3)?,
                referenced_columns: row.try_get(4)?,
                on_delete: row.try_get(5)?,
                on_update: row.try_get(6)?,
            };
            table.foreign_keys.insert(fk.name.clone(), fk);
        }
        Ok(())
    }

    async fn extract_view_definition(&self, table: &mut Table) -> Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT view_definition::text, is_updatable::text, check_option::text
            FROM information_schema.views
            WHERE table_schema = $1 AND table_name = $2
        "#;

        let row = client
            .query_opt(query, &[&table.schema, &table.name])
            .await?
            .ok_or_else(|| {
                DriftError::SchemaExtraction(format!(
                    "view {}.{} not found in information_schema.views",
                    table.schema, table.name
                ))
            })?;
        let select_statement: Option<String> = row.try_get(0)?;
        let is_updatable: Option<String> = row.try_get(1)?;
        let check_option: Option<String> = row.try_get(2)?;

        table.view = Some(ViewDefinition {
            select_statement: select_statement.unwrap_or_default(),
            is_updatable: is_updatable.as_deref() == Some("YES"),
            check_option: check_option.unwrap_or_default(),
            ..Default::default()
        });
        Ok(())
    }

    /// Table/view comment via `obj_description`; failures degrade to empty.
    async fn table_comment(&self, name: &str) -> String {
        let query = r#"
            SELECT obj_description(pgc.oid)
            FROM pg_class pgc
            JOIN pg_namespace pgn ON pgc.relnamespace = pgn.oid
            WHERE pgn.nspname = $1 AND pgc.relname = $2
        "#;

        let Ok(client) = self.pool.get().await else {
            return String::new();
        };
        match client
            .query_opt(query, &[&self.cfg.table_schema, &name])
            .await
        {
            Ok(Some(row)) => row.try_get::<_, Option<String>>(0).ok().flatten().unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn batch_query(table: &str, cols: &[String], pk: &[String], last_pk_len: usize) -> String {
        let col_list = join_wrap(cols, "\"", ", ");
        let pk_list = join_wrap(pk, "\"", ", ");
        let mut query = format!("SELECT {} FROM \"{}\"", col_list, table);
        let mut arg_idx = 1;
        if last_pk_len > 0 {
            let placeholders: Vec<String> = (1..=last_pk_len).map(|i| format!("${}", i)).collect();
            query.push_str(&format!(" WHERE ({}) > ({})", pk_list, placeholders.join(", ")));
            arg_idx += last_pk_len;
        }
        query.push_str(&format!(" ORDER BY {} LIMIT ${}", pk_list, arg_idx));
        query
    }
}

fn to_sql_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(v) => Box::new(*v),
        SqlValue::Int(v) => Box::new(*v),
        SqlValue::Float(v) => Box::new(*v),
        SqlValue::Decimal(v) => Box::new(*v),
        SqlValue::Text(v) => Box::new(v.clone()),
        SqlValue::Bytes(v) => Box::new(v.clone()),
        SqlValue::Uuid(v) => Box::new(*v),
        SqlValue::Date(v) => Box::new(*v),
        SqlValue::Time(v) => Box::new(*v),
        SqlValue::DateTime(v) => Box::new(*v),
        SqlValue::DateTimeOffset(v) => Box::new(*v),
    }
}

/// Decode one cell by the column's catalog type, falling back through text
/// for anything unrecognized.
fn sql_value_from_row(row: &Row, idx: usize) -> SqlValue {
    let ty = row.columns()[idx].type_();
    match ty {
        t if *t == Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        t if *t == Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        t if *t == Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Float(v as f64))
            .unwrap_or(SqlValue::Null),
        t if *t == Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::NUMERIC => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null),
        t if *t == Type::JSON || *t == Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    }
}

#[async_trait]
impl DbAdapter for PostgresAdapter {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    fn table_schema(&self) -> &str {
        &self.cfg.table_schema
    }

    fn dbname(&self) -> &str {
        &self.cfg.dbname
    }

    async fn read_schema(&self) -> Result<DatabaseSchema> {
        let names: Vec<(String, String)> = {
            let client = self.pool.get().await?;
            let rows = client
                .query(
                    "SELECT table_name::text, table_type::text FROM information_schema.tables WHERE table_schema = $1",
                    &[&self.cfg.table_schema],
                )
                .await?;
            rows.iter()
                .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
                .collect::<Result<_>>()?
        };

        let mut schema = DatabaseSchema::default();
        for (name, table_type) in names {
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
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> =
            last_pk.iter().map(to_sql_param).collect();
        params.push(Box::new(limit as i64));
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        let rows = client.query(&query, &refs).await?;

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
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query_scalar_string(&self, sql: &str) -> Result<Option<String>> {
        let client = self.pool.get().await?;
        match client.query_opt(sql, &[]).await? {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn execute_rollback(&self, scripts: &[(String, String)]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        for (label, sql) in scripts {
            if let Err(e) = tx.batch_execute(sql).await {
                return Err(DriftError::migration(label.clone(), e.to_string()));
            }
        }
        tx.rollback().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
        if let Some(tunnel) = &self.tunnel {
            tunnel.stop();
        }
    }
}

/// Certificate verifier that accepts any certificate; the ssl flag requests
/// transport encryption, not server identity verification.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
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
        let query = PostgresAdapter::batch_query(
            "users",
            &strings(&["id", "name"]),
            &strings(&["id"]),
            0,
        );
        assert_eq!(
            query,
            "SELECT \"id\", \"name\" FROM \"users\" ORDER BY \"id\" LIMIT $1"
        );
    }

    #[test]
    fn test_batch_query_with_composite_cursor() {
        let query = PostgresAdapter::batch_query(
            "events",
            &strings(&["id", "sub", "payload"]),
            &strings(&["id", "sub"]),
            2,
        );
        assert_eq!(
            query,
            "SELECT \"id\", \"sub\", \"payload\" FROM \"events\" WHERE (\"id\", \"sub\") > ($1, $2) ORDER BY \"id\", \"sub\" LIMIT $3"
        );
    }
}
