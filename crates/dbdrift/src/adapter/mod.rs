//! Database adapters hiding engine specifics behind a uniform contract.
//!
//! Each adapter owns its connection pool and, when configured, the local
//! tunnel used to reach the server; both are released by [`DbAdapter::close`].
//! Dispatch is static through [`AdapterImpl`], keyed by the configured
//! database type.

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;

use async_trait::async_trait;

use crate::config::{ConnConfig, DbType};
use crate::core::schema::{DatabaseSchema, Table};
use crate::core::value::{Record, SqlValue};
use crate::error::Result;
use crate::tunnel::{Endpoint, Tunnel};

/// Number of ping attempts made before a connection counts as failed.
pub(crate) const PING_ATTEMPTS: usize = 3;

/// Spacing between ping attempts.
pub(crate) const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Uniform database access contract used by the diff engines and the
/// migration runner.
#[async_trait]
pub trait DbAdapter: Send + Sync {
    /// Dialect of this connection.
    fn db_type(&self) -> DbType;

    /// Logical schema the adapter introspects.
    fn table_schema(&self) -> &str;

    /// Database name of this connection.
    fn dbname(&self) -> &str;

    /// Enumerate base tables and views in the configured schema and extract
    /// each into the neutral model. Relations of unknown kind are skipped.
    async fn read_schema(&self) -> Result<DatabaseSchema>;

    /// Extract columns, primary key, indexes, foreign keys, and the table
    /// comment for one base table.
    async fn extract_table(&self, table: &str) -> Result<Table>;

    /// Extract columns and the view definition for one view.
    async fn extract_view(&self, view: &str) -> Result<Table>;

    /// Fetch up to `limit` rows ordered ascending by `pk`, restricted to
    /// `(pk) > (last_pk)` when `last_pk` is non-empty. Fails when `pk` is
    /// empty.
    async fn table_data_batch(
        &self,
        table: &str,
        cols: &[String],
        pk: &[String],
        last_pk: &[SqlValue],
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Execute a statement (or, for PostgreSQL, a statement batch).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run a query expected to yield at most one row with one text column.
    async fn query_scalar_string(&self, sql: &str) -> Result<Option<String>>;

    /// Execute labelled scripts inside a single transaction and roll back
    /// unconditionally. Errors carry the label of the failing script. This is
    /// the dry-run primitive of the migration runner.
    async fn execute_rollback(&self, scripts: &[(String, String)]) -> Result<()>;

    /// Release the connection pool and stop the tunnel when one was created.
    async fn close(&self);
}

/// Static dispatch over the supported adapters.
pub enum AdapterImpl {
    Mysql(MysqlAdapter),
    Postgres(PostgresAdapter),
}

impl AdapterImpl {
    /// Connect according to the configuration, opening a local tunnel first
    /// when an SSH proxy is configured.
    pub async fn connect(cfg: &ConnConfig) -> Result<AdapterImpl> {
        let mut cfg = cfg.clone();

        let tunnel = match &cfg.proxy {
            Some(proxy) => {
                let remote = Endpoint::new(cfg.host.clone(), cfg.port);
                let tunnel = Tunnel::open(proxy, remote).await?;
                cfg.host = tunnel.local().host.clone();
                cfg.port = tunnel.local().port;
                Some(tunnel)
            }
            None => None,
        };

        match cfg.db_type {
            DbType::Mysql => Ok(AdapterImpl::Mysql(MysqlAdapter::connect(cfg, tunnel).await?)),
            DbType::Postgres => Ok(AdapterImpl::Postgres(
                PostgresAdapter::connect(cfg, tunnel).await?,
            )),
        }
    }
}

#[async_trait]
impl DbAdapter for AdapterImpl {
    fn db_type(&self) -> DbType {
        match self {
            AdapterImpl::Mysql(a) => a.db_type(),
            AdapterImpl::Postgres(a) => a.db_type(),
        }
    }

    fn table_schema(&self) -> &str {
        match self {
            AdapterImpl::Mysql(a) => a.table_schema(),
            AdapterImpl::Postgres(a) => a.table_schema(),
        }
    }

    fn dbname(&self) -> &str {
        match self {
            AdapterImpl::Mysql(a) => a.dbname(),
            AdapterImpl::Postgres(a) => a.dbname(),
        }
    }

    async fn read_schema(&self) -> Result<DatabaseSchema> {
        match self {
            AdapterImpl::Mysql(a) => a.read_schema().await,
            AdapterImpl::Postgres(a) => a.read_schema().await,
        }
    }

    async fn extract_table(&self, table: &str) -> Result<Table> {
        match self {
            AdapterImpl::Mysql(a) => a.extract_table(table).await,
            AdapterImpl::Postgres(a) => a.extract_table(table).await,
        }
    }

    async fn extract_view(&self, view: &str) -> Result<Table> {
        match self {
            AdapterImpl::Mysql(a) => a.extract_view(view).await,
            AdapterImpl::Postgres(a) => a.extract_view(view).await,
        }
    }

    async fn table_data_batch(
        &self,
        table: &str,
        cols: &[String],
        pk: &[String],
        last_pk: &[SqlValue],
        limit: usize,
    ) -> Result<Vec<Record>> {
        match self {
            AdapterImpl::Mysql(a) => a.table_data_batch(table, cols, pk, last_pk, limit).await,
            AdapterImpl::Postgres(a) => a.table_data_batch(table, cols, pk, last_pk, limit).await,
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        match self {
            AdapterImpl::Mysql(a) => a.execute(sql).await,
            AdapterImpl::Postgres(a) => a.execute(sql).await,
        }
    }

    async fn query_scalar_string(&self, sql: &str) -> Result<Option<String>> {
        match self {
            AdapterImpl::Mysql(a) => a.query_scalar_string(sql).await,
            AdapterImpl::Postgres(a) => a.query_scalar_string(sql).await,
        }
    }

    async fn execute_rollback(&self, scripts: &[(String, String)]) -> Result<()> {
        match self {
            AdapterImpl::Mysql(a) => a.execute_rollback(scripts).await,
            AdapterImpl::Postgres(a) => a.execute_rollback(scripts).await,
        }
    }

    async fn close(&self) {
        match self {
            AdapterImpl::Mysql(a) => a.close().await,
            AdapterImpl::Postgres(a) => a.close().await,
        }
    }
}
