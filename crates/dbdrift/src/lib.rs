//! # dbdrift
//!
//! Reconciles two relational databases by producing the SQL script that turns
//! the target into the source, for both schema (DDL) and data (DML), and
//! applies versioned migration scripts to a target database. MySQL and
//! PostgreSQL are supported, including cross-dialect comparison.
//!
//! The main pieces:
//!
//! - **Adapters** introspect `information_schema`/catalogs into a
//!   dialect-neutral model and stream rows in primary-key order.
//! - **Diff engines** compute structural changes between two schemas and
//!   merge-walk two PK-ordered row streams in bounded memory.
//! - **SQL generators** render both diffs into executable DDL/DML per target
//!   dialect.
//! - **Migration runner** discovers versioned script files, tracks applied
//!   versions in `schema_migrations`, and supports dry runs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbdrift::{generate_schema_sql, AdapterImpl, Config, DbAdapter};
//!
//! #[tokio::main]
//! async fn main() -> dbdrift::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let src = AdapterImpl::connect(&config.source_db).await?;
//!     let tgt = AdapterImpl::connect(&config.target_db).await?;
//!     let diff = dbdrift::compare_schemas_with_adapters(&src, &tgt).await?;
//!     for sql in generate_schema_sql(&diff, config.target_db.db_type) {
//!         println!("{}", sql);
//!     }
//!     src.close().await;
//!     tgt.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod core;
pub mod diff;
pub mod error;
pub mod migrate;
pub mod sqlgen;
pub mod tunnel;
pub mod util;

pub use adapter::{AdapterImpl, DbAdapter, MysqlAdapter, PostgresAdapter};
pub use config::{Config, ConnConfig, DbType, Rule, RuleSet, SshProxy};
pub use crate::core::{
    Column, DatabaseSchema, ForeignKey, Index, PrimaryKey, Record, SqlValue, Table, TableKind,
    ViewDefinition,
};
pub use diff::{
    compare_schemas, compare_schemas_with_adapters, create_compare_rule, stream_compare_data,
    stream_compare_to_diff, CompareRule, DataDiff, DiffType, FieldsEqualRule, ModifiedRow,
    SchemaDiff, TableDiff,
};
pub use error::{DriftError, Result};
pub use migrate::{scan_migrations, sort_migrations, MigrationFile, MigrationRunner};
pub use sqlgen::{generate_schema_sql, DialectImpl, SqlDialect};
pub use tunnel::{Endpoint, Tunnel};
