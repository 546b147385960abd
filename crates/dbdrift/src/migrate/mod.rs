//! Migration runner: deterministic, resumable application of ordered script
//! files with bookkeeping in the `schema_migrations` table.

mod files;

pub use files::{parse_migration_file, scan_migrations, sort_migrations, MigrationFile};

use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;

use tracing::{error, info};

use crate::adapter::DbAdapter;
use crate::config::DbType;
use crate::error::{DriftError, Result};
use crate::util::{clean_transaction, compare_version};

const MYSQL_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id INT AUTO_INCREMENT PRIMARY KEY,
    version VARCHAR(255) NOT NULL,
    title VARCHAR(255),
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    execution_time INT,
    status VARCHAR(50) DEFAULT 'success'
)";

const POSTGRES_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id SERIAL PRIMARY KEY,
    version VARCHAR(255) NOT NULL,
    title VARCHAR(255),
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    execution_time INTEGER,
    status VARCHAR(50) DEFAULT 'success'
)";

/// Applies versioned migration scripts to one target database.
pub struct MigrationRunner<'a> {
    adapter: &'a dyn DbAdapter,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(adapter: &'a dyn DbAdapter) -> Self {
        Self { adapter }
    }

    /// Discover, order, and apply (or rehearse) the pending scripts in `dir`
    /// up to `target_version`. With no target, the greatest discovered
    /// version is used.
    pub async fn run(&self, dir: &Path, target_version: Option<&str>, dry_run: bool) -> Result<()> {
        info!("running migrations from {:?}", dir);
        let mut files = scan_migrations(dir)?;
        sort_migrations(&mut files);

        self.ensure_version_table().await?;
        let current = self.current_version().await?;
        info!("current version: {:?}", current);

        let target = match target_version {
            Some(v) => v.to_string(),
            None => files.last().map(|f| f.version.clone()).unwrap_or_default(),
        };
        if !target.is_empty() && compare_version(&current, &target) != Ordering::Less {
            info!(
                "current version {:?} already at or past target {:?}, nothing to apply",
                current, target
            );
            return Ok(());
        }

        let pending = select_pending(&files, &current, &target);
        info!("{} pending migration file(s)", pending.len());

        if dry_run {
            self.dry_run(&pending).await
        } else {
            self.apply(&pending).await
        }
    }

    /// Create the bookkeeping table when missing.
    pub async fn ensure_version_table(&self) -> Result<()> {
        let ddl = match self.adapter.db_type() {
            DbType::Mysql => MYSQL_VERSION_TABLE,
            DbType::Postgres => POSTGRES_VERSION_TABLE,
        };
        self.adapter.execute(ddl).await
    }

    /// Most recent successfully applied version; empty when none.
    pub async fn current_version(&self) -> Result<String> {
        let version = self
            .adapter
            .query_scalar_string(
                "SELECT version FROM schema_migrations WHERE status = 'success' ORDER BY id DESC LIMIT 1",
            )
            .await?;
        Ok(version.unwrap_or_default())
    }

    /// Execute each file, recording a bookkeeping row per outcome. Aborts at
    /// the first failing file after writing its failure row.
    pub async fn apply(&self, files: &[&MigrationFile]) -> Result<()> {
        for file in files {
            let name = file.display_name();
            info!("applying {}", name);
            if let Err(e) = self.apply_one(file).await {
                error!("migration {} failed: {}", name, e);
                return Err(e);
            }
        }
        info!("migrations applied");
        Ok(())
    }

    async fn apply_one(&self, file: &MigrationFile) -> Result<()> {
        let name = file.display_name();
        let content = file.content()?;
        let start = Instant::now();
        let exec_result = self.adapter.execute(&content).await;
        let exec_ms = start.elapsed().as_millis() as i64;

        match exec_result {
            Ok(()) => {
                self.adapter
                    .execute(&insert_history_sql(
                        &file.version,
                        &file.title,
                        Some(exec_ms),
                        None,
                    ))
                    .await
            }
            Err(e) => {
                // Best effort; the original failure wins.
                let _ = self
                    .adapter
                    .execute(&insert_history_sql(
                        &file.version,
                        &file.title,
                        Some(exec_ms),
                        Some("failed"),
                    ))
                    .await;
                Err(DriftError::migration(name, e.to_string()))
            }
        }
    }

    /// Rehearse every file inside a single transaction that is always rolled
    /// back. Nested `BEGIN`/`COMMIT` statements are stripped from the scripts
    /// first; the bookkeeping inserts are rehearsed too.
    pub async fn dry_run(&self, files: &[&MigrationFile]) -> Result<()> {
        info!("rehearsing {} migration file(s) in a rollback transaction", files.len());
        let mut scripts = Vec::new();
        for file in files {
            let name = file.display_name();
            scripts.push((name.clone(), clean_transaction(&file.content()?)));
            scripts.push((
                name,
                insert_history_sql(&file.version, &file.title, None, None),
            ));
        }
        self.adapter.execute_rollback(&scripts).await?;
        info!("dry run succeeded");
        Ok(())
    }

    /// Drop and recreate the database (MySQL) or schema (PostgreSQL).
    pub async fn reset_database(&self) -> Result<()> {
        match self.adapter.db_type() {
            DbType::Mysql => {
                let db = self.adapter.dbname().to_string();
                info!("resetting database {}", db);
                self.adapter
                    .execute(&format!("DROP DATABASE IF EXISTS {}", db))
                    .await?;
                self.adapter.execute(&format!("CREATE DATABASE {}", db)).await
            }
            DbType::Postgres => {
                let schema = self.adapter.table_schema().to_string();
                info!("resetting schema {}", schema);
                self.adapter
                    .execute(&format!("DROP SCHEMA {} CASCADE", schema))
                    .await?;
                self.adapter.execute(&format!("CREATE SCHEMA {}", schema)).await
            }
        }
    }
}

/// Files strictly newer than `current` and, when `target` is non-empty, at
/// most `target`.
pub fn select_pending<'f>(
    files: &'f [MigrationFile],
    current: &str,
    target: &str,
) -> Vec<&'f MigrationFile> {
    files
        .iter()
        .filter(|f| compare_version(&f.version, current) == Ordering::Greater)
        .filter(|f| target.is_empty() || compare_version(&f.version, target) != Ordering::Greater)
        .collect()
}

fn sql_quote(s: &str) -> String {
    s.replace('\'', "''")
}

fn insert_history_sql(
    version: &str,
    title: &str,
    exec_ms: Option<i64>,
    status: Option<&str>,
) -> String {
    match (exec_ms, status) {
        (Some(ms), Some(status)) => format!(
            "INSERT INTO schema_migrations (version, title, execution_time, status) VALUES ('{}', '{}', {}, '{}')",
            sql_quote(version),
            sql_quote(title),
            ms,
            sql_quote(status)
        ),
        (Some(ms), None) => format!(
            "INSERT INTO schema_migrations (version, title, execution_time) VALUES ('{}', '{}', {})",
            sql_quote(version),
            sql_quote(title),
            ms
        ),
        _ => format!(
            "INSERT INTO schema_migrations (version, title) VALUES ('{}', '{}')",
            sql_quote(version),
            sql_quote(title)
        ),
    }
}
