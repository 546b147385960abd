//! Error types for the reconciliation library.

use thiserror::Error;

/// Main error type for diff and migration operations.
#[derive(Error, Debug)]
pub enum DriftError {
    /// Configuration error (invalid YAML/JSON, missing fields, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// MySQL driver error.
    #[error("mysql error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// PostgreSQL driver error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// PostgreSQL pool checkout error.
    #[error("postgres pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Connection could not be established after ping retries.
    #[error("connection to {db} failed: {message}")]
    Connection { db: String, message: String },

    /// Catalog introspection failed.
    #[error("schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Data diff requires a primary key on the compared table.
    #[error("table {0} has no primary key")]
    NoPrimaryKey(String),

    /// A migration script failed to apply or rehearse.
    #[error("migration {file} failed: {message}")]
    Migration { file: String, message: String },

    /// Local tunnel setup or shutdown failure.
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// IO error (migration files, output scripts).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriftError {
    /// Create a Connection error naming the database it concerns.
    pub fn connection(db: impl Into<String>, message: impl Into<String>) -> Self {
        DriftError::Connection {
            db: db.into(),
            message: message.into(),
        }
    }

    /// Create a Migration error naming the offending script.
    pub fn migration(file: impl Into<String>, message: impl Into<String>) -> Self {
        DriftError::Migration {
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DriftError>;
