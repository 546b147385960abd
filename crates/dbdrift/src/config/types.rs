//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mysql,
    Postgres,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbType::Mysql => write!(f, "mysql"),
            DbType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Root configuration: one source and one target connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "sourceDb")]
    pub source_db: ConnConfig,

    #[serde(rename = "targetDb")]
    pub target_db: ConnConfig,
}

/// One database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnConfig {
    /// Dialect of this connection.
    #[serde(rename = "type")]
    pub db_type: DbType,

    pub host: String,

    pub port: u16,

    pub user: String,

    pub password: String,

    /// Database name.
    pub dbname: String,

    /// Logical schema to introspect. MySQL conflates this with `dbname`;
    /// PostgreSQL defaults to `public` when empty.
    #[serde(rename = "tableSchema", default)]
    pub table_schema: String,

    #[serde(default)]
    pub ssl: bool,

    /// Extra connection parameters, appended as `?k=v&...` where the driver
    /// accepts a parameter string.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_yaml::Value>,

    /// Optional SSH hop; when set, the adapter connects through a local
    /// forwarder instead of `host:port` directly.
    #[serde(default)]
    pub proxy: Option<SshProxy>,
}

impl ConnConfig {
    /// Render `extra` as a `?k=v&...` parameter string; empty when no extras.
    pub fn extra_string(&self) -> String {
        if self.extra.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .extra_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("?{}", parts.join("&"))
    }

    /// `extra` flattened to string pairs in key order.
    pub fn extra_pairs(&self) -> Vec<(String, String)> {
        self.extra
            .iter()
            .map(|(k, v)| (k.clone(), yaml_scalar(v)))
            .collect()
    }

    pub fn contains_extra(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra
            .insert(key.into(), serde_yaml::Value::String(value.into()));
    }
}

fn yaml_scalar(v: &serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

impl fmt::Debug for ConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnConfig")
            .field("type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("dbname", &self.dbname)
            .field("table_schema", &self.table_schema)
            .field("ssl", &self.ssl)
            .field("extra", &self.extra)
            .field("proxy", &self.proxy)
            .finish()
    }
}

/// SSH hop description for the tunnel boundary.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SshProxy {
    pub host: String,

    pub port: u16,

    pub user: String,

    /// Authentication type: `pass` or `rsa`.
    #[serde(rename = "type")]
    pub auth_type: String,

    #[serde(default)]
    pub pass: String,

    /// RSA private key content.
    #[serde(rename = "rsaKey", default)]
    pub rsa_key: String,

    /// Path to an RSA private key file.
    #[serde(rename = "rsaKeyPath", default)]
    pub rsa_key_path: String,

    /// Passphrase for the RSA private key.
    #[serde(rename = "rsaKeyPassword", default)]
    pub rsa_key_password: String,
}

impl fmt::Debug for SshProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshProxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("auth_type", &self.auth_type)
            .field("pass", &"[REDACTED]")
            .field("rsa_key_path", &self.rsa_key_path)
            .finish()
    }
}

/// One data-diff comparison rule.
///
/// `comparison_key` names the columns whose equality defines "unchanged";
/// it is the MODIFY predicate, not the primary key. An empty list means
/// every column of the target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub table: String,

    #[serde(rename = "comparisonKey", default)]
    pub comparison_key: Vec<String>,
}

/// The set of comparison rules loaded from the rules JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}
