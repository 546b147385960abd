//! Migration file discovery, parsing, and ordering.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::util::compare_version;

/// One discovered migration script.
///
/// `direction` is `"up"`, `"down"`, or empty; `ext` is `"sql"` or `"json"`.
/// JSON scripts are read verbatim and sent to the driver like SQL.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub version: String,
    pub title: String,
    pub direction: String,
    pub ext: String,
    pub path: PathBuf,
    pub content: Option<String>,
}

impl MigrationFile {
    /// Script content, read from disk on first access unless cached.
    pub fn content(&self) -> Result<String> {
        match &self.content {
            Some(content) => Ok(content.clone()),
            None => Ok(std::fs::read_to_string(&self.path)?),
        }
    }

    /// `version__title` identity used in logs and error messages.
    pub fn display_name(&self) -> String {
        format!("{}__{}", self.version, self.title)
    }
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([vV]\d+(?:\.\d+)*|\d+)__([^.]+)(?:\.(up|down))?\.(sql|json)$")
            .expect("static regex")
    })
}

/// Parse a migration file name; `None` when the name does not match the
/// `v<version>__<title>[.up|.down].(sql|json)` pattern.
pub fn parse_migration_file(path: &Path) -> Option<MigrationFile> {
    let name = path.file_name()?.to_str()?;
    let captures = file_name_pattern().captures(name)?;

    Some(MigrationFile {
        version: captures.get(1)?.as_str().to_string(),
        title: captures.get(2)?.as_str().to_string(),
        direction: captures.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        ext: captures.get(4)?.as_str().to_string(),
        path: path.to_path_buf(),
        content: None,
    })
}

/// Scan a directory tree for migration files. Nested directories are walked;
/// non-matching names are silently skipped.
pub fn scan_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut files = Vec::new();
    walk_migrations(dir, &mut files)?;
    Ok(files)
}

fn walk_migrations(dir: &Path, files: &mut Vec<MigrationFile>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_migrations(&path, files)?;
        } else if file_type.is_file() {
            match parse_migration_file(&path) {
                Some(file) => files.push(file),
                None => debug!("skipping non-migration file {:?}", path),
            }
        }
    }
    Ok(())
}

/// Order by version under the dotted-numeric comparator; within one version,
/// `down` scripts precede `up` scripts.
pub fn sort_migrations(files: &mut [MigrationFile]) {
    files.sort_by(|a, b| {
        if a.version == b.version {
            if a.direction == "down" && b.direction == "up" {
                return Ordering::Less;
            }
            if a.direction == "up" && b.direction == "down" {
                return Ordering::Greater;
            }
            return Ordering::Equal;
        }
        compare_version(&a.version, &b.version)
    });
}
