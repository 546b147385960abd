//! Configuration loading: YAML for connections, JSON for comparison rules.

mod types;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load the application configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse the application configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

impl RuleSet {
    /// Load comparison rules from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse comparison rules from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: RuleSet = serde_json::from_str(json)?;
        Ok(rules)
    }
}
