//! Router configuration.

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_alias() -> String {
    "default".to_string()
}

/// Database routing settings.
///
/// ```json
/// { "default_alias": "default", "replicas": { "default": "replica" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Alias used when a query does not name a database
    #[serde(default = "default_alias")]
    pub default_alias: String,
    /// Primary alias -> read replica alias
    #[serde(default)]
    pub replicas: HashMap<String, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_alias: default_alias(),
            replicas: HashMap::new(),
        }
    }
}

impl RouterConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid router configuration: {}", e),
                source: Some(Box::new(e)),
            })
        })?;
        if config.default_alias.is_empty() {
            return Err(Error::Config(ConfigError {
                message: "default_alias must not be empty".to_string(),
                source: None,
            }));
        }
        Ok(config)
    }

    /// Route reads for `primary` to `replica`.
    pub fn replica(mut self, primary: impl Into<String>, replica: impl Into<String>) -> Self {
        self.replicas.insert(primary.into(), replica.into());
        self
    }
}
