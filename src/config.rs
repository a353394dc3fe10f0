//! Server configuration, persisted as TOML.
//!
//! Routes listed under `[inclusions]` pass straight through to the named
//! concept without entering the rule engine; each entry carries a short
//! justification for why that is safe (e.g. a public lookup). Every
//! other route is turned into a `Requesting.request` cascade.

use std::collections::BTreeMap;
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::DEFAULT_MAX_DEPTH;

/// Errors from configuration handling.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(weft::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(weft::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(weft::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum dispatch depth before a cascade is aborted.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Passthrough routes, `route -> justification`. Everything not
    /// listed here goes through the rule engine.
    #[serde(default = "default_inclusions")]
    pub inclusions: BTreeMap<String, String>,
}

fn default_listen() -> String {
    "127.0.0.1:8000".into()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_inclusions() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "/Dictionary/translateTermFromL1".to_string(),
            "public dictionary lookup".to_string(),
        ),
        (
            "/Dictionary/translateTermFromL2".to_string(),
            "public dictionary lookup".to_string(),
        ),
    ])
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_depth: default_max_depth(),
            inclusions: default_inclusions(),
        }
    }
}

impl WeftConfig {
    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save this config as pretty TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ConfigWrite {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Whether a route bypasses the engine.
    pub fn is_passthrough(&self, route: &str) -> bool {
        self.inclusions.contains_key(route)
    }
}
