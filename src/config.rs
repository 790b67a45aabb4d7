//! Workbench configuration
//!
//! Loaded from a YAML file (JSON configs are valid YAML). A missing file yields
//! the default configuration with no servers.

use std::path::{Path, PathBuf};

use annotation_core::CatalogRef;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ANNOTATION_WORKBENCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    pub debug: bool,
    pub servers: Vec<ServerConfig>,
    pub engine: EngineConfig,
}

impl WorkbenchConfig {
    /// First server flagged `default`, else the last one listed.
    pub fn selected_server(&self) -> Option<&ServerConfig> {
        self.servers
            .iter()
            .find(|s| s.default)
            .or_else(|| self.servers.last())
    }

    /// Server to connect to. An explicit hostname overrides the config file.
    pub fn resolve_server(&self, hostname: Option<&str>, catalog_id: Option<&str>) -> Option<ServerConfig> {
        match hostname {
            Some(host) => Some(ServerConfig::from_hostname(host, catalog_id.unwrap_or("1"))),
            None => self.selected_server().cloned(),
        }
        .filter(ServerConfig::is_valid)
    }

    /// Default log directive when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_catalog_id", deserialize_with = "deserialize_catalog_id")]
    pub catalog_id: String,
    #[serde(default)]
    pub default: bool,
}

fn default_protocol() -> String {
    "https".into()
}

fn default_catalog_id() -> String {
    "1".into()
}

/// Catalog ids are written as numbers or strings.
fn deserialize_catalog_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

impl ServerConfig {
    /// Accepts `host` or `scheme://host[/...]`.
    pub fn from_hostname(hostname: &str, catalog_id: &str) -> Self {
        let (protocol, rest) = match hostname.split_once("://") {
            Some((scheme, rest)) => (scheme.to_string(), rest),
            None => (default_protocol(), hostname),
        };
        let host = rest.split('/').next().unwrap_or(rest).to_string();
        Self {
            host,
            protocol,
            catalog_id: catalog_id.to_string(),
            default: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.catalog_id.is_empty()
    }

    pub fn catalog_ref(&self) -> CatalogRef {
        CatalogRef::new(format!("{}://{}", self.protocol, self.host), &self.catalog_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allow `validate` on the catalog root.
    pub validate_catalog_root: bool,
    /// Drop edits that restore the baseline value instead of recording them.
    pub drop_noop_edits: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_catalog_root: false,
            drop_noop_edits: true,
        }
    }
}

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path from `ANNOTATION_WORKBENCH_CONFIG`, else `fallback`.
    pub fn from_env(fallback: impl Into<PathBuf>) -> Self {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::new(path),
            _ => Self::new(fallback),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<WorkbenchConfig> {
        if !self.path.is_file() {
            info!("Configuration file {} not found, using defaults", self.path.display());
            return Ok(WorkbenchConfig::default());
        }
        info!("Loading configuration from {}", self.path.display());

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        if !value.is_mapping() {
            return Err(anyhow!(
                "{} does not contain a workbench configuration",
                self.path.display()
            ));
        }
        let config: WorkbenchConfig = serde_yaml::from_value(value)
            .with_context(|| format!("Invalid configuration in {}", self.path.display()))?;

        info!("Loaded {} server entries", config.servers.len());
        Ok(config)
    }
}
