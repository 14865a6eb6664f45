//! Configuration loading and management

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct SourcesConfig {
    /// Root of the snapshot tree
    pub documents_dir: PathBuf,
    /// Directory of metadata feed pages (*.json)
    pub feed_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_skip_malformed")]
    pub skip_malformed: bool,
    pub max_documents: Option<usize>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            skip_malformed: default_skip_malformed(),
            max_documents: None,
        }
    }
}

fn default_skip_malformed() -> bool {
    true
}

impl Config {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
