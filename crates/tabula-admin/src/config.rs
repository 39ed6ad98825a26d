//! Engine configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabula_core::{Result, TabulaError};

/// Admin engine settings, read from `admin.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Include the failing SQL in query and DDL error messages
    pub debug: bool,
    /// Page size of freshly created table handles
    pub page_size: u64,
    /// Lifetime of cached unfiltered row counts
    pub record_count_ttl_secs: u64,
    /// Prefix of the change tracking tables
    pub history_table_prefix: String,
    /// Where export files are written; the system temp dir when unset
    pub export_dir: Option<PathBuf>,
    /// Role that bypasses grant checks and may alter the schema
    pub admin_role: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            debug: false,
            page_size: 10,
            record_count_ttl_secs: 300,
            history_table_prefix: "tabula_".to_string(),
            export_dir: None,
            admin_role: "administrator".to_string(),
        }
    }
}

impl AdminConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| TabulaError::Configuration(format!("Invalid admin configuration: {}", e)))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no admin config file, using defaults");
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read admin config: {:?}", path))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("Failed to parse admin config: {:?}", path))?;
        tracing::info!(path = %path.display(), "loaded admin config");
        Ok(config)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        dirs::config_dir()
            .context("Could not determine config directory")
            .map(|p| p.join("tabula").join("admin.toml"))
    }

    pub fn record_count_ttl(&self) -> Duration {
        Duration::from_secs(self.record_count_ttl_secs)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn changesets_table(&self) -> String {
        format!("{}changesets", self.history_table_prefix)
    }

    pub fn changes_table(&self) -> String {
        format!("{}changes", self.history_table_prefix)
    }
}
