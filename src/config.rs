use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::coverage::{HealthReporting, Thresholds};

pub const CONFIG_FILE: &str = "coverwatch.toml";
pub const DEFAULT_DB_NAME: &str = ".coverwatch.db";
pub const DEFAULT_ARTIFACTS_DIR: &str = ".coverwatch/builds";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project: Project,
    #[serde(default)]
    pub coverage: CoverageConfig,
    /// Health reporting is off when this table is missing
    #[serde(default)]
    pub health: Option<Thresholds>,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverageConfig {
    /// Glob, or a `;`, `:` or `,` separated list of files and folders.
    /// Empty means search the workspace for `report.html`.
    #[serde(default)]
    pub includes: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DB_NAME)
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACTS_DIR)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| format!("Failed to parse {}", CONFIG_FILE))
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            anyhow::bail!("Project name must not be empty");
        }

        Ok(())
    }

    pub fn health_reporting(&self) -> HealthReporting {
        HealthReporting::from(self.health)
    }

    /// Storage paths resolved against the directory holding the config file
    pub fn database_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.storage.database)
    }

    pub fn artifacts_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.storage.artifacts_dir)
    }
}
