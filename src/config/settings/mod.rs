#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub dimension: u32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum number of vectors the index will ever hold. The index does
    /// not resize online, so this must cover the expected corpus.
    pub capacity: usize,
    /// Neighbors fetched per seed like when scoring a user's feed.
    pub neighbors: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            neighbors: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    /// How many of a user's most recent likes seed their feed.
    pub seed_likes: usize,
    /// Neighborhood size when matching a new item against past likes.
    pub new_item_neighbors: usize,
    /// How many users receive a team request per new item.
    pub team_request_users: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            seed_likes: 5,
            new_item_neighbors: 50,
            team_request_users: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid index capacity: {0} (must be greater than zero)")]
    InvalidIndexCapacity(usize),
    #[error("Invalid neighbor count: {0} (must be between 1 and 1000)")]
    InvalidNeighborCount(usize),
    #[error("Invalid poll interval: {0} (must be between 1 and 3600 seconds)")]
    InvalidPollInterval(u64),
    #[error("Invalid seed like count: {0} (must be between 1 and 100)")]
    InvalidSeedLikes(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedder: EmbedderConfig::default(),
                index: IndexConfig::default(),
                worker: WorkerConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedder.validate()?;

        if self.index.capacity == 0 {
            return Err(ConfigError::InvalidIndexCapacity(self.index.capacity));
        }

        if self.index.neighbors == 0 || self.index.neighbors > 1000 {
            return Err(ConfigError::InvalidNeighborCount(self.index.neighbors));
        }

        if self.worker.poll_interval_secs == 0 || self.worker.poll_interval_secs > 3600 {
            return Err(ConfigError::InvalidPollInterval(
                self.worker.poll_interval_secs,
            ));
        }

        if self.worker.seed_likes == 0 || self.worker.seed_likes > 100 {
            return Err(ConfigError::InvalidSeedLikes(self.worker.seed_likes));
        }

        if self.worker.new_item_neighbors == 0 || self.worker.new_item_neighbors > 1000 {
            return Err(ConfigError::InvalidNeighborCount(
                self.worker.new_item_neighbors,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("recs-worker"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("recs.db")
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }

    pub fn embedder_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
