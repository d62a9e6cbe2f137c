//! Configuration loading and management for abridge.
//!
//! Loads settings from `abridge.toml` with an environment variable override for the Hub token.
//! A missing file is not an error: every setting has a default.

use crate::chunker::ChunkMode;
use crate::models::ModelName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default cap on generated summary tokens
pub const DEFAULT_MAX_NEW_TOKENS: usize = 250;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("unknown model in config: {0}")]
    UnknownModel(String),
}

/// Model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub id of the model used at startup; must be in the allow-list
    pub default: String,
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
}

/// Chunking settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub mode: ChunkMode,
}

/// Hugging Face Hub access
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Where downloaded model files are cached (hf-hub default when unset)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl Config {
    /// Load configuration from the default location (abridge.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                let mut config = Config::default();
                config.override_token(std::env::var("HF_TOKEN").ok());
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;

        // Override the Hub token from the environment
        config.override_token(std::env::var("HF_TOKEN").ok());

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.default_model()?;
        Ok(config)
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from("abridge.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        let home_config = dirs::home_dir()?
            .join(".config")
            .join("abridge")
            .join("abridge.toml");
        home_config.exists().then_some(home_config)
    }

    fn override_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.hub.token = Some(token);
        }
    }

    /// The model selected at startup
    pub fn default_model(&self) -> Result<ModelName, ConfigError> {
        self.model
            .default
            .parse()
            .map_err(|_| ConfigError::UnknownModel(self.model.default.clone()))
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: ModelName::default().as_str().to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}
