//! Configuration management for cityquery
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat completion service configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Semantic index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Analytical database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// SQL sanitizer configuration
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// File locations, relative to the config file directory
    #[serde(default)]
    pub files: FilesConfig,

    /// Resolved paths (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Seconds to wait after a rate-limit response before retrying
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    /// Retries after a rate-limit response
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    /// Apply the rate-limit retry to per-question embeddings too, not just index build
    #[serde(default)]
    pub retry_at_query_time: bool,
}

/// Chat completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

/// Semantic index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Candidate tables fetched per question (only the nearest is used)
    #[serde(default = "default_index_candidates")]
    pub candidates: usize,

    /// Maximum cosine distance (0.0 - 2.0) for a table to match
    #[serde(default = "default_index_max_distance")]
    pub max_distance: f32,
}

/// Analytical database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the ingested datasets
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Query timeout in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

/// SQL sanitizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Literal phrases whose apostrophe must be doubled before execution
    #[serde(default = "default_sanitizer_phrases")]
    pub phrases: Vec<String>,
}

/// User-editable file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_catalog_file")]
    pub catalog: String,

    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,

    #[serde(default = "default_query_log_file")]
    pub query_log: String,

    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for cityquery data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    pub catalog_file: PathBuf,
    pub prompts_dir: PathBuf,
    pub data_file: PathBuf,
    pub query_log_file: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_embedding_timeout(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            rate_limit_retries: default_rate_limit_retries(),
            retry_at_query_time: false,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            model: default_completion_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            candidates: default_index_candidates(),
            max_distance: default_index_max_distance(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            phrases: default_sanitizer_phrases(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog_file(),
            prompts_dir: default_prompts_dir(),
            query_log: default_query_log_file(),
            export_dir: default_export_dir(),
        }
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

impl CompletionConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

impl Config {
    /// Get the default base directory for cityquery (~/.cityquery)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cityquery")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Resolve every configured file against a base directory
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        let resolve = |p: &str| {
            let path = PathBuf::from(p);
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            catalog_file: resolve(&self.files.catalog),
            prompts_dir: resolve(&self.files.prompts_dir),
            data_file: resolve(&self.database.data_file),
            query_log_file: resolve(&self.files.query_log),
            export_dir: resolve(&self.files.export_dir),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.init_paths(Some(base));
        config.paths.config_file = config_path.to_path_buf();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir.clone());

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.init_paths(base_dir);
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.index.candidates == 0 {
            return Err(Error::Config(
                "index.candidates must be at least 1".to_string(),
            ));
        }

        if self.index.max_distance <= 0.0 || self.index.max_distance > 2.0 {
            return Err(Error::Config(
                "index.max_distance must be in (0.0, 2.0]".to_string(),
            ));
        }

        if self.embedding.rate_limit_cooldown_secs == 0 {
            return Err(Error::Config(
                "embedding.rate_limit_cooldown_secs must be positive".to_string(),
            ));
        }

        if self.completion.temperature < 0.0 || self.completion.temperature > 2.0 {
            return Err(Error::Config(
                "completion.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        for phrase in &self.sanitizer.phrases {
            if !phrase.contains('\'') {
                return Err(Error::Config(format!(
                    "sanitizer phrase '{}' has no apostrophe to escape",
                    phrase
                )));
            }
            if phrase.contains("''") {
                return Err(Error::Config(format!(
                    "sanitizer phrase '{}' is already escaped",
                    phrase
                )));
            }
        }

        Ok(())
    }
}
