//! Configuration management for inkrag
//!
//! Every tunable of the chunker, cache, hybrid ranker and context optimizer
//! lives here. Files are TOML; `INKRAG_SECTION__KEY` environment variables
//! override individual values after loading.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Schema version written into new configuration files
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Markdown chunker token thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Chunks estimated below this are dropped (except a document's tail)
    pub min_tokens: usize,
    /// Target size; code blocks may grow to twice this
    pub default_tokens: usize,
    /// Hard ceiling for a single chunk
    pub max_tokens: usize,
    /// Trailing tokens carried into the next chunk
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: 50,
            default_tokens: 500,
            max_tokens: 1500,
            overlap_tokens: 50,
        }
    }
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    /// Maximum number of cached queries (FIFO eviction beyond this)
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            max_entries: 5,
        }
    }
}

/// Hybrid ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the normalized BM25 score
    pub keyword_weight: f64,
    /// Weight of the normalized vector similarity
    pub semantic_weight: f64,
    /// Share of the final score given to file freshness
    pub freshness_weight: f64,
    /// Hybrid queries are backfilled up to this many results
    pub min_hybrid_results: usize,
    /// Files modified within this many hours get full freshness
    pub freshness_full_hours: u64,
    /// Files older than this many days get zero freshness
    pub freshness_zero_days: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.4,
            semantic_weight: 0.6,
            freshness_weight: 0.15,
            min_hybrid_results: 3,
            freshness_full_hours: 6,
            freshness_zero_days: 30,
        }
    }
}

/// Context optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total tokens in the target model's context window
    pub context_window: usize,
    /// Fraction of the window retrieved context may occupy
    pub reserve_percent: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window: 4096,
            reserve_percent: 0.70,
        }
    }
}

/// Project walking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Directory names never indexed nor returned from queries
    pub excluded_dirs: Vec<String>,
    /// File extensions treated as documents (without the dot)
    pub extensions: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: [
                ".inkwell_rag",
                ".debug",
                ".git",
                "node_modules",
                "__pycache__",
                "venv",
                ".venv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extensions: vec!["md".to_string(), "txt".to_string()],
        }
    }
}

impl RagConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: RagConfig = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the default location,
    /// falling back to built-in defaults when no file exists there
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path()?;
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: INKRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("INKRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CACHE__TTL_SECONDS" => self.cache.ttl_seconds = parse_env(path, value)?,
            "CACHE__MAX_ENTRIES" => self.cache.max_entries = parse_env(path, value)?,
            "CONTEXT__CONTEXT_WINDOW" => self.context.context_window = parse_env(path, value)?,
            "CONTEXT__RESERVE_PERCENT" => self.context.reserve_percent = parse_env(path, value)?,
            "RETRIEVAL__MIN_HYBRID_RESULTS" => {
                self.retrieval.min_hybrid_results = parse_env(path, value)?
            }
            "CHUNKING__MAX_TOKENS" => self.chunking.max_tokens = parse_env(path, value)?,
            "CHUNKING__MIN_TOKENS" => self.chunking.min_tokens = parse_env(path, value)?,
            "INDEXING__EXCLUDED_DIRS" => {
                self.indexing.excluded_dirs = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("inkrag").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            chunking: ChunkingConfig::default(),
            cache: CacheConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}
