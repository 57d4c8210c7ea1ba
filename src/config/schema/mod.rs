use crate::engine::context::Stage;
use crate::errors::CharmcrabError;
use crate::persona::CharacterConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_false() -> bool {
    false
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_top_k() -> usize {
    5
}

fn default_context_window() -> usize {
    5
}

fn default_cache_turns_per_user() -> usize {
    10
}

fn default_cache_max_users() -> usize {
    1024
}

fn default_playful_suffix_probability() -> f64 {
    0.3
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_embedding_timeout_ms() -> u64 {
    3000
}

/// Tunables for the response pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Similarity above which a stored reply is returned verbatim.
    #[serde(
        default = "default_similarity_threshold",
        rename = "similarityThreshold"
    )]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k", rename = "topK")]
    pub top_k: usize,
    /// Number of recent exchanges the context tracker reads. At least
    /// [`Stage::ADVANCED_AFTER`], or the advanced stage is unreachable.
    #[serde(default = "default_context_window", rename = "contextWindow")]
    pub context_window: usize,
    #[serde(
        default = "default_cache_turns_per_user",
        rename = "cacheTurnsPerUser"
    )]
    pub cache_turns_per_user: usize,
    #[serde(default = "default_cache_max_users", rename = "cacheMaxUsers")]
    pub cache_max_users: usize,
    #[serde(
        default = "default_playful_suffix_probability",
        rename = "playfulSuffixProbability"
    )]
    pub playful_suffix_probability: f64,
    #[serde(default = "default_store_timeout_ms", rename = "storeTimeoutMs")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_embedding_timeout_ms", rename = "embeddingTimeoutMs")]
    pub embedding_timeout_ms: u64,
    /// Fixed seed for reply sampling. `None` seeds from entropy.
    #[serde(default, rename = "rngSeed")]
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            context_window: default_context_window(),
            cache_turns_per_user: default_cache_turns_per_user(),
            cache_max_users: default_cache_max_users(),
            playful_suffix_probability: default_playful_suffix_probability(),
            store_timeout_ms: default_store_timeout_ms(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

fn default_storage_path() -> String {
    "~/.charmcrab/data".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the conversation and knowledge databases.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        crate::utils::expand_home(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

fn default_embeddings_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Load the fastembed model. When false the hashing embedder is used.
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_embeddings_model")]
    pub model: String,
    /// Vector length for the hashing embedder.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embeddings_model(),
            dimensions: default_embedding_dimensions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Persona used when a request carries no character config.
    #[serde(default)]
    pub persona: CharacterConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), CharmcrabError> {
        self.validate_engine()?;
        self.validate_persona()?;
        self.validate_embeddings()?;
        self.validate_gateway()?;
        Ok(())
    }

    fn validate_engine(&self) -> Result<(), CharmcrabError> {
        let e = &self.engine;
        if !(e.similarity_threshold > 0.0 && e.similarity_threshold <= 1.0) {
            return Err(CharmcrabError::Config(format!(
                "engine.similarityThreshold must be in (0, 1], got {}",
                e.similarity_threshold
            )));
        }
        if e.top_k == 0 {
            return Err(CharmcrabError::Config(
                "engine.topK must be greater than 0".into(),
            ));
        }
        if e.context_window < Stage::ADVANCED_AFTER
            || e.cache_turns_per_user < Stage::ADVANCED_AFTER
        {
            return Err(CharmcrabError::Config(format!(
                "engine.contextWindow and engine.cacheTurnsPerUser must be at least {}",
                Stage::ADVANCED_AFTER
            )));
        }
        if e.cache_max_users == 0 {
            return Err(CharmcrabError::Config(
                "engine.cacheMaxUsers must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&e.playful_suffix_probability) {
            return Err(CharmcrabError::Config(format!(
                "engine.playfulSuffixProbability must be in [0, 1], got {}",
                e.playful_suffix_probability
            )));
        }
        if e.store_timeout_ms == 0 || e.embedding_timeout_ms == 0 {
            return Err(CharmcrabError::Config(
                "engine.storeTimeoutMs and engine.embeddingTimeoutMs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_persona(&self) -> Result<(), CharmcrabError> {
        self.persona
            .validate()
            .map_err(|e| CharmcrabError::Config(format!("persona: {}", e)))
    }

    fn validate_embeddings(&self) -> Result<(), CharmcrabError> {
        if self.embeddings.dimensions == 0 {
            return Err(CharmcrabError::Config(
                "embeddings.dimensions must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), CharmcrabError> {
        if self.gateway.port == 0 {
            return Err(CharmcrabError::Config(
                "gateway.port must be greater than 0".into(),
            ));
        }
        if self.gateway.host.trim().is_empty() {
            return Err(CharmcrabError::Config(
                "gateway.host must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
