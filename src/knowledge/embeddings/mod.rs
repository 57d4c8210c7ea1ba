//! Text embedding backends.
//!
//! `EmbeddingService` runs a local fastembed (ONNX) model when the
//! `embeddings` feature is enabled. `HashingEmbedder` is a deterministic
//! feature-hashing fallback that needs no model download: identical text
//! always maps to the identical unit vector.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EmbeddingsConfig;

/// Opaque `text -> fixed-length vector` function.
///
/// Implementations are synchronous and may be CPU heavy; async callers run
/// them on the blocking pool.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed multiple texts (batch). Returns one vector per text.
    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty embedding result"))
    }
}

#[cfg(feature = "embeddings")]
pub use fast::EmbeddingService;

#[cfg(feature = "embeddings")]
mod fast {
    use super::Embedder;
    use anyhow::Result;
    use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
    use std::sync::Mutex;
    use tracing::info;

    /// Local embedding generation via fastembed (ONNX-based, no API key needed).
    pub struct EmbeddingService {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl EmbeddingService {
        /// Load embedding model. This downloads the model on first use.
        pub fn new(model_name: &str) -> Result<Self> {
            let (model_type, dimensions) = match model_name {
                "sentence-transformers/all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
                "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
                "intfloat/multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
                _ => {
                    anyhow::bail!(
                        "unsupported embedding model '{}'; use sentence-transformers/all-MiniLM-L6-v2, BAAI/bge-small-en-v1.5 or intfloat/multilingual-e5-small",
                        model_name
                    );
                }
            };

            let model = TextEmbedding::try_new(
                TextInitOptions::new(model_type).with_show_download_progress(true),
            )?;
            info!("embedding model loaded: {}", model_name);
            Ok(Self {
                model: Mutex::new(model),
                dimensions,
            })
        }
    }

    impl Embedder for EmbeddingService {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let docs: Vec<String> = texts.iter().map(std::string::ToString::to_string).collect();
            let mut model = self.model.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
            let embeddings = model.embed(docs, None)?;
            Ok(embeddings)
        }
    }
}

/// Weight of a whole-word feature relative to a character trigram.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic sha2 feature-hashing embedder over words and character trigrams.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut v, &format!("w:{}", word), WORD_WEIGHT);
            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut v, &format!("t:{}", trigram), TRIGRAM_WEIGHT);
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the configured embedder, falling back to hashing when the model
/// is disabled, not compiled in, or fails to load.
pub fn build_embedder(config: &EmbeddingsConfig) -> Arc<dyn Embedder> {
    if config.enabled {
        #[cfg(feature = "embeddings")]
        {
            match EmbeddingService::new(&config.model) {
                Ok(svc) => return Arc::new(svc),
                Err(e) => warn!("failed to initialize embedding service: {}", e),
            }
        }
        #[cfg(not(feature = "embeddings"))]
        {
            warn!(
                "embeddings enabled in config but the 'embeddings' feature is not compiled in; using hashing embedder"
            );
        }
    }
    info!(
        "using hashing embedder with {} dimensions",
        config.dimensions
    );
    Arc::new(HashingEmbedder::new(config.dimensions))
}

/// Cosine similarity between two vectors. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Map a cosine score to a similarity in `[0, 1]` via normalized cosine distance.
pub fn distance_to_similarity(cosine: f32) -> f32 {
    let distance = (1.0 - cosine).clamp(0.0, 1.0);
    1.0 - distance
}

/// Serialize an embedding vector to little-endian bytes for `SQLite` BLOB storage.
pub fn serialize_embedding(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for &val in v {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Deserialize an embedding from little-endian bytes.
pub fn deserialize_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "corrupt embedding blob: {} bytes is not a multiple of 4",
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
