pub mod embeddings;
pub mod index;

pub use embeddings::{Embedder, HashingEmbedder, build_embedder};
pub use index::{KnowledgeIndex, KnowledgeRecord, Provenance, ProvenanceCounts, SimilarityHit};
