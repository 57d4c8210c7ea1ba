//! Embedding-backed nearest-neighbour store of (text, response) pairs.
//!
//! Records live in a `SQLite` table with their embedding as a BLOB. A query
//! embeds the input, scans the vectors of the requested language, and ranks
//! them by cosine similarity. The table is small (seed corpus plus learned
//! pairs), so a linear scan is sufficient.

use crate::engine::emotion::EmotionLabel;
use crate::engine::templates::SEED_CORPUS;
use crate::errors::{CharmcrabError, CharmcrabResult};
use crate::knowledge::embeddings::{
    Embedder, cosine_similarity, deserialize_embedding, distance_to_similarity, serialize_embedding,
};
use crate::persona::Language;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Origin of a knowledge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Seed,
    Manual,
    AutoLearned,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Manual => "manual",
            Self::AutoLearned => "auto_learned",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Manual => "manual",
            Self::AutoLearned => "learned",
        }
    }
}

impl std::str::FromStr for Provenance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seed" => Ok(Self::Seed),
            "manual" => Ok(Self::Manual),
            "auto_learned" => Ok(Self::AutoLearned),
            other => anyhow::bail!("unknown provenance '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeRecord {
    pub id: String,
    pub source_text: String,
    pub response_text: String,
    pub emotion: EmotionLabel,
    pub language: Language,
    pub provenance: Provenance,
}

/// One ranked query result. `similarity` is in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityHit {
    pub source_text: String,
    pub response_text: String,
    pub emotion: EmotionLabel,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceCounts {
    pub total: u64,
    pub seed: u64,
    pub manual: u64,
    pub auto_learned: u64,
}

/// Synchronous `SQLite` access for the knowledge table.
pub struct KnowledgeDb {
    conn: std::sync::Mutex<Connection>,
}

impl KnowledgeDb {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;",
        )?;
        let db = Self {
            conn: std::sync::Mutex::new(conn),
        };
        db.ensure_schema().with_context(|| {
            format!(
                "Failed to initialize knowledge schema at: {}",
                db_path.display()
            )
        })?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS knowledge_entries (
                id TEXT PRIMARY KEY,
                source_text TEXT NOT NULL,
                response_text TEXT NOT NULL,
                emotion TEXT NOT NULL,
                language TEXT NOT NULL,
                provenance TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_knowledge_language ON knowledge_entries(language);",
        )?;
        Ok(())
    }

    pub fn insert(&self, record: &KnowledgeRecord, embedding: &[f32]) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.execute(
            "INSERT INTO knowledge_entries
                (id, source_text, response_text, emotion, language, provenance, embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.source_text,
                record.response_text,
                record.emotion.as_str(),
                record.language.code(),
                record.provenance.as_str(),
                serialize_embedding(embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert many records in one transaction.
    pub fn insert_batch(&self, rows: &[(KnowledgeRecord, Vec<f32>)]) -> Result<usize> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO knowledge_entries
                    (id, source_text, response_text, emotion, language, provenance, embedding, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (record, embedding) in rows {
                inserted += stmt.execute(params![
                    record.id,
                    record.source_text,
                    record.response_text,
                    record.emotion.as_str(),
                    record.language.code(),
                    record.provenance.as_str(),
                    serialize_embedding(embedding),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// All `(source, response, emotion, embedding)` rows for one language.
    pub fn vectors_for_language(
        &self,
        language: Language,
    ) -> Result<Vec<(String, String, String, Vec<u8>)>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT source_text, response_text, emotion, embedding
             FROM knowledge_entries WHERE language = ?",
        )?;
        let rows: Result<Vec<_>, _> = stmt
            .query_map([language.code()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect();
        rows.map_err(|e| anyhow::anyhow!("Failed to read knowledge vectors: {}", e))
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    }

    pub fn count_by_provenance(&self) -> Result<ProvenanceCounts> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let mut stmt = conn
            .prepare("SELECT provenance, COUNT(*) FROM knowledge_entries GROUP BY provenance")?;
        let rows: Result<Vec<(String, i64)>, _> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect();

        let mut counts = ProvenanceCounts::default();
        for (provenance, n) in rows? {
            let n = n as u64;
            counts.total += n;
            match provenance.parse::<Provenance>() {
                Ok(Provenance::Seed) => counts.seed += n,
                Ok(Provenance::Manual) => counts.manual += n,
                Ok(Provenance::AutoLearned) => counts.auto_learned += n,
                Err(e) => warn!("{}", e),
            }
        }
        Ok(counts)
    }
}

/// Async similarity index over [`KnowledgeDb`] and an [`Embedder`].
///
/// Embedding and `SQLite` work run on the blocking pool. Embedder failures
/// surface as [`CharmcrabError::EmbeddingUnavailable`], storage failures as
/// [`CharmcrabError::StoreUnavailable`].
pub struct KnowledgeIndex {
    db: Arc<KnowledgeDb>,
    embedder: Arc<dyn Embedder>,
    ready: AtomicBool,
}

impl KnowledgeIndex {
    pub fn new(db: KnowledgeDb, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            db: Arc::new(db),
            embedder,
            ready: AtomicBool::new(false),
        }
    }

    pub fn open(db_path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(KnowledgeDb::new(db_path)?, embedder))
    }

    /// Whether [`bootstrap`](Self::bootstrap) has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Seed the fixed bilingual corpus when the index is empty.
    /// Returns the number of records inserted.
    pub async fn bootstrap(&self) -> CharmcrabResult<usize> {
        let existing = self.count().await?;
        if existing > 0 {
            debug!("knowledge index already holds {} records", existing);
            self.ready.store(true, Ordering::Release);
            return Ok(0);
        }

        let texts: Vec<&'static str> = SEED_CORPUS.iter().map(|e| e.text).collect();
        let embedder = self.embedder.clone();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_texts(&texts))
            .await
            .map_err(|e| CharmcrabError::EmbeddingUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::EmbeddingUnavailable(e.to_string()))?;

        let rows: Vec<(KnowledgeRecord, Vec<f32>)> = SEED_CORPUS
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (entry, vector))| {
                (
                    KnowledgeRecord {
                        id: format!("seed_{}", i),
                        source_text: entry.text.to_string(),
                        response_text: entry.response.to_string(),
                        emotion: entry.emotion,
                        language: entry.language,
                        provenance: Provenance::Seed,
                    },
                    vector,
                )
            })
            .collect();

        let db = self.db.clone();
        let inserted = tokio::task::spawn_blocking(move || db.insert_batch(&rows))
            .await
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;

        self.ready.store(true, Ordering::Release);
        info!("knowledge index seeded with {} records", inserted);
        Ok(inserted)
    }

    /// Embed `text` and store a new record. Every call gets a fresh id.
    pub async fn insert(
        &self,
        text: &str,
        response: &str,
        emotion: EmotionLabel,
        language: Language,
        provenance: Provenance,
    ) -> CharmcrabResult<String> {
        let vector = self.embed(text).await?;
        let record = KnowledgeRecord {
            id: format!("{}_{}", provenance.id_prefix(), uuid::Uuid::new_v4().simple()),
            source_text: text.to_string(),
            response_text: response.to_string(),
            emotion,
            language,
            provenance,
        };
        let id = record.id.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.insert(&record, &vector))
            .await
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;
        Ok(id)
    }

    /// Top-`k` records for `language`, ordered by descending similarity.
    pub async fn query(
        &self,
        text: &str,
        language: Language,
        k: usize,
    ) -> CharmcrabResult<Vec<SimilarityHit>> {
        let query_vector = self.embed(text).await?;
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.vectors_for_language(language))
            .await
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;

        let mut hits: Vec<SimilarityHit> = rows
            .into_iter()
            .filter_map(|(source_text, response_text, emotion, blob)| {
                let vector = match deserialize_embedding(&blob) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("skipping corrupted knowledge embedding: {}", e);
                        return None;
                    }
                };
                let similarity = distance_to_similarity(cosine_similarity(&query_vector, &vector));
                Some(SimilarityHit {
                    source_text,
                    response_text,
                    emotion: emotion.parse().unwrap_or(EmotionLabel::Neutral),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn count(&self) -> CharmcrabResult<u64> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.count())
            .await
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))
    }

    pub async fn count_by_provenance(&self) -> CharmcrabResult<ProvenanceCounts> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.count_by_provenance())
            .await
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))
    }

    async fn embed(&self, text: &str) -> CharmcrabResult<Vec<f32>> {
        let embedder = self.embedder.clone();
        let text = text.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| CharmcrabError::EmbeddingUnavailable(e.to_string()))?
            .map_err(|e| CharmcrabError::EmbeddingUnavailable(e.to_string()))?;
        if vector.len() != self.embedder.dimensions() {
            return Err(CharmcrabError::EmbeddingUnavailable(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }
        Ok(vector)
    }
}
