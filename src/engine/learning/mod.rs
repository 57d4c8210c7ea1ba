//! Append-only memorisation of question/answer pairs.
//!
//! Each learn event writes the similarity index and the backup log.
//! Auto-learning swallows failures. Manual training reports a failed index
//! write; a failed backup write never fails a learn event.

use crate::engine::emotion::{EmotionLabel, normalize_message};
use crate::errors::{CharmcrabError, CharmcrabResult};
use crate::knowledge::{KnowledgeIndex, Provenance};
use crate::persona::Language;
use crate::store::{ConversationStore, LearnedEntry};
use crate::utils::truncate_chars;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AutoLearner {
    index: Arc<KnowledgeIndex>,
    store: Arc<dyn ConversationStore>,
    embedding_timeout: Duration,
    store_timeout: Duration,
}

impl AutoLearner {
    pub fn new(
        index: Arc<KnowledgeIndex>,
        store: Arc<dyn ConversationStore>,
        embedding_timeout: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            index,
            store,
            embedding_timeout,
            store_timeout,
        }
    }

    /// Best-effort: failures are logged and never returned. Reports whether
    /// either write landed.
    pub async fn learn(
        &self,
        input_text: &str,
        reply_text: &str,
        language: Language,
        emotion: EmotionLabel,
    ) -> bool {
        let question = normalize_message(input_text);
        if question.is_empty() {
            return false;
        }

        let indexed = match self
            .write_index(&question, reply_text, emotion, language, Provenance::AutoLearned)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(stage = "learn", "failed to learn into similarity index: {}", e);
                false
            }
        };

        let entry = LearnedEntry {
            question: question.clone(),
            answer: reply_text.to_string(),
            language,
            emotion,
            auto_learned: true,
        };
        let backed_up = match self.write_backup(&entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(stage = "learn", "failed to write learned backup: {}", e);
                false
            }
        };

        if indexed || backed_up {
            info!("learned: {}", truncate_chars(&question, 50));
        }
        indexed || backed_up
    }

    /// Manually teach a pair. Returns the new knowledge record id once the
    /// index holds it, even if the backup write fails.
    pub async fn train(
        &self,
        question: &str,
        answer: &str,
        language: Language,
    ) -> CharmcrabResult<String> {
        let normalized = normalize_message(question);
        if normalized.is_empty() || answer.trim().is_empty() {
            return Err(CharmcrabError::MalformedInput(
                "question and answer must be non-empty".into(),
            ));
        }

        let id = self
            .write_index(
                &normalized,
                answer,
                EmotionLabel::Neutral,
                language,
                Provenance::Manual,
            )
            .await?;
        let entry = LearnedEntry {
            question: normalized.clone(),
            answer: answer.to_string(),
            language,
            emotion: EmotionLabel::Neutral,
            auto_learned: false,
        };
        if let Err(e) = self.write_backup(&entry).await {
            warn!(stage = "learn", "trained {} but backup write failed: {}", id, e);
        }

        info!("trained {}: {}", id, truncate_chars(&normalized, 50));
        Ok(id)
    }

    async fn write_index(
        &self,
        question: &str,
        answer: &str,
        emotion: EmotionLabel,
        language: Language,
        provenance: Provenance,
    ) -> CharmcrabResult<String> {
        tokio::time::timeout(
            self.embedding_timeout,
            self.index
                .insert(question, answer, emotion, language, provenance),
        )
        .await
        .map_err(|_| CharmcrabError::timeout("knowledge insert", self.embedding_timeout))?
    }

    async fn write_backup(&self, entry: &LearnedEntry) -> CharmcrabResult<()> {
        tokio::time::timeout(self.store_timeout, self.store.insert_learned(entry))
            .await
            .map_err(|_| CharmcrabError::timeout("insert_learned", self.store_timeout))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))
    }
}
