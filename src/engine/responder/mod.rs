//! Reply engines for NORMAL turns.
//!
//! [`RetrievalAugmented`] runs classifier, similarity search, context and
//! cascade. [`TemplateOnly`] routes keywords to template categories and
//! needs nothing but the backup log. The service tries the first and falls
//! back to the second on any error.

use crate::engine::cascade::{self, Cascade, Rule};
use crate::engine::context::{ContextTracker, Stage};
use crate::engine::emotion::{EmotionLabel, classify};
use crate::engine::templates::{self, TemplateCategory};
use crate::errors::{CharmcrabError, CharmcrabResult};
use crate::knowledge::{KnowledgeIndex, SimilarityHit};
use crate::persona::{CharacterConfig, Language};
use crate::store::ConversationStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const RETRIEVAL_CONFIDENCE: f32 = 0.8;
pub const TEMPLATE_CONFIDENCE: f32 = 0.5;

/// One NORMAL turn as seen by an engine.
#[derive(Debug, Clone, Copy)]
pub struct TurnInput<'a> {
    pub user_id: &'a str,
    pub text: &'a str,
    /// Output of [`normalize_message`](crate::engine::emotion::normalize_message).
    pub normalized: &'a str,
    pub character: &'a CharacterConfig,
}

#[derive(Debug, Clone)]
pub struct EngineReply {
    pub reply_text: String,
    pub emotion: EmotionLabel,
    pub confidence: f32,
    /// Stage observed while answering, when the engine read context.
    pub stage: Option<Stage>,
    pub rule: Option<Rule>,
}

#[async_trait]
pub trait ResponseEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn respond(
        &self,
        turn: TurnInput<'_>,
        rng: &mut fastrand::Rng,
    ) -> CharmcrabResult<EngineReply>;
}

pub struct RetrievalAugmented {
    index: Arc<KnowledgeIndex>,
    context: Arc<ContextTracker>,
    cascade: Cascade,
    top_k: usize,
    embedding_timeout: Duration,
}

impl RetrievalAugmented {
    pub fn new(
        index: Arc<KnowledgeIndex>,
        context: Arc<ContextTracker>,
        cascade: Cascade,
        top_k: usize,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            index,
            context,
            cascade,
            top_k,
            embedding_timeout,
        }
    }

    /// Similarity hits, or none when the index errors or times out.
    async fn similar(&self, user_id: &str, text: &str, language: Language) -> Vec<SimilarityHit> {
        let result = match tokio::time::timeout(
            self.embedding_timeout,
            self.index.query(text, language, self.top_k),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CharmcrabError::timeout(
                "similarity query",
                self.embedding_timeout,
            )),
        };
        result.unwrap_or_else(|e| {
            warn!(
                user_id = %user_id,
                stage = "similarity",
                "continuing without similarity hits: {}",
                e
            );
            Vec::new()
        })
    }
}

#[async_trait]
impl ResponseEngine for RetrievalAugmented {
    fn name(&self) -> &'static str {
        "retrieval_augmented"
    }

    async fn respond(
        &self,
        turn: TurnInput<'_>,
        rng: &mut fastrand::Rng,
    ) -> CharmcrabResult<EngineReply> {
        if !self.index.is_ready() {
            return Err(CharmcrabError::EngineUnavailable(
                "similarity index not bootstrapped".into(),
            ));
        }

        let emotion = classify(turn.normalized);
        let language = turn.character.language();
        let (hits, context) = tokio::join!(
            self.similar(turn.user_id, turn.normalized, language),
            self.context.get_context(turn.user_id)
        );

        let decision = self.cascade.decide(
            turn.normalized,
            emotion,
            &context,
            &hits,
            turn.character,
            rng,
        );
        Ok(EngineReply {
            reply_text: decision.reply,
            emotion,
            confidence: RETRIEVAL_CONFIDENCE,
            stage: Some(context.stage),
            rule: Some(decision.rule),
        })
    }
}

/// Keyword routes in priority order. `None` means a country-specific answer.
const TEMPLATE_ROUTES: &[(Option<TemplateCategory>, &[&str])] = &[
    (
        Some(TemplateCategory::Greeting),
        &["привет", "hi", "hello", "хай", "здравствуй"],
    ),
    (None, &["откуда", "where", "город", "страна"]),
    (
        Some(TemplateCategory::Questions),
        &["как дела", "how are you", "что делаешь"],
    ),
    (
        Some(TemplateCategory::Flirt),
        &["красив", "beautiful", "сексуальн", "sexy"],
    ),
    (
        Some(TemplateCategory::Seductive),
        &["хочу", "want", "желаю", "desire"],
    ),
];

/// Template route for `normalized`: `Some(category)` or `None` for the
/// country answer.
pub fn route(normalized: &str) -> Option<TemplateCategory> {
    TEMPLATE_ROUTES
        .iter()
        .find(|(_, triggers)| triggers.iter().any(|t| normalized.contains(t)))
        .map_or(Some(TemplateCategory::DEFAULT), |(category, _)| *category)
}

pub struct TemplateOnly {
    store: Arc<dyn ConversationStore>,
    store_timeout: Duration,
}

impl TemplateOnly {
    pub fn new(store: Arc<dyn ConversationStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    async fn learned_answer(&self, turn: TurnInput<'_>, language: Language) -> Option<String> {
        if turn.normalized.is_empty() {
            return None;
        }
        match tokio::time::timeout(
            self.store_timeout,
            self.store.find_learned_answer(turn.normalized, language),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(user_id = %turn.user_id, stage = "learned_lookup", "backup log read failed: {}", e);
                None
            }
            Err(_) => {
                warn!(user_id = %turn.user_id, stage = "learned_lookup", "backup log read timed out");
                None
            }
        }
    }
}

#[async_trait]
impl ResponseEngine for TemplateOnly {
    fn name(&self) -> &'static str {
        "template_only"
    }

    async fn respond(
        &self,
        turn: TurnInput<'_>,
        rng: &mut fastrand::Rng,
    ) -> CharmcrabResult<EngineReply> {
        let emotion = classify(turn.normalized);
        let language = turn.character.language();
        let pack = templates::pack(language);

        if turn.character.learning_enabled
            && let Some(answer) = self.learned_answer(turn, language).await
        {
            debug!("template engine answered {} from backup log", turn.user_id);
            return Ok(EngineReply {
                reply_text: answer,
                emotion,
                confidence: TEMPLATE_CONFIDENCE,
                stage: None,
                rule: None,
            });
        }

        let reply_text = match route(turn.normalized) {
            Some(category) => cascade::sample(pack.category(category), rng).to_string(),
            None if pack.country_specific.is_empty() => {
                cascade::sample(pack.category(TemplateCategory::DEFAULT), rng).to_string()
            }
            None => {
                let (_, answer) = pack.country_specific[rng.usize(..pack.country_specific.len())];
                answer.to_string()
            }
        };
        Ok(EngineReply {
            reply_text,
            emotion,
            confidence: TEMPLATE_CONFIDENCE,
            stage: None,
            rule: None,
        })
    }
}
