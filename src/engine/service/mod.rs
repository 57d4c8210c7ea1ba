//! The turn pipeline and its lifecycle.
//!
//! `process_turn` parses the sender, advances the funnel, and either returns
//! a redirect or runs a [`ResponseEngine`], then persists the exchange and
//! optionally learns from it. Only the funnel counter, an unidentifiable
//! sender or an unusable persona fail a turn; every other collaborator
//! failure degrades to a local default.
//!
//! `preview` runs the same engines without counting, logging or learning.

use crate::config::{Config, EngineConfig};
use crate::engine::cascade::{self, Cascade};
use crate::engine::context::{ContextTracker, TurnCache};
use crate::engine::emotion::{EmotionLabel, normalize_message};
use crate::engine::funnel::FunnelStateMachine;
use crate::engine::learning::AutoLearner;
use crate::engine::responder::{
    EngineReply, ResponseEngine, RetrievalAugmented, TemplateOnly, TurnInput,
};
use crate::engine::templates::GeneratorKind;
use crate::errors::{CharmcrabError, CharmcrabResult};
use crate::knowledge::{KnowledgeIndex, ProvenanceCounts, build_embedder};
use crate::persona::{CharacterConfig, Language};
use crate::store::{ConversationStore, Exchange, SessionSettings, SqliteConversationStore};
use crate::utils::ensure_dir;
use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub const REDIRECT_CONFIDENCE: f32 = 1.0;
pub const FALLBACK_CONFIDENCE: f32 = 0.1;

/// Context owner for dry-run turns. Its log is only ever read.
const PREVIEW_USER: &str = "preview";

const DEFAULT_CACHE_USERS: NonZeroUsize = NonZeroUsize::new(1024).unwrap();

/// Result of one processed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub reply_text: String,
    pub sequence_number: u64,
    pub is_semi: bool,
    pub is_last: bool,
    pub emotion: EmotionLabel,
    pub confidence: f32,
}

/// Which engine answers NORMAL turns after [`ConversationService::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    RetrievalAugmented,
    TemplateOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackupCounts {
    pub auto_learned: u64,
    pub manual: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub total_users: u64,
    pub total_exchanges: u64,
    pub active_today: u64,
    /// Percentage of exchanges that were SEMI or LAST redirects.
    pub redirect_rate: f64,
    pub avg_messages_per_user: f64,
    pub top_emotions: Vec<LabelCount>,
    pub top_questions: Vec<LabelCount>,
    pub knowledge: ProvenanceCounts,
    pub learned_backup: BackupCounts,
}

/// Split an optional legacy `"<user_id>|<message>"` prefix.
///
/// A non-empty embedded id replaces `user_id`. Returns the effective id and
/// message text; an empty effective id is rejected.
pub fn parse_legacy_identity(user_id: &str, raw_message: &str) -> CharmcrabResult<(String, String)> {
    let (mut effective, message) = (user_id.trim().to_string(), raw_message.to_string());
    let message = match raw_message.split_once('|') {
        Some((embedded, rest)) => {
            let embedded = embedded.trim();
            if !embedded.is_empty() {
                if !effective.is_empty() && effective != embedded {
                    debug!(
                        "legacy message prefix overrides user id '{}' with '{}'",
                        effective, embedded
                    );
                }
                effective = embedded.to_string();
            }
            rest.to_string()
        }
        None => message,
    };
    if effective.is_empty() {
        return Err(CharmcrabError::MalformedInput(
            "cannot determine user id".into(),
        ));
    }
    Ok((effective, message))
}

pub struct ConversationService {
    config: EngineConfig,
    store: Arc<dyn ConversationStore>,
    index: Arc<KnowledgeIndex>,
    context: Arc<ContextTracker>,
    funnel: FunnelStateMachine,
    learner: AutoLearner,
    primary: Box<dyn ResponseEngine>,
    fallback: Box<dyn ResponseEngine>,
    rng: std::sync::Mutex<fastrand::Rng>,
    closed: AtomicBool,
}

impl ConversationService {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ConversationStore>,
        index: Arc<KnowledgeIndex>,
    ) -> Self {
        let cache = TurnCache::new(
            NonZeroUsize::new(config.cache_max_users).unwrap_or(DEFAULT_CACHE_USERS),
            config.cache_turns_per_user,
        );
        let context = Arc::new(ContextTracker::new(
            store.clone(),
            cache,
            config.context_window,
            config.store_timeout(),
        ));
        let funnel = FunnelStateMachine::new(store.clone(), config.store_timeout());
        let learner = AutoLearner::new(
            index.clone(),
            store.clone(),
            config.embedding_timeout(),
            config.store_timeout(),
        );
        let primary: Box<dyn ResponseEngine> = Box::new(RetrievalAugmented::new(
            index.clone(),
            context.clone(),
            Cascade::new(
                config.similarity_threshold,
                config.playful_suffix_probability,
            ),
            config.top_k,
            config.embedding_timeout(),
        ));
        let fallback: Box<dyn ResponseEngine> =
            Box::new(TemplateOnly::new(store.clone(), config.store_timeout()));
        let rng = config
            .rng_seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

        Self {
            config,
            store,
            index,
            context,
            funnel,
            learner,
            primary,
            fallback,
            rng: std::sync::Mutex::new(rng),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a service over `SQLite` files in the configured data directory.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let data_dir = ensure_dir(config.storage.data_dir())?;
        let store = SqliteConversationStore::open(data_dir.join("conversations.db"))
            .context("failed to open conversation store")?;
        let index = KnowledgeIndex::open(
            data_dir.join("knowledge.db"),
            build_embedder(&config.embeddings),
        )
        .context("failed to open knowledge index")?;
        Ok(Self::new(
            config.engine.clone(),
            Arc::new(store),
            Arc::new(index),
        ))
    }

    /// Seed the similarity index. On failure the service keeps answering
    /// with the template engine.
    pub async fn initialize(&self) -> EngineMode {
        match tokio::time::timeout(self.config.embedding_timeout() * 4, self.index.bootstrap())
            .await
        {
            Ok(Ok(seeded)) => {
                info!(
                    "conversation service ready (retrieval, {} seed records added)",
                    seeded
                );
                EngineMode::RetrievalAugmented
            }
            Ok(Err(e)) => {
                warn!("similarity index bootstrap failed, using templates only: {}", e);
                EngineMode::TemplateOnly
            }
            Err(_) => {
                warn!("similarity index bootstrap timed out, using templates only");
                EngineMode::TemplateOnly
            }
        }
    }

    pub fn mode(&self) -> EngineMode {
        if self.index.is_ready() {
            EngineMode::RetrievalAugmented
        } else {
            EngineMode::TemplateOnly
        }
    }

    /// Stop accepting turns. Idempotent.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("conversation service shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CharmcrabResult<()> {
        if self.is_closed() {
            return Err(CharmcrabError::EngineUnavailable(
                "service has been shut down".into(),
            ));
        }
        Ok(())
    }

    fn turn_rng(&self) -> fastrand::Rng {
        match self.rng.lock() {
            Ok(mut rng) => rng.fork(),
            Err(poisoned) => poisoned.into_inner().fork(),
        }
    }

    pub async fn process_turn(
        &self,
        user_id: &str,
        raw_message: &str,
        character: &CharacterConfig,
    ) -> CharmcrabResult<TurnReply> {
        self.ensure_open()?;
        character.validate()?;
        let (user_id, text) = parse_legacy_identity(user_id, raw_message)?;
        self.run_turn(&user_id, &text, character).await
    }

    /// [`process_turn`](Self::process_turn) for callers without a persona:
    /// the user's stored session settings are layered over `defaults`.
    pub async fn process_turn_with_session(
        &self,
        user_id: &str,
        raw_message: &str,
        defaults: &CharacterConfig,
    ) -> CharmcrabResult<TurnReply> {
        self.ensure_open()?;
        let (user_id, text) = parse_legacy_identity(user_id, raw_message)?;
        let character = self.session_persona(&user_id, defaults).await;
        character.validate()?;
        self.run_turn(&user_id, &text, &character).await
    }

    /// `defaults` with the funnel settings stored for `user_id`. A missing or
    /// unreadable session yields `defaults` unchanged.
    pub async fn session_persona(
        &self,
        user_id: &str,
        defaults: &CharacterConfig,
    ) -> CharacterConfig {
        let timeout = self.config.store_timeout();
        let session = match tokio::time::timeout(timeout, self.store.get_session(user_id)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(user_id = %user_id, stage = "session", "failed to read session settings: {}", e);
                None
            }
            Err(_) => {
                warn!(user_id = %user_id, stage = "session", "reading session settings timed out");
                None
            }
        };
        let mut character = defaults.clone();
        if let Some(session) = session {
            character.message_count = session.max_messages;
            character.semi_message = session.semi_message;
            character.last_message = session.last_message;
            character.language = session.language.code().to_string();
            character.name = session.character_name;
        }
        character
    }

    /// Store per-user funnel settings ahead of (or between) turns without
    /// consuming a count.
    pub async fn configure(
        &self,
        user_id: &str,
        settings: &SessionSettings,
    ) -> CharmcrabResult<()> {
        self.ensure_open()?;
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CharmcrabError::MalformedInput("empty user id".into()));
        }
        if settings.max_messages == 0 {
            return Err(CharmcrabError::MalformedInput(
                "max_messages must be greater than 0".into(),
            ));
        }
        let timeout = self.config.store_timeout();
        tokio::time::timeout(timeout, self.store.configure_session(user_id, settings))
            .await
            .map_err(|_| CharmcrabError::timeout("configure_session", timeout))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;
        info!(
            "configured session for {} (max_messages={}, language={})",
            user_id, settings.max_messages, settings.language
        );
        Ok(())
    }

    /// Dry run: answer `raw_message` as a NORMAL turn without advancing the
    /// funnel, logging the exchange or learning. `sequence_number` is 0.
    pub async fn preview(
        &self,
        raw_message: &str,
        character: &CharacterConfig,
    ) -> CharmcrabResult<TurnReply> {
        self.ensure_open()?;
        character.validate()?;
        let normalized = normalize_message(raw_message);
        let mut rng = self.turn_rng();
        if normalized.is_empty() {
            return Ok(Self::fallback_reply(0, character, &mut rng));
        }

        let turn = TurnInput {
            user_id: PREVIEW_USER,
            text: raw_message,
            normalized: &normalized,
            character,
        };
        let answer = self.respond(turn, &mut rng).await;
        Ok(TurnReply {
            reply_text: answer.reply_text,
            sequence_number: 0,
            is_semi: false,
            is_last: false,
            emotion: answer.emotion,
            confidence: answer.confidence,
        })
    }

    fn fallback_reply(
        sequence_number: u64,
        character: &CharacterConfig,
        rng: &mut fastrand::Rng,
    ) -> TurnReply {
        TurnReply {
            reply_text: cascade::generate(
                GeneratorKind::Fallback,
                character.language(),
                character,
                rng,
            ),
            sequence_number,
            is_semi: false,
            is_last: false,
            emotion: EmotionLabel::Neutral,
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    async fn run_turn(
        &self,
        user_id: &str,
        text: &str,
        character: &CharacterConfig,
    ) -> CharmcrabResult<TurnReply> {
        let step = self.funnel.advance(user_id, character).await.map_err(|e| {
            warn!(user_id = %user_id, stage = "funnel", "counter increment failed: {}", e);
            e
        })?;

        if let Some(redirect) = step.state.redirect_text(character) {
            let reply = TurnReply {
                reply_text: redirect,
                sequence_number: step.sequence_number,
                is_semi: step.state.is_semi(),
                is_last: step.state.is_last(),
                emotion: EmotionLabel::Redirect,
                confidence: REDIRECT_CONFIDENCE,
            };
            self.persist(user_id, text, "", &reply).await;
            return Ok(reply);
        }

        let normalized = normalize_message(text);
        let mut rng = self.turn_rng();

        if normalized.is_empty() {
            debug!("empty message from {}, using fallback reply", user_id);
            let reply = Self::fallback_reply(step.sequence_number, character, &mut rng);
            self.persist(user_id, text, &normalized, &reply).await;
            return Ok(reply);
        }

        let turn = TurnInput {
            user_id,
            text,
            normalized: &normalized,
            character,
        };
        let answer = self.respond(turn, &mut rng).await;

        let reply = TurnReply {
            reply_text: answer.reply_text,
            sequence_number: step.sequence_number,
            is_semi: false,
            is_last: false,
            emotion: answer.emotion,
            confidence: answer.confidence,
        };
        self.persist(user_id, text, &normalized, &reply).await;

        if let Some(stage) = answer.stage {
            let update = tokio::time::timeout(
                self.config.store_timeout(),
                self.store.set_stage(user_id, stage),
            )
            .await;
            if !matches!(update, Ok(Ok(()))) {
                warn!(user_id = %user_id, stage = "persist", "failed to record conversation stage");
            }
        }

        if character.learning_enabled {
            self.learner
                .learn(text, &reply.reply_text, character.language(), reply.emotion)
                .await;
        }

        Ok(reply)
    }

    /// Primary engine, then the template engine, then a fixed fallback line.
    async fn respond(&self, turn: TurnInput<'_>, rng: &mut fastrand::Rng) -> EngineReply {
        match self.primary.respond(turn, rng).await {
            Ok(reply) => return reply,
            Err(e) => debug!(
                "{} unavailable for {}, falling back to {}: {}",
                self.primary.name(),
                turn.user_id,
                self.fallback.name(),
                e
            ),
        }
        match self.fallback.respond(turn, rng).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user_id = %turn.user_id, stage = "respond", "all engines failed: {}", e);
                EngineReply {
                    reply_text: cascade::generate(
                        GeneratorKind::Fallback,
                        turn.character.language(),
                        turn.character,
                        rng,
                    ),
                    emotion: EmotionLabel::Neutral,
                    confidence: FALLBACK_CONFIDENCE,
                    stage: None,
                    rule: None,
                }
            }
        }
    }

    /// Append the exchange to the log and the turn cache. Failures are logged.
    async fn persist(&self, user_id: &str, text: &str, normalized: &str, reply: &TurnReply) {
        let exchange = Exchange {
            user_id: user_id.to_string(),
            input_text: text.to_string(),
            normalized_text: normalized.to_string(),
            detected_emotion: reply.emotion,
            reply_text: reply.reply_text.clone(),
            is_semi: reply.is_semi,
            is_last: reply.is_last,
            sequence_number: reply.sequence_number,
            confidence: reply.confidence,
            timestamp: Utc::now(),
        };
        match tokio::time::timeout(
            self.config.store_timeout(),
            self.store.insert_exchange(&exchange),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(user_id = %user_id, stage = "persist", "failed to log exchange: {}", e);
            }
            Err(_) => {
                warn!(user_id = %user_id, stage = "persist", "logging exchange timed out");
            }
        }
        self.context.record(&exchange).await;
    }

    /// Forget a user's funnel progress, exchange log and cached turns.
    pub async fn reset(&self, user_id: &str) -> CharmcrabResult<bool> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CharmcrabError::MalformedInput("empty user id".into()));
        }
        let existed = self.funnel.reset(user_id).await?;
        self.context.forget(user_id).await;
        Ok(existed)
    }

    /// Manually teach a question/answer pair.
    pub async fn train(
        &self,
        question: &str,
        answer: &str,
        language: Language,
    ) -> CharmcrabResult<String> {
        self.ensure_open()?;
        self.learner.train(question, answer, language).await
    }

    pub async fn stats(&self) -> CharmcrabResult<ServiceStats> {
        let timeout = self.config.store_timeout();
        let agg = tokio::time::timeout(timeout, self.store.aggregates())
            .await
            .map_err(|_| CharmcrabError::timeout("aggregates", timeout))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;
        let knowledge = tokio::time::timeout(timeout, self.index.count_by_provenance())
            .await
            .map_err(|_| CharmcrabError::timeout("knowledge counts", timeout))??;

        let ratio = |num: u64, den: u64| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let to_counts = |rows: Vec<(String, u64)>| -> Vec<LabelCount> {
            rows.into_iter()
                .map(|(label, count)| LabelCount { label, count })
                .collect()
        };

        Ok(ServiceStats {
            total_users: agg.total_users,
            total_exchanges: agg.total_exchanges,
            active_today: agg.active_today,
            redirect_rate: ratio(agg.redirect_exchanges, agg.total_exchanges) * 100.0,
            avg_messages_per_user: ratio(agg.total_exchanges, agg.total_users),
            top_emotions: to_counts(agg.top_emotions),
            top_questions: to_counts(agg.top_questions),
            knowledge,
            learned_backup: BackupCounts {
                auto_learned: agg.learned_auto,
                manual: agg.learned_manual,
            },
        })
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }
}
