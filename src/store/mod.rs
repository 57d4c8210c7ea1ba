//! Durable conversation state: exchange log, per-user sessions, and the
//! learned-pair backup log.

pub mod sqlite;

use crate::engine::context::Stage;
use crate::engine::emotion::EmotionLabel;
use crate::persona::Language;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use sqlite::{ConversationDb, SqliteConversationStore};

/// One processed turn. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user_id: String,
    pub input_text: String,
    pub normalized_text: String,
    pub detected_emotion: EmotionLabel,
    pub reply_text: String,
    pub is_semi: bool,
    pub is_last: bool,
    pub sequence_number: u64,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Latest caller-supplied funnel settings, written on every increment and
/// by explicit session configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_messages: u32,
    pub semi_message: String,
    pub last_message: String,
    pub language: Language,
    pub character_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub user_id: String,
    pub message_count: u64,
    pub max_messages: u32,
    pub semi_message: String,
    pub last_message: String,
    pub language: Language,
    pub character_name: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backup copy of a learned or manually trained pair.
#[derive(Debug, Clone)]
pub struct LearnedEntry {
    pub question: String,
    pub answer: String,
    pub language: Language,
    pub emotion: EmotionLabel,
    pub auto_learned: bool,
}

/// Raw counts and groupings over the log, before derived percentages.
#[derive(Debug, Clone, Default)]
pub struct StoreAggregates {
    pub total_users: u64,
    pub total_exchanges: u64,
    pub active_today: u64,
    pub redirect_exchanges: u64,
    pub top_emotions: Vec<(String, u64)>,
    pub top_questions: Vec<(String, u64)>,
    pub learned_auto: u64,
    pub learned_manual: u64,
}

/// Storage backend for conversation state.
///
/// `increment_message_count` must be a single atomic increment-and-read:
/// concurrent turns for one user each observe a distinct count.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the session if absent, bump its counter by one, refresh its
    /// settings, and return the new count.
    async fn increment_message_count(&self, user_id: &str, settings: &SessionSettings)
    -> Result<u64>;

    async fn get_session(&self, user_id: &str) -> Result<Option<SessionState>>;

    /// Upsert the funnel settings without touching the counter.
    async fn configure_session(&self, user_id: &str, settings: &SessionSettings) -> Result<()>;

    async fn set_stage(&self, user_id: &str, stage: Stage) -> Result<()>;

    async fn insert_exchange(&self, exchange: &Exchange) -> Result<()>;

    /// Most recent exchanges for a user, newest first.
    async fn recent_exchanges(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>>;

    /// Delete the session and exchanges of a user. Returns whether a session existed.
    async fn reset_user(&self, user_id: &str) -> Result<bool>;

    async fn insert_learned(&self, entry: &LearnedEntry) -> Result<()>;

    /// Newest backup answer whose question contains `needle`.
    async fn find_learned_answer(&self, needle: &str, language: Language)
    -> Result<Option<String>>;

    async fn aggregates(&self) -> Result<StoreAggregates>;
}
