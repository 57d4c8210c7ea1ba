//! Per-user conversation context derived from recent exchanges.
//!
//! The durable exchange log is the source of truth. `TurnCache` keeps the
//! last few turns per user in memory and is only consulted when the log
//! cannot be read.

use crate::engine::emotion::EmotionLabel;
use crate::errors::CharmcrabError;
use crate::store::{ConversationStore, Exchange};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Coarse conversation maturity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Beginning,
    Developing,
    Advanced,
}

impl Stage {
    /// Prior exchanges needed to reach [`Stage::Advanced`]. A context window
    /// smaller than this never sees an advanced conversation.
    pub const ADVANCED_AFTER: usize = 4;

    /// Stage for a number of prior exchanges: more than 3 is advanced,
    /// 2 or 3 is developing.
    pub fn from_prior_exchanges(count: usize) -> Self {
        match count {
            0 | 1 => Self::Beginning,
            2 | 3 => Self::Developing,
            _ => Self::Advanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginning => "beginning",
            Self::Developing => "developing",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "beginning" => Ok(Self::Beginning),
            "developing" => Ok(Self::Developing),
            "advanced" => Ok(Self::Advanced),
            other => anyhow::bail!("unknown stage '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicTag {
    Meeting,
    Photos,
    Video,
}

const TOPIC_TRIGGERS: &[(TopicTag, &[&str])] = &[
    (TopicTag::Meeting, &["встреч", "meet"]),
    (TopicTag::Photos, &["фото", "photo"]),
    (TopicTag::Video, &["видео", "video"]),
];

/// Topic tags whose trigger substrings occur in `text`.
pub fn topics_in(text: &str) -> impl Iterator<Item = TopicTag> + '_ {
    let lowered = text.to_lowercase();
    TOPIC_TRIGGERS
        .iter()
        .filter(move |(_, triggers)| triggers.iter().any(|t| lowered.contains(t)))
        .map(|(tag, _)| *tag)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationContext {
    pub recent_topics: BTreeSet<TopicTag>,
    /// Oldest first.
    pub emotion_history: Vec<EmotionLabel>,
    pub stage: Stage,
}

impl ConversationContext {
    /// Build from `(input_text, emotion)` pairs ordered newest first.
    pub fn derive<'a>(newest_first: impl IntoIterator<Item = (&'a str, EmotionLabel)>) -> Self {
        let mut recent_topics = BTreeSet::new();
        let mut emotion_history = Vec::new();
        for (input, emotion) in newest_first {
            recent_topics.extend(topics_in(input));
            emotion_history.push(emotion);
        }
        let stage = Stage::from_prior_exchanges(emotion_history.len());
        emotion_history.reverse();
        Self {
            recent_topics,
            emotion_history,
            stage,
        }
    }

    pub fn from_exchanges(newest_first: &[Exchange]) -> Self {
        Self::derive(
            newest_first
                .iter()
                .map(|e| (e.input_text.as_str(), e.detected_emotion)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CachedTurn {
    pub input_text: String,
    pub reply_text: String,
    pub emotion: EmotionLabel,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Exchange> for CachedTurn {
    fn from(e: &Exchange) -> Self {
        Self {
            input_text: e.input_text.clone(),
            reply_text: e.reply_text.clone(),
            emotion: e.detected_emotion,
            sequence_number: e.sequence_number,
            timestamp: e.timestamp,
        }
    }
}

/// Bounded recent-turn cache: LRU over users, FIFO over each user's turns.
pub struct TurnCache {
    inner: Mutex<LruCache<String, VecDeque<CachedTurn>>>,
    turns_per_user: usize,
}

impl TurnCache {
    pub fn new(max_users: NonZeroUsize, turns_per_user: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_users)),
            turns_per_user: turns_per_user.max(1),
        }
    }

    pub async fn push(&self, user_id: &str, turn: CachedTurn) {
        let mut cache = self.inner.lock().await;
        if let Some(turns) = cache.get_mut(user_id) {
            turns.push_back(turn);
            while turns.len() > self.turns_per_user {
                turns.pop_front();
            }
        } else {
            let mut turns = VecDeque::with_capacity(self.turns_per_user);
            turns.push_back(turn);
            cache.put(user_id.to_string(), turns);
        }
    }

    /// Up to `limit` cached turns, newest first.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Vec<CachedTurn> {
        let mut cache = self.inner.lock().await;
        cache
            .get(user_id)
            .map(|turns| turns.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn evict(&self, user_id: &str) {
        self.inner.lock().await.pop(user_id);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Reads recent exchanges and derives [`ConversationContext`].
pub struct ContextTracker {
    store: Arc<dyn ConversationStore>,
    cache: TurnCache,
    window: usize,
    timeout: Duration,
}

impl ContextTracker {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        cache: TurnCache,
        window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            window: window.max(1),
            timeout,
        }
    }

    /// Context from the durable log. Falls back to the in-memory cache,
    /// then to an empty context, when the log cannot be read in time.
    pub async fn get_context(&self, user_id: &str) -> ConversationContext {
        match self.read_log(user_id).await {
            Ok(exchanges) => ConversationContext::from_exchanges(&exchanges),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    stage = "context",
                    "exchange log unavailable, using cached turns: {}",
                    e
                );
                let cached = self.cache.recent(user_id, self.window).await;
                ConversationContext::derive(
                    cached.iter().map(|t| (t.input_text.as_str(), t.emotion)),
                )
            }
        }
    }

    async fn read_log(&self, user_id: &str) -> Result<Vec<Exchange>, CharmcrabError> {
        match tokio::time::timeout(
            self.timeout,
            self.store.recent_exchanges(user_id, self.window),
        )
        .await
        {
            Ok(Ok(exchanges)) => Ok(exchanges),
            Ok(Err(e)) => Err(CharmcrabError::StoreUnavailable(e.to_string())),
            Err(_) => Err(CharmcrabError::timeout("recent_exchanges", self.timeout)),
        }
    }

    /// Remember a just-persisted turn.
    pub async fn record(&self, exchange: &Exchange) {
        self.cache
            .push(&exchange.user_id, CachedTurn::from(exchange))
            .await;
    }

    pub async fn forget(&self, user_id: &str) {
        debug!("evicting cached turns for {}", user_id);
        self.cache.evict(user_id).await;
    }
}
