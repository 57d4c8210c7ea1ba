//! Message-count funnel: NORMAL, then one SEMI turn, then LAST forever.
//!
//! The counter is incremented on every turn before branching, and the new
//! value doubles as the exchange sequence number. With threshold `T`,
//! counts `1..=T` are NORMAL, `T + 1` is SEMI and anything above is LAST.

use crate::engine::templates;
use crate::errors::{CharmcrabError, CharmcrabResult};
use crate::persona::CharacterConfig;
use crate::store::{ConversationStore, SessionSettings};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelState {
    Normal,
    Semi,
    Last,
}

impl FunnelState {
    pub fn for_count(count: u64, threshold: u32) -> Self {
        let semi_at = u64::from(threshold) + 1;
        match count.cmp(&semi_at) {
            std::cmp::Ordering::Greater => Self::Last,
            std::cmp::Ordering::Equal => Self::Semi,
            std::cmp::Ordering::Less => Self::Normal,
        }
    }

    pub fn is_semi(self) -> bool {
        self == Self::Semi
    }

    pub fn is_last(self) -> bool {
        self == Self::Last
    }

    /// Fixed redirect text for SEMI/LAST, `None` for NORMAL.
    /// Empty configured texts fall back to the language pack defaults.
    pub fn redirect_text(self, character: &CharacterConfig) -> Option<String> {
        let pack = templates::pack(character.language());
        let pick = |configured: &str, default: &str| {
            if configured.trim().is_empty() {
                default.to_string()
            } else {
                configured.to_string()
            }
        };
        match self {
            Self::Normal => None,
            Self::Semi => Some(pick(&character.semi_message, pack.default_semi_message)),
            Self::Last => Some(pick(&character.last_message, pack.default_last_message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelStep {
    pub state: FunnelState,
    pub sequence_number: u64,
}

pub struct FunnelStateMachine {
    store: Arc<dyn ConversationStore>,
    timeout: Duration,
}

impl FunnelStateMachine {
    pub fn new(store: Arc<dyn ConversationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Atomically consume one count for `user_id` and classify the turn.
    ///
    /// Errors here are fatal to the turn: no safe default exists for the
    /// counter.
    pub async fn advance(
        &self,
        user_id: &str,
        character: &CharacterConfig,
    ) -> CharmcrabResult<FunnelStep> {
        let settings = SessionSettings {
            max_messages: character.message_count,
            semi_message: character.semi_message.clone(),
            last_message: character.last_message.clone(),
            language: character.language(),
            character_name: character.name.clone(),
        };

        let count = tokio::time::timeout(
            self.timeout,
            self.store.increment_message_count(user_id, &settings),
        )
        .await
        .map_err(|_| CharmcrabError::timeout("increment_message_count", self.timeout))?
        .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;

        let state = FunnelState::for_count(count, character.message_count);
        debug!(
            "funnel {} -> {:?} (count={}, threshold={})",
            user_id, state, count, character.message_count
        );
        Ok(FunnelStep {
            state,
            sequence_number: count,
        })
    }

    /// Delete the user's session so the next turn starts at count 1.
    pub async fn reset(&self, user_id: &str) -> CharmcrabResult<bool> {
        let existed = tokio::time::timeout(self.timeout, self.store.reset_user(user_id))
            .await
            .map_err(|_| CharmcrabError::timeout("reset_user", self.timeout))?
            .map_err(|e| CharmcrabError::StoreUnavailable(e.to_string()))?;
        info!("funnel reset for {} (session existed: {})", user_id, existed);
        Ok(existed)
    }
}
