// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use anyhow::Result;
use async_trait::async_trait;
use charmcrab::config::EngineConfig;
use charmcrab::engine::ConversationService;
use charmcrab::engine::context::Stage;
use charmcrab::knowledge::{Embedder, HashingEmbedder, KnowledgeIndex};
use charmcrab::persona::{CharacterConfig, Language};
use charmcrab::store::{
    ConversationStore, Exchange, LearnedEntry, SessionSettings, SessionState,
    SqliteConversationStore, StoreAggregates,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Hashing embedder that starts failing once `fail` is set.
pub struct SwitchableEmbedder {
    inner: HashingEmbedder,
    pub fail: AtomicBool,
}

impl SwitchableEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(64),
            fail: AtomicBool::new(false),
        }
    }
}

impl Embedder for SwitchableEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding model offline");
        }
        self.inner.embed_texts(texts)
    }
}

/// Store whose counter increment never completes within a test's patience.
pub struct StalledCounterStore {
    pub inner: SqliteConversationStore,
    pub delay: Duration,
}

#[async_trait]
impl ConversationStore for StalledCounterStore {
    async fn increment_message_count(
        &self,
        user_id: &str,
        settings: &SessionSettings,
    ) -> Result<u64> {
        tokio::time::sleep(self.delay).await;
        self.inner.increment_message_count(user_id, settings).await
    }

    async fn get_session(&self, user_id: &str) -> Result<Option<SessionState>> {
        self.inner.get_session(user_id).await
    }

    async fn configure_session(&self, user_id: &str, settings: &SessionSettings) -> Result<()> {
        self.inner.configure_session(user_id, settings).await
    }

    async fn set_stage(&self, user_id: &str, stage: Stage) -> Result<()> {
        self.inner.set_stage(user_id, stage).await
    }

    async fn insert_exchange(&self, exchange: &Exchange) -> Result<()> {
        self.inner.insert_exchange(exchange).await
    }

    async fn recent_exchanges(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        self.inner.recent_exchanges(user_id, limit).await
    }

    async fn reset_user(&self, user_id: &str) -> Result<bool> {
        self.inner.reset_user(user_id).await
    }

    async fn insert_learned(&self, entry: &LearnedEntry) -> Result<()> {
        self.inner.insert_learned(entry).await
    }

    async fn find_learned_answer(
        &self,
        needle: &str,
        language: Language,
    ) -> Result<Option<String>> {
        self.inner.find_learned_answer(needle, language).await
    }

    async fn aggregates(&self) -> Result<StoreAggregates> {
        self.inner.aggregates().await
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        rng_seed: Some(42),
        ..EngineConfig::default()
    }
}

pub struct TestService {
    pub service: ConversationService,
    pub embedder: Arc<SwitchableEmbedder>,
    _tmp: TempDir,
}

/// Service over fresh `SQLite` files with a seeded RNG. The index is not
/// bootstrapped; call `initialize` for retrieval mode.
pub fn create_test_service(config: EngineConfig) -> TestService {
    let tmp = TempDir::new().expect("create temp dir");
    let store = SqliteConversationStore::open(tmp.path().join("conversations.db"))
        .expect("open conversation store");
    let embedder = Arc::new(SwitchableEmbedder::new());
    let index = KnowledgeIndex::open(tmp.path().join("knowledge.db"), embedder.clone())
        .expect("open knowledge index");
    let service = ConversationService::new(config, Arc::new(store), Arc::new(index));
    TestService {
        service,
        embedder,
        _tmp: tmp,
    }
}

pub async fn create_ready_service() -> TestService {
    let t = create_test_service(engine_config());
    t.service.initialize().await;
    t
}

pub fn persona(threshold: u32) -> CharacterConfig {
    CharacterConfig {
        message_count: threshold,
        semi_message: "SEMI: jump to the link".into(),
        last_message: "LAST: see you in private".into(),
        ..CharacterConfig::default()
    }
}
