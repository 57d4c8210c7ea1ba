use super::{
    ConversationStore, Exchange, LearnedEntry, SessionSettings, SessionState, StoreAggregates,
};
use crate::engine::context::Stage;
use crate::engine::emotion::EmotionLabel;
use crate::persona::Language;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const TOP_EMOTIONS_LIMIT: i64 = 5;
const TOP_QUESTIONS_LIMIT: i64 = 10;

/// Fixed-width UTC timestamps so lexical order equals chronological order.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp '{}'", s))?
        .with_timezone(&Utc))
}

/// Synchronous `SQLite` access for conversation state.
pub struct ConversationDb {
    conn: std::sync::Mutex<Connection>,
}

impl ConversationDb {
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
                "Failed to initialize conversation schema at: {}",
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

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                message_count INTEGER NOT NULL DEFAULT 0,
                max_messages INTEGER NOT NULL,
                semi_message TEXT NOT NULL,
                last_message TEXT NOT NULL,
                language TEXT NOT NULL,
                character_name TEXT NOT NULL,
                stage TEXT NOT NULL DEFAULT 'beginning',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS exchanges (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                input_text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                detected_emotion TEXT NOT NULL,
                reply_text TEXT NOT NULL,
                is_semi INTEGER NOT NULL,
                is_last INTEGER NOT NULL,
                sequence_number INTEGER NOT NULL,
                confidence REAL NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS learned_responses (
                id INTEGER PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                language TEXT NOT NULL,
                emotion TEXT NOT NULL,
                auto_learned INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_exchanges_user_ts ON exchanges(user_id, timestamp);
             CREATE INDEX IF NOT EXISTS idx_learned_language ON learned_responses(language);",
        )?;

        Ok(())
    }

    pub fn increment_message_count(&self, user_id: &str, settings: &SessionSettings) -> Result<u64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let now = format_ts(Utc::now());
        let count: i64 = conn.query_row(
            "INSERT INTO sessions
                (user_id, message_count, max_messages, semi_message, last_message,
                 language, character_name, stage, created_at, updated_at)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, 'beginning', ?7, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                message_count = message_count + 1,
                max_messages = excluded.max_messages,
                semi_message = excluded.semi_message,
                last_message = excluded.last_message,
                language = excluded.language,
                character_name = excluded.character_name,
                updated_at = excluded.updated_at
             RETURNING message_count",
            params![
                user_id,
                settings.max_messages,
                settings.semi_message,
                settings.last_message,
                settings.language.code(),
                settings.character_name,
                now,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_session(&self, user_id: &str) -> Result<Option<SessionState>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let row = conn
            .query_row(
                "SELECT message_count, max_messages, semi_message, last_message, language,
                        character_name, stage, created_at, updated_at
                 FROM sessions WHERE user_id = ?",
                [user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((count, max, semi, last, lang, name, stage, created, updated)) = row else {
            return Ok(None);
        };
        Ok(Some(SessionState {
            user_id: user_id.to_string(),
            message_count: count as u64,
            max_messages: max,
            semi_message: semi,
            last_message: last,
            language: Language::from_code(&lang),
            character_name: name,
            stage: stage.parse().unwrap_or_default(),
            created_at: parse_ts(&created)?,
            updated_at: parse_ts(&updated)?,
        }))
    }

    /// Store funnel settings for a user without consuming a count. Creates
    /// the session at count 0 when absent.
    pub fn configure_session(&self, user_id: &str, settings: &SessionSettings) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let now = format_ts(Utc::now());
        conn.execute(
            "INSERT INTO sessions
                (user_id, message_count, max_messages, semi_message, last_message,
                 language, character_name, stage, created_at, updated_at)
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, 'beginning', ?7, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                max_messages = excluded.max_messages,
                semi_message = excluded.semi_message,
                last_message = excluded.last_message,
                language = excluded.language,
                character_name = excluded.character_name,
                updated_at = excluded.updated_at",
            params![
                user_id,
                settings.max_messages,
                settings.semi_message,
                settings.last_message,
                settings.language.code(),
                settings.character_name,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn set_stage(&self, user_id: &str, stage: Stage) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.execute(
            "UPDATE sessions SET stage = ?, updated_at = ? WHERE user_id = ?",
            params![stage.as_str(), format_ts(Utc::now()), user_id],
        )?;
        Ok(())
    }

    pub fn insert_exchange(&self, exchange: &Exchange) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.execute(
            "INSERT INTO exchanges
                (user_id, input_text, normalized_text, detected_emotion, reply_text,
                 is_semi, is_last, sequence_number, confidence, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                exchange.user_id,
                exchange.input_text,
                exchange.normalized_text,
                exchange.detected_emotion.as_str(),
                exchange.reply_text,
                exchange.is_semi,
                exchange.is_last,
                exchange.sequence_number as i64,
                f64::from(exchange.confidence),
                format_ts(exchange.timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn recent_exchanges(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT input_text, normalized_text, detected_emotion, reply_text,
                    is_semi, is_last, sequence_number, confidence, timestamp
             FROM exchanges WHERE user_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )?;
        let rows: Result<Vec<_>, _> = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect();

        rows.map_err(|e| anyhow::anyhow!("Failed to read exchanges: {}", e))?
            .into_iter()
            .map(
                |(input, normalized, emotion, reply, is_semi, is_last, seq, confidence, ts)| {
                    Ok(Exchange {
                        user_id: user_id.to_string(),
                        input_text: input,
                        normalized_text: normalized,
                        detected_emotion: emotion.parse().unwrap_or(EmotionLabel::Neutral),
                        reply_text: reply,
                        is_semi,
                        is_last,
                        sequence_number: seq as u64,
                        confidence: confidence as f32,
                        timestamp: parse_ts(&ts)?,
                    })
                },
            )
            .collect()
    }

    pub fn reset_user(&self, user_id: &str) -> Result<bool> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction()?;
        let sessions = tx.execute("DELETE FROM sessions WHERE user_id = ?", [user_id])?;
        let exchanges = tx.execute("DELETE FROM exchanges WHERE user_id = ?", [user_id])?;
        tx.commit()?;
        debug!(
            "reset user {}: {} session(s), {} exchange(s) removed",
            user_id, sessions, exchanges
        );
        Ok(sessions > 0)
    }

    pub fn insert_learned(&self, entry: &LearnedEntry) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.execute(
            "INSERT INTO learned_responses
                (question, answer, language, emotion, auto_learned, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.question,
                entry.answer,
                entry.language.code(),
                entry.emotion.as_str(),
                entry.auto_learned,
                format_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn find_learned_answer(&self, needle: &str, language: Language) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let answer = conn
            .query_row(
                "SELECT answer FROM learned_responses
                 WHERE language = ? AND instr(question, ?) > 0
                 ORDER BY id DESC LIMIT 1",
                params![language.code(), needle],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(answer)
    }

    pub fn aggregates(&self) -> Result<StoreAggregates> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;

        let count = |sql: &str, p: &[&dyn rusqlite::ToSql]| -> Result<u64> {
            let n: i64 = conn.query_row(sql, p, |row| row.get(0))?;
            Ok(n as u64)
        };

        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| format_ts(dt.and_utc()))
            .context("invalid midnight")?;

        let total_users = count("SELECT COUNT(*) FROM sessions", &[])?;
        let total_exchanges = count("SELECT COUNT(*) FROM exchanges", &[])?;
        let active_today = count(
            "SELECT COUNT(DISTINCT user_id) FROM exchanges WHERE timestamp >= ?",
            &[&today_start as &dyn rusqlite::ToSql],
        )?;
        let redirect_exchanges = count(
            "SELECT COUNT(*) FROM exchanges WHERE is_semi = 1 OR is_last = 1",
            &[],
        )?;
        let learned_auto = count(
            "SELECT COUNT(*) FROM learned_responses WHERE auto_learned = 1",
            &[],
        )?;
        let learned_manual = count(
            "SELECT COUNT(*) FROM learned_responses WHERE auto_learned = 0",
            &[],
        )?;

        let grouped = |sql: &str, limit: i64| -> Result<Vec<(String, u64)>> {
            let mut stmt = conn.prepare(sql)?;
            let rows: Result<Vec<(String, i64)>, _> = stmt
                .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect();
            Ok(rows?.into_iter().map(|(k, n)| (k, n as u64)).collect())
        };

        let top_emotions = grouped(
            "SELECT detected_emotion, COUNT(*) AS n FROM exchanges
             GROUP BY detected_emotion ORDER BY n DESC, detected_emotion LIMIT ?",
            TOP_EMOTIONS_LIMIT,
        )?;
        let top_questions = grouped(
            "SELECT normalized_text, COUNT(*) AS n FROM exchanges
             WHERE is_semi = 0 AND is_last = 0 AND normalized_text != ''
             GROUP BY normalized_text ORDER BY n DESC, normalized_text LIMIT ?",
            TOP_QUESTIONS_LIMIT,
        )?;

        Ok(StoreAggregates {
            total_users,
            total_exchanges,
            active_today,
            redirect_exchanges,
            top_emotions,
            top_questions,
            learned_auto,
            learned_manual,
        })
    }
}

/// [`ConversationStore`] over a [`ConversationDb`], running each call on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Arc<ConversationDb>,
}

impl SqliteConversationStore {
    pub fn new(db: ConversationDb) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ConversationDb::new(db_path)?))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConversationDb) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .context("conversation store task failed")?
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn increment_message_count(
        &self,
        user_id: &str,
        settings: &SessionSettings,
    ) -> Result<u64> {
        let user_id = user_id.to_string();
        let settings = settings.clone();
        self.blocking(move |db| db.increment_message_count(&user_id, &settings))
            .await
    }

    async fn get_session(&self, user_id: &str) -> Result<Option<SessionState>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.get_session(&user_id)).await
    }

    async fn configure_session(&self, user_id: &str, settings: &SessionSettings) -> Result<()> {
        let user_id = user_id.to_string();
        let settings = settings.clone();
        self.blocking(move |db| db.configure_session(&user_id, &settings))
            .await
    }

    async fn set_stage(&self, user_id: &str, stage: Stage) -> Result<()> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.set_stage(&user_id, stage)).await
    }

    async fn insert_exchange(&self, exchange: &Exchange) -> Result<()> {
        let exchange = exchange.clone();
        self.blocking(move |db| db.insert_exchange(&exchange)).await
    }

    async fn recent_exchanges(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.recent_exchanges(&user_id, limit))
            .await
    }

    async fn reset_user(&self, user_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.reset_user(&user_id)).await
    }

    async fn insert_learned(&self, entry: &LearnedEntry) -> Result<()> {
        let entry = entry.clone();
        self.blocking(move |db| db.insert_learned(&entry)).await
    }

    async fn find_learned_answer(
        &self,
        needle: &str,
        language: Language,
    ) -> Result<Option<String>> {
        let needle = needle.to_string();
        self.blocking(move |db| db.find_learned_answer(&needle, language))
            .await
    }

    async fn aggregates(&self) -> Result<StoreAggregates> {
        self.blocking(ConversationDb::aggregates).await
    }
}
