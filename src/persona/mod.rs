//! Caller-supplied persona description.
//!
//! A `CharacterConfig` arrives with every turn and is never persisted by the
//! engine. Threshold and redirect texts take the latest value each turn while
//! message-count progress lives in the per-user session.

use crate::errors::{CharmcrabError, CharmcrabResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Languages with a full template pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Russian, Language::English];

    /// Resolve a language code, falling back to Russian for unknown codes.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "ru" | "rus" | "russian" => Self::Russian,
            "en" | "eng" | "english" => Self::English,
            other => {
                debug!("no template pack for language '{}', using ru", other);
                Self::Russian
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Russian => "ru",
            Self::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn default_name() -> String {
    "Анна".to_string()
}

fn default_age() -> String {
    "23".to_string()
}

fn default_country() -> String {
    "Россия".to_string()
}

fn default_interests() -> String {
    "спорт, кино, музыка".to_string()
}

fn default_mood() -> String {
    "игривое".to_string()
}

fn default_message_count() -> u32 {
    3
}

fn default_semi_message() -> String {
    "Хочешь увидеть больше? Переходи по ссылке...".to_string()
}

fn default_last_message() -> String {
    "Встретимся в приватном чате, дорогой".to_string()
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_true() -> bool {
    true
}

/// Persona and funnel settings for one turn. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_age")]
    pub age: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_interests")]
    pub interests: String,
    #[serde(default = "default_mood")]
    pub mood: String,
    /// Funnel threshold: turn `message_count + 1` is the semi redirect.
    #[serde(default = "default_message_count", alias = "messageCount")]
    pub message_count: u32,
    #[serde(default = "default_semi_message", alias = "semiMessage")]
    pub semi_message: String,
    #[serde(default = "default_last_message", alias = "lastMessage")]
    pub last_message: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true", alias = "learningEnabled")]
    pub learning_enabled: bool,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            age: default_age(),
            country: default_country(),
            interests: default_interests(),
            mood: default_mood(),
            message_count: default_message_count(),
            semi_message: default_semi_message(),
            last_message: default_last_message(),
            language: default_language(),
            learning_enabled: true,
        }
    }
}

impl CharacterConfig {
    pub fn language(&self) -> Language {
        Language::from_code(&self.language)
    }

    /// Reject personas the funnel cannot run: the threshold must be positive.
    pub fn validate(&self) -> CharmcrabResult<()> {
        if self.message_count == 0 {
            return Err(CharmcrabError::MalformedInput(
                "character message_count must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Playful moods get the decorative suffix during personalization.
    pub fn is_playful(&self) -> bool {
        let mood = self.mood.to_lowercase();
        mood.contains("игрив") || mood.contains("playful")
    }
}
