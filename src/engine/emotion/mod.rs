//! Keyword emotion classifier and message normalization.
//!
//! Every label owns a set of trigger substrings in Russian and English. The
//! labels are checked in a fixed priority order and the first label with any
//! trigger present wins; no trigger at all means `neutral`.
//!
//! A single Aho-Corasick automaton over all triggers does the scan in one
//! pass, then the lowest-ranked label among the hits is returned.

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Emotional category attached to every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Flirty,
    Romantic,
    Playful,
    Seductive,
    Intimate,
    Neutral,
    Redirect,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Flirty,
        EmotionLabel::Romantic,
        EmotionLabel::Playful,
        EmotionLabel::Seductive,
        EmotionLabel::Intimate,
        EmotionLabel::Neutral,
        EmotionLabel::Redirect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flirty => "flirty",
            Self::Romantic => "romantic",
            Self::Playful => "playful",
            Self::Seductive => "seductive",
            Self::Intimate => "intimate",
            Self::Neutral => "neutral",
            Self::Redirect => "redirect",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown emotion label '{}'", s))
    }
}

/// Priority-ordered trigger table. Order matters: earlier rows win.
const EMOTION_TRIGGERS: &[(EmotionLabel, &[&str])] = &[
    (
        EmotionLabel::Flirty,
        &[
            "красивый",
            "сексуальный",
            "привлекательный",
            "милый",
            "handsome",
            "sexy",
            "attractive",
            "cute",
        ],
    ),
    (
        EmotionLabel::Romantic,
        &[
            "любовь",
            "сердце",
            "романтика",
            "love",
            "heart",
            "romance",
            "romantic",
        ],
    ),
    (
        EmotionLabel::Playful,
        &[
            "игра", "шутка", "веселье", "play", "joke", "fun", "playful",
        ],
    ),
    (
        EmotionLabel::Seductive,
        &[
            "хочу",
            "желаю",
            "страсть",
            "want",
            "desire",
            "passion",
            "seductive",
        ],
    ),
    (
        EmotionLabel::Intimate,
        &[
            "близость",
            "объятия",
            "поцелуи",
            "intimacy",
            "hug",
            "kiss",
            "close",
        ],
    ),
];

struct TriggerMatcher {
    automaton: AhoCorasick,
    /// Row in `EMOTION_TRIGGERS` for each automaton pattern.
    rank: Vec<usize>,
}

static MATCHER: LazyLock<TriggerMatcher> = LazyLock::new(|| {
    let mut patterns = Vec::new();
    let mut rank = Vec::new();
    for (row, (_, triggers)) in EMOTION_TRIGGERS.iter().enumerate() {
        for trigger in *triggers {
            patterns.push(*trigger);
            rank.push(row);
        }
    }
    let automaton = AhoCorasick::new(&patterns).expect("emotion trigger table is valid");
    TriggerMatcher { automaton, rank }
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Everything except word characters, whitespace and `? ! . , -`.
static NON_ESSENTIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s?!.,\-]").unwrap());

/// Lowercase, collapse whitespace and strip non-essential punctuation.
pub fn normalize_message(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ").to_lowercase();
    NON_ESSENTIAL_RE.replace_all(&collapsed, "").into_owned()
}

/// Classify text into an emotion label. Never fails; no trigger means `Neutral`.
pub fn classify(text: &str) -> EmotionLabel {
    let lowered = WHITESPACE_RE.replace_all(text.trim(), " ").to_lowercase();
    MATCHER
        .automaton
        .find_overlapping_iter(&lowered)
        .map(|m| MATCHER.rank[m.pattern().as_usize()])
        .min()
        .map_or(EmotionLabel::Neutral, |row| EMOTION_TRIGGERS[row].0)
}

#[cfg(test)]
mod tests;
