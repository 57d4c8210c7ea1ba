//! Priority-ordered reply selection.
//!
//! `Cascade::decide` is a pure function of its inputs and the injected RNG:
//! the first applicable rule wins.
//!
//! 1. a similarity hit above the threshold, personalized
//! 2. seductive emotion in an advanced conversation, seductive generator
//! 3. romantic emotion, romantic generator
//! 4. flirty emotion, flirty generator
//! 5. the best similarity hit at any score, personalized
//! 6. stage-aware generic reply

use crate::engine::context::{ConversationContext, Stage};
use crate::engine::emotion::EmotionLabel;
use crate::engine::templates::{self, GeneratorKind, NAME_PLACEHOLDER, PLAYFUL_SUFFIX};
use crate::knowledge::SimilarityHit;
use crate::persona::{CharacterConfig, Language};
use crate::utils;
use serde::Serialize;
use tracing::trace;

/// Which cascade rule produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    StrongMatch,
    SeductiveAdvanced,
    Romantic,
    Flirty,
    BestMatch,
    StageGeneric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub rule: Rule,
    pub reply: String,
}

/// Uniform choice from a static list. Empty lists yield an empty string.
pub fn sample(list: &'static [&'static str], rng: &mut fastrand::Rng) -> &'static str {
    if list.is_empty() {
        return "";
    }
    list[rng.usize(..list.len())]
}

/// Sample a generator list for `language` and substitute the persona name.
pub fn generate(
    kind: GeneratorKind,
    language: Language,
    character: &CharacterConfig,
    rng: &mut fastrand::Rng,
) -> String {
    let template = sample(templates::pack(language).generator(kind), rng);
    template.replace(NAME_PLACEHOLDER, &character.name)
}

pub struct Cascade {
    similarity_threshold: f32,
    suffix_probability: f64,
}

impl Cascade {
    pub fn new(similarity_threshold: f32, suffix_probability: f64) -> Self {
        Self {
            similarity_threshold,
            suffix_probability: suffix_probability.clamp(0.0, 1.0),
        }
    }

    pub fn decide(
        &self,
        input_text: &str,
        emotion: EmotionLabel,
        context: &ConversationContext,
        hits: &[SimilarityHit],
        character: &CharacterConfig,
        rng: &mut fastrand::Rng,
    ) -> Decision {
        let decision = self.select(emotion, context, hits, character, rng);
        trace!(
            "cascade {:?} for '{}' (emotion={}, stage={}, hits={})",
            decision.rule,
            utils::truncate_chars(input_text, 50),
            emotion,
            context.stage,
            hits.len()
        );
        decision
    }

    fn select(
        &self,
        emotion: EmotionLabel,
        context: &ConversationContext,
        hits: &[SimilarityHit],
        character: &CharacterConfig,
        rng: &mut fastrand::Rng,
    ) -> Decision {
        let language = character.language();

        if let Some(hit) = hits
            .iter()
            .find(|h| h.similarity > self.similarity_threshold)
        {
            return Decision {
                rule: Rule::StrongMatch,
                reply: self.personalize(&hit.response_text, character, context, rng),
            };
        }

        let generated = match emotion {
            EmotionLabel::Seductive if context.stage == Stage::Advanced => {
                Some((Rule::SeductiveAdvanced, GeneratorKind::Seductive))
            }
            EmotionLabel::Romantic => Some((Rule::Romantic, GeneratorKind::Romantic)),
            EmotionLabel::Flirty => Some((Rule::Flirty, GeneratorKind::Flirty)),
            _ => None,
        };
        if let Some((rule, kind)) = generated {
            return Decision {
                rule,
                reply: generate(kind, language, character, rng),
            };
        }

        if let Some(best) = hits
            .iter()
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
        {
            return Decision {
                rule: Rule::BestMatch,
                reply: self.personalize(&best.response_text, character, context, rng),
            };
        }

        let kind = if context.stage == Stage::Advanced {
            GeneratorKind::DynamicAdvanced
        } else {
            GeneratorKind::DynamicEarly
        };
        Decision {
            rule: Rule::StageGeneric,
            reply: generate(kind, language, character, rng),
        }
    }

    /// Pass-through, except playful personas get [`PLAYFUL_SUFFIX`] with the
    /// configured probability.
    pub fn personalize(
        &self,
        reply: &str,
        character: &CharacterConfig,
        _context: &ConversationContext,
        rng: &mut fastrand::Rng,
    ) -> String {
        if character.is_playful() && rng.f64() < self.suffix_probability {
            format!("{}{}", reply, PLAYFUL_SUFFIX)
        } else {
            reply.to_string()
        }
    }
}
