use super::*;
use proptest::prelude::*;

fn other_label_triggers(label: EmotionLabel) -> Vec<&'static str> {
    EMOTION_TRIGGERS
        .iter()
        .filter(|(l, _)| *l != label)
        .flat_map(|(_, triggers)| triggers.iter().copied())
        .collect()
}

#[test]
fn test_every_trigger_classifies_to_its_label() {
    for (label, triggers) in EMOTION_TRIGGERS {
        let others = other_label_triggers(*label);
        for trigger in *triggers {
            if others.iter().any(|o| trigger.contains(o)) {
                continue;
            }
            let text = format!("ну вот {} и всё", trigger);
            assert_eq!(classify(&text), *label, "trigger '{}'", trigger);
        }
    }
}

#[test]
fn test_no_trigger_is_neutral() {
    assert_eq!(classify("как погода сегодня"), EmotionLabel::Neutral);
    assert_eq!(classify("what time is it"), EmotionLabel::Neutral);
    assert_eq!(classify(""), EmotionLabel::Neutral);
}

#[test]
fn test_case_and_whitespace_insensitive() {
    assert_eq!(classify("  You   are SO   Cute "), EmotionLabel::Flirty);
    assert_eq!(classify("ХОЧУ\tтебя"), EmotionLabel::Seductive);
}

#[test]
fn test_earlier_label_wins_when_several_match() {
    // "love" (romantic) and "kiss" (intimate): romantic ranks first
    assert_eq!(classify("i love a kiss"), EmotionLabel::Romantic);
    // "cute" (flirty) beats "want" (seductive) regardless of position
    assert_eq!(classify("i want you, cute one"), EmotionLabel::Flirty);
}

#[test]
fn test_russian_seductive_phrase() {
    assert_eq!(classify("Хочу тебя"), EmotionLabel::Seductive);
}

#[test]
fn test_label_parse_roundtrip() {
    for label in EmotionLabel::ALL {
        assert_eq!(label.as_str().parse::<EmotionLabel>().unwrap(), label);
    }
    assert!("angry".parse::<EmotionLabel>().is_err());
}

#[test]
fn test_label_serializes_lowercase() {
    let json = serde_json::to_string(&EmotionLabel::Seductive).unwrap();
    assert_eq!(json, "\"seductive\"");
}

#[test]
fn test_normalize_collapses_and_lowercases() {
    assert_eq!(normalize_message("  Привет   Как  ДЕЛА  "), "привет как дела");
}

#[test]
fn test_normalize_strips_non_essential_punctuation() {
    assert_eq!(normalize_message("hi!!! :) <3 😉"), "hi!!!  3 ");
    assert_eq!(normalize_message("what's up?"), "whats up?");
    assert_eq!(normalize_message("well-known, ok."), "well-known, ok.");
}

proptest! {
    #[test]
    fn digits_and_punctuation_are_neutral(text in "[0-9 ?!.,]{0,64}") {
        prop_assert_eq!(classify(&text), EmotionLabel::Neutral);
    }

    #[test]
    fn classification_is_deterministic(text in "\\PC{0,64}") {
        prop_assert_eq!(classify(&text), classify(&text));
    }
}
