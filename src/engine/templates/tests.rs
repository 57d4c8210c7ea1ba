use super::*;

#[test]
fn test_every_list_is_non_empty() {
    for language in Language::ALL {
        let p = pack(language);
        for list in [
            p.greeting,
            p.flirt,
            p.seductive,
            p.questions,
            p.seductive_generator,
            p.romantic_generator,
            p.flirty_generator,
            p.dynamic_advanced,
            p.dynamic_early,
            p.fallback,
        ] {
            assert!(!list.is_empty(), "empty list in {} pack", language);
        }
        assert!(!p.country_specific.is_empty());
    }
}

#[test]
fn test_unknown_category_falls_back_to_flirt() {
    let p = pack(Language::English);
    assert_eq!(p.category_by_name("poetry"), p.flirt);
    assert_eq!(p.category_by_name("greeting"), p.greeting);
}

#[test]
fn test_stage_lists_are_disjoint() {
    for language in Language::ALL {
        let p = pack(language);
        for line in p.dynamic_early {
            assert!(!p.dynamic_advanced.contains(line));
        }
    }
}

#[test]
fn test_seductive_generator_carries_name_placeholder() {
    for language in Language::ALL {
        assert!(
            pack(language)
                .seductive_generator
                .iter()
                .any(|line| line.contains(NAME_PLACEHOLDER))
        );
    }
}

#[test]
fn test_seed_corpus_is_bilingual() {
    let ru = SEED_CORPUS
        .iter()
        .filter(|s| s.language == Language::Russian)
        .count();
    let en = SEED_CORPUS
        .iter()
        .filter(|s| s.language == Language::English)
        .count();
    assert_eq!(ru, 10);
    assert_eq!(en, 10);
    assert!(
        SEED_CORPUS
            .iter()
            .all(|s| s.emotion != EmotionLabel::Redirect && s.emotion != EmotionLabel::Neutral)
    );
}
