mod common;

use charmcrab::engine::EmotionLabel;
use charmcrab::engine::emotion::classify;
use charmcrab::engine::templates::pack;
use charmcrab::persona::Language;
use common::{create_ready_service, persona};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_seductive_message_without_context_gets_early_generic_reply() {
    let t = create_ready_service().await;
    let mut persona = persona(10);
    persona.learning_enabled = false;
    assert_eq!(classify("хочу тебя"), EmotionLabel::Seductive);

    // No similarity hits: the index is up but every query fails.
    t.embedder.fail.store(true, Ordering::SeqCst);

    let ru = pack(Language::Russian);
    for user in ["fresh-1", "fresh-2", "fresh-3", "fresh-4"] {
        let reply = t
            .service
            .process_turn(user, "Хочу тебя", &persona)
            .await
            .expect("turn");
        assert_eq!(reply.emotion, EmotionLabel::Seductive);
        assert!(
            ru.dynamic_early.contains(&reply.reply_text.as_str()),
            "unexpected reply: {}",
            reply.reply_text
        );
        assert!(!ru.dynamic_advanced.contains(&reply.reply_text.as_str()));
    }
}

#[tokio::test]
async fn test_exact_seed_phrase_returns_seed_answer() {
    let t = create_ready_service().await;
    let mut persona = persona(10);
    persona.mood = "calm".into();

    let reply = t
        .service
        .process_turn("u", "Привет как дела", &persona)
        .await
        .expect("turn");
    assert_eq!(
        reply.reply_text,
        "Привет дорогой! У меня все отлично, особенно когда вижу тебя"
    );
    assert!((reply.confidence - 0.8).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_english_persona_gets_english_generators() {
    let t = create_ready_service().await;
    let mut persona = persona(10);
    persona.language = "en".into();
    persona.learning_enabled = false;
    t.embedder.fail.store(true, Ordering::SeqCst);

    let reply = t
        .service
        .process_turn("u", "I love you", &persona)
        .await
        .expect("turn");
    assert_eq!(reply.emotion, EmotionLabel::Romantic);
    let en = pack(Language::English);
    let expected: Vec<String> = en
        .romantic_generator
        .iter()
        .map(|t| t.replace("{name}", &persona.name))
        .collect();
    assert!(expected.contains(&reply.reply_text));
}
