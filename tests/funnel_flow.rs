mod common;

use charmcrab::engine::EmotionLabel;
use charmcrab::errors::CharmcrabError;
use charmcrab::persona::Language;
use charmcrab::store::{ConversationStore as _, SessionSettings};
use common::{create_ready_service, persona};

#[tokio::test]
async fn test_threshold_two_scenario() {
    let t = create_ready_service().await;
    let persona = persona(2);

    for expected in 1..=2 {
        let reply = t
            .service
            .process_turn("user-1", "привет", &persona)
            .await
            .expect("normal turn");
        assert_eq!(reply.sequence_number, expected);
        assert!(!reply.is_semi);
        assert!(!reply.is_last);
        assert_ne!(reply.emotion, EmotionLabel::Redirect);
    }

    let semi = t
        .service
        .process_turn("user-1", "ты где?", &persona)
        .await
        .expect("semi turn");
    assert!(semi.is_semi);
    assert!(!semi.is_last);
    assert_eq!(semi.reply_text, persona.semi_message);

    for expected in 4..=6 {
        let last = t
            .service
            .process_turn("user-1", "ответь", &persona)
            .await
            .expect("last turn");
        assert_eq!(last.sequence_number, expected);
        assert!(last.is_last);
        assert!(!last.is_semi);
        assert_eq!(last.reply_text, persona.last_message);
    }
}

#[tokio::test]
async fn test_users_progress_independently() {
    let t = create_ready_service().await;
    let persona = persona(1);

    t.service.process_turn("a", "hi", &persona).await.unwrap();
    let a2 = t.service.process_turn("a", "hi", &persona).await.unwrap();
    let b1 = t.service.process_turn("b", "hi", &persona).await.unwrap();
    assert!(a2.is_semi);
    assert_eq!(b1.sequence_number, 1);
    assert!(!b1.is_semi);
}

#[tokio::test]
async fn test_blank_redirect_text_uses_language_default() {
    let t = create_ready_service().await;
    let mut persona = persona(1);
    persona.semi_message = "   ".into();

    t.service.process_turn("u", "hi", &persona).await.unwrap();
    let semi = t.service.process_turn("u", "hi", &persona).await.unwrap();
    assert!(semi.is_semi);
    assert!(!semi.reply_text.trim().is_empty());
}

#[tokio::test]
async fn test_reset_unknown_user_is_noop() {
    let t = create_ready_service().await;
    assert!(!t.service.reset("nobody").await.expect("reset unknown"));
    assert!(!t.service.reset("nobody").await.expect("reset twice"));
}

#[tokio::test]
async fn test_reset_restarts_funnel() {
    let t = create_ready_service().await;
    let persona = persona(1);
    for _ in 0..4 {
        t.service.process_turn("u", "hi", &persona).await.unwrap();
    }
    assert!(t.service.reset("u").await.unwrap());

    let reply = t.service.process_turn("u", "hi", &persona).await.unwrap();
    assert_eq!(reply.sequence_number, 1);
    assert!(!reply.is_semi && !reply.is_last);

    let session = t
        .service
        .store()
        .get_session("u")
        .await
        .unwrap()
        .expect("session recreated");
    assert_eq!(session.message_count, 1);
}

#[tokio::test]
async fn test_legacy_prefix_routes_to_embedded_user() {
    let t = create_ready_service().await;
    let persona = persona(5);
    t.service
        .process_turn("gateway", "77|привет", &persona)
        .await
        .unwrap();
    let reply = t
        .service
        .process_turn("77", "как дела", &persona)
        .await
        .unwrap();
    assert_eq!(reply.sequence_number, 2);
}

#[tokio::test]
async fn test_zero_threshold_is_rejected_before_counting() {
    let t = create_ready_service().await;
    let err = t
        .service
        .process_turn("zero", "привет", &persona(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CharmcrabError::MalformedInput(_)));
    let session = t.service.store().get_session("zero").await.unwrap();
    assert!(session.is_none());
}

#[tokio::test]
async fn test_configured_session_drives_default_turns() {
    let t = create_ready_service().await;
    let settings = SessionSettings {
        max_messages: 1,
        semi_message: "configured semi".into(),
        last_message: "configured last".into(),
        language: Language::English,
        character_name: "Kate".into(),
    };
    t.service.configure("cfg", &settings).await.unwrap();

    let session = t.service.store().get_session("cfg").await.unwrap().unwrap();
    assert_eq!(session.message_count, 0);
    assert_eq!(session.max_messages, 1);

    let defaults = persona(5);
    let first = t
        .service
        .process_turn_with_session("cfg", "hi", &defaults)
        .await
        .unwrap();
    assert_eq!(first.sequence_number, 1);
    assert!(!first.is_semi);
    let second = t
        .service
        .process_turn_with_session("cfg", "hi again", &defaults)
        .await
        .unwrap();
    assert!(second.is_semi);
    assert_eq!(second.reply_text, "configured semi");

    let session = t.service.store().get_session("cfg").await.unwrap().unwrap();
    assert_eq!(session.max_messages, 1);
    assert_eq!(session.character_name, "Kate");
}

#[tokio::test]
async fn test_unconfigured_user_falls_back_to_defaults() {
    let t = create_ready_service().await;
    let defaults = persona(5);
    let merged = t.service.session_persona("nobody", &defaults).await;
    assert_eq!(merged, defaults);
}

#[tokio::test]
async fn test_configure_rejects_bad_settings() {
    let t = create_ready_service().await;
    let mut settings = SessionSettings {
        max_messages: 0,
        semi_message: String::new(),
        last_message: String::new(),
        language: Language::Russian,
        character_name: "Анна".into(),
    };
    let err = t.service.configure("u", &settings).await.unwrap_err();
    assert!(matches!(err, CharmcrabError::MalformedInput(_)));

    settings.max_messages = 3;
    let err = t.service.configure("  ", &settings).await.unwrap_err();
    assert!(matches!(err, CharmcrabError::MalformedInput(_)));
}
