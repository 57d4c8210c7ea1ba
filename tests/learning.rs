mod common;

use charmcrab::engine::EmotionLabel;
use charmcrab::knowledge::Provenance;
use charmcrab::persona::Language;
use common::{create_ready_service, persona};

#[tokio::test]
async fn test_inserted_text_is_its_own_best_match() {
    let t = create_ready_service().await;
    let index = t.service.index();
    index
        .insert(
            "какая у тебя любимая песня",
            "Та, что ты мне напоешь",
            EmotionLabel::Neutral,
            Language::Russian,
            Provenance::Manual,
        )
        .await
        .expect("insert target");
    index
        .insert(
            "солнечная погода над морем",
            "Поехали вместе",
            EmotionLabel::Neutral,
            Language::Russian,
            Provenance::Manual,
        )
        .await
        .expect("insert unrelated");

    let hits = index
        .query("какая у тебя любимая песня", Language::Russian, 5)
        .await
        .expect("query");
    let target = hits
        .iter()
        .find(|h| h.source_text == "какая у тебя любимая песня")
        .expect("target among top-k");
    let unrelated = hits
        .iter()
        .find(|h| h.source_text == "солнечная погода над морем")
        .map_or(0.0, |h| h.similarity);
    assert!(target.similarity >= unrelated);
    assert_eq!(hits[0].source_text, "какая у тебя любимая песня");
}

#[tokio::test]
async fn test_queries_stay_within_language() {
    let t = create_ready_service().await;
    let hits = t
        .service
        .index()
        .query("hello how are you", Language::Russian, 20)
        .await
        .expect("query");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| !h.source_text.is_ascii()));
}

#[tokio::test]
async fn test_learning_disabled_leaves_auto_learned_count() {
    let t = create_ready_service().await;
    let mut persona = persona(50);
    persona.learning_enabled = false;
    let before = t.service.index().count_by_provenance().await.unwrap();

    for msg in ["привет", "как дела", "ты красивая", "хочу встретиться", "???"] {
        t.service.process_turn("u", msg, &persona).await.unwrap();
    }

    let after = t.service.index().count_by_provenance().await.unwrap();
    assert_eq!(after.auto_learned, before.auto_learned);
    assert_eq!(after.total, before.total);
}

#[tokio::test]
async fn test_learning_enabled_grows_auto_learned_count() {
    let t = create_ready_service().await;
    let persona = persona(50);

    for msg in ["первое сообщение", "второе сообщение", "третье"] {
        t.service.process_turn("u", msg, &persona).await.unwrap();
    }

    let counts = t.service.index().count_by_provenance().await.unwrap();
    assert_eq!(counts.auto_learned, 3);
    assert_eq!(counts.seed, 20);
    let stats = t.service.stats().await.unwrap();
    assert_eq!(stats.learned_backup.auto_learned, 3);
}

#[tokio::test]
async fn test_redirect_turns_are_not_learned() {
    let t = create_ready_service().await;
    let persona = persona(1);

    for _ in 0..4 {
        t.service.process_turn("u", "снова я", &persona).await.unwrap();
    }

    let counts = t.service.index().count_by_provenance().await.unwrap();
    assert_eq!(counts.auto_learned, 1);
}

#[tokio::test]
async fn test_trained_answer_is_served_back() {
    let t = create_ready_service().await;
    let mut persona = persona(50);
    persona.mood = "calm".into();
    t.service
        .train("Какой твой любимый цвет?", "Красный, как вино", Language::Russian)
        .await
        .expect("train");

    let reply = t
        .service
        .process_turn("u", "Какой твой любимый цвет?", &persona)
        .await
        .unwrap();
    assert_eq!(reply.reply_text, "Красный, как вино");
}

#[tokio::test]
async fn test_preview_leaves_no_trace() {
    let t = create_ready_service().await;
    let persona = persona(1);

    for msg in ["привет", "как дела", "ты где", ""] {
        let reply = t.service.preview(msg, &persona).await.unwrap();
        assert_eq!(reply.sequence_number, 0);
        assert!(!reply.is_semi);
        assert!(!reply.is_last);
        assert_ne!(reply.emotion, EmotionLabel::Redirect);
    }

    let counts = t.service.index().count_by_provenance().await.unwrap();
    assert_eq!(counts.auto_learned, 0);
    let stats = t.service.stats().await.unwrap();
    assert_eq!(stats.total_exchanges, 0);
    assert_eq!(stats.total_users, 0);
    assert_eq!(stats.learned_backup.auto_learned, 0);
}
