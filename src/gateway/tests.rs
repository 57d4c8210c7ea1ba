use super::*;
use crate::config::EngineConfig;
use crate::knowledge::{HashingEmbedder, KnowledgeIndex};
use crate::store::SqliteConversationStore;
use axum::body::Body;
use axum::http::Request;
use tempfile::TempDir;
use tower::ServiceExt;

fn make_state(dir: &TempDir) -> GatewayState {
    let store = SqliteConversationStore::open(dir.path().join("c.db")).unwrap();
    let index =
        KnowledgeIndex::open(dir.path().join("k.db"), Arc::new(HashingEmbedder::new(64))).unwrap();
    let config = EngineConfig {
        rng_seed: Some(5),
        ..EngineConfig::default()
    };
    let service = ConversationService::new(config, Arc::new(store), Arc::new(index));
    GatewayState::new(Arc::new(service), CharacterConfig::default())
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint_returns_json() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], crate::VERSION);
    assert_eq!(json["mode"], "template_only");
}

#[tokio::test]
async fn test_message_runs_a_turn() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));

    let (status, json) = send(
        app.clone(),
        post_json(
            "/api/message",
            &serde_json::json!({"user_id": "u1", "message": "привет"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sequence_number"], 1);
    assert_eq!(json["is_semi"], false);
    assert!(json["reply_text"].as_str().is_some_and(|s| !s.is_empty()));

    let (_, json) = send(
        app,
        post_json(
            "/api/message",
            &serde_json::json!({"message": "u1|еще раз"}),
        ),
    )
    .await;
    assert_eq!(json["sequence_number"], 2);
}

#[tokio::test]
async fn test_message_uses_request_persona() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let body = serde_json::json!({
        "user_id": "u2",
        "message": "hi",
        "character_config": {"messageCount": 1, "semiMessage": "see you there"}
    });

    send(app.clone(), post_json("/api/message", &body)).await;
    let (status, json) = send(app, post_json("/api/message", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_semi"], true);
    assert_eq!(json["emotion"], "redirect");
    assert_eq!(json["reply_text"], "see you there");
}

#[tokio::test]
async fn test_message_without_user_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let (status, json) = send(
        app,
        post_json("/api/message", &serde_json::json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("user id"));
}

#[tokio::test]
async fn test_oversized_message_rejected() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let message = "a".repeat(MAX_MESSAGE_SIZE + 1);
    let (status, _) = send(
        app,
        post_json(
            "/api/message",
            &serde_json::json!({"user_id": "u1", "message": message}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_zero_threshold_persona_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let body = serde_json::json!({
        "user_id": "u3",
        "message": "hi",
        "character_config": {"messageCount": 0}
    });
    let (status, json) = send(app, post_json("/api/message", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("message_count"));
}

#[tokio::test]
async fn test_configure_sets_session_threshold() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));

    let (status, json) = send(
        app.clone(),
        post_json(
            "/api/configure",
            &serde_json::json!({
                "user_id": "u4",
                "max_messages": 1,
                "semi_message": "follow the link",
                "language": "en"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], "u4");
    assert_eq!(json["max_messages"], 1);
    assert_eq!(json["language"], "en");

    let turn = serde_json::json!({"user_id": "u4", "message": "hi"});
    let (_, json) = send(app.clone(), post_json("/api/message", &turn)).await;
    assert_eq!(json["sequence_number"], 1);
    assert_eq!(json["is_semi"], false);
    let (_, json) = send(app, post_json("/api/message", &turn)).await;
    assert_eq!(json["is_semi"], true);
    assert_eq!(json["reply_text"], "follow the link");
}

#[tokio::test]
async fn test_configure_rejects_zero_threshold() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let (status, _) = send(
        app,
        post_json(
            "/api/configure",
            &serde_json::json!({"user_id": "u5", "max_messages": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_preview_does_not_count() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));

    for _ in 0..5 {
        let (status, json) = send(
            app.clone(),
            post_json("/api/test", &serde_json::json!({"message": "как дела?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sequence_number"], 0);
        assert_eq!(json["is_semi"], false);
        assert_eq!(json["is_last"], false);
    }

    let req = Request::builder()
        .uri("/api/stats")
        .body(Body::empty())
        .unwrap();
    let (_, json) = send(app, req).await;
    assert_eq!(json["total_exchanges"], 0);
    assert_eq!(json["total_users"], 0);
    assert_eq!(json["learned_backup"]["auto_learned"], 0);
}

#[tokio::test]
async fn test_train_then_stats() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));

    let (status, json) = send(
        app.clone(),
        post_json(
            "/api/train",
            &serde_json::json!({"question": "where do you live", "answer": "Moscow", "language": "en"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["id"].as_str().unwrap().starts_with("manual_"));
    assert_eq!(json["language"], "en");

    let req = Request::builder()
        .uri("/api/stats")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["knowledge"]["manual"], 1);
    assert_eq!(json["learned_backup"]["manual"], 1);
    assert_eq!(json["total_exchanges"], 0);
}

#[tokio::test]
async fn test_train_rejects_empty_answer() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    let (status, _) = send(
        app,
        post_json(
            "/api/train",
            &serde_json::json!({"question": "q", "answer": "  "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = build_router(make_state(&dir));
    send(
        app.clone(),
        post_json(
            "/api/message",
            &serde_json::json!({"user_id": "u9", "message": "hi"}),
        ),
    )
    .await;

    let reset = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/reset/u9")
            .body(Body::empty())
            .unwrap()
    };
    let (status, json) = send(app.clone(), reset()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reset"], true);
    let (_, json) = send(app, reset()).await;
    assert_eq!(json["reset"], false);
}

#[test]
fn test_status_mapping() {
    assert_eq!(
        status_for(&CharmcrabError::MalformedInput("x".into())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_for(&CharmcrabError::timeout(
            "counter",
            std::time::Duration::from_millis(5)
        )),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        status_for(&CharmcrabError::StoreUnavailable("db".into())),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        status_for(&CharmcrabError::Internal(anyhow::anyhow!("boom"))),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
