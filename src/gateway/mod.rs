//! HTTP API over the conversation service.
//!
//! A thin adapter: every handler parses JSON, calls one
//! [`ConversationService`] operation and maps [`CharmcrabError`] onto a
//! status code.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::ConversationService;
use crate::errors::CharmcrabError;
use crate::persona::{CharacterConfig, Language};
use crate::store::SessionSettings;

/// Max message size for the message endpoint: 1 MB.
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    service: Arc<ConversationService>,
    /// Persona used when a request carries no `character_config`. Stored
    /// session settings override its funnel fields.
    default_persona: Arc<CharacterConfig>,
}

impl GatewayState {
    pub fn new(service: Arc<ConversationService>, default_persona: CharacterConfig) -> Self {
        Self {
            service,
            default_persona: Arc::new(default_persona),
        }
    }
}

/// Request body for POST /api/message.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    /// May be omitted when the message carries a legacy `id|text` prefix.
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: String,
    #[serde(default, alias = "characterConfig")]
    pub character_config: Option<CharacterConfig>,
}

/// Request body for POST /api/configure. Omitted fields take the default
/// persona's values.
#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub user_id: String,
    #[serde(default, alias = "maxMessages")]
    pub max_messages: Option<u32>,
    #[serde(default, alias = "semiMessage")]
    pub semi_message: Option<String>,
    #[serde(default, alias = "lastMessage")]
    pub last_message: Option<String>,
    #[serde(default, alias = "characterName")]
    pub character_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Request body for POST /api/test.
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub message: String,
    #[serde(default, alias = "characterConfig")]
    pub character_config: Option<CharacterConfig>,
}

/// Request body for POST /api/train.
#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &CharmcrabError) -> StatusCode {
    match err {
        CharmcrabError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        CharmcrabError::StoreUnavailable(_)
        | CharmcrabError::Timeout { .. }
        | CharmcrabError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CharmcrabError::Config(_)
        | CharmcrabError::EmbeddingUnavailable(_)
        | CharmcrabError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CharmcrabError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!("HTTP API request failed: {}", self);
        }
        error_response(status, self.to_string())
    }
}

/// Build the HTTP API router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/message", post(message_handler))
        .route("/api/configure", post(configure_handler))
        .route("/api/test", post(preview_handler))
        .route("/api/train", post(train_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/reset/{user_id}", delete(reset_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// POST /api/message: run one turn.
async fn message_handler(
    State(state): State<GatewayState>,
    Json(body): Json<MessageRequest>,
) -> Response {
    if body.message.len() > MAX_MESSAGE_SIZE {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "message too large");
    }
    let user_id = body.user_id.unwrap_or_default();
    debug!(
        "HTTP API message: user={}, content_len={}",
        user_id,
        body.message.len()
    );
    let result = match body.character_config {
        Some(persona) => {
            state
                .service
                .process_turn(&user_id, &body.message, &persona)
                .await
        }
        None => {
            state
                .service
                .process_turn_with_session(&user_id, &body.message, &state.default_persona)
                .await
        }
    };
    match result {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/configure: store a user's funnel settings.
async fn configure_handler(
    State(state): State<GatewayState>,
    Json(body): Json<ConfigureRequest>,
) -> Response {
    let defaults = state.default_persona.as_ref();
    let settings = SessionSettings {
        max_messages: body.max_messages.unwrap_or(defaults.message_count),
        semi_message: body
            .semi_message
            .unwrap_or_else(|| defaults.semi_message.clone()),
        last_message: body
            .last_message
            .unwrap_or_else(|| defaults.last_message.clone()),
        language: body
            .language
            .as_deref()
            .map_or_else(|| defaults.language(), Language::from_code),
        character_name: body.character_name.unwrap_or_else(|| defaults.name.clone()),
    };
    match state.service.configure(&body.user_id, &settings).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": body.user_id.trim(),
                "max_messages": settings.max_messages,
                "language": settings.language,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/test: answer without counting, logging or learning.
async fn preview_handler(
    State(state): State<GatewayState>,
    Json(body): Json<PreviewRequest>,
) -> Response {
    if body.message.len() > MAX_MESSAGE_SIZE {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "message too large");
    }
    let persona = body
        .character_config
        .unwrap_or_else(|| state.default_persona.as_ref().clone());
    match state.service.preview(&body.message, &persona).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/train: teach a question/answer pair.
async fn train_handler(
    State(state): State<GatewayState>,
    Json(body): Json<TrainRequest>,
) -> Response {
    let language = body
        .language
        .as_deref()
        .map_or_else(|| state.default_persona.language(), Language::from_code);
    match state
        .service
        .train(&body.question, &body.answer, language)
        .await
    {
        Ok(id) => (
            StatusCode::OK,
            Json(serde_json::json!({"id": id, "language": language})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/stats
async fn stats_handler(State(state): State<GatewayState>) -> Response {
    match state.service.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /api/reset/{user_id}
async fn reset_handler(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.service.reset(&user_id).await {
        Ok(existed) => (
            StatusCode::OK,
            Json(serde_json::json!({"user_id": user_id, "reset": existed})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/health
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let status = if state.service.is_closed() {
        "closed"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "version": crate::VERSION,
        "mode": state.service.mode(),
    }))
}

/// Serve the HTTP API until Ctrl-C, then shut the service down.
pub async fn serve(config: &Config, service: Arc<ConversationService>) -> Result<()> {
    let state = GatewayState::new(service.clone(), config.persona.clone());
    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    service.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests;
