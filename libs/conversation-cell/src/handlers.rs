use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{ConversationError, StartSessionRequest, StepInput};
use crate::services::session::SessionService;

fn map_error(e: ConversationError) -> AppError {
    match e {
        ConversationError::SessionNotFound => AppError::NotFound("Session not found".to_string()),
        ConversationError::PractitionerNotFound => {
            AppError::NotFound("Practitioner not found".to_string())
        }
        ConversationError::InvalidInput(_)
        | ConversationError::SelectionOutOfRange { .. }
        | ConversationError::StaleSelection => AppError::BadRequest(e.to_string()),
        ConversationError::ContextTooLarge { .. } => AppError::ValidationError(e.to_string()),
        ConversationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Open a conversation session and return the first prompt.
#[axum::debug_handler]
pub async fn start_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&state);
    let outcome = service
        .start_session(request, Utc::now(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(outcome)))
}

/// Apply one turn of client input to a session.
#[axum::debug_handler]
pub async fn advance_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(session_id): Path<Uuid>,
    Json(input): Json<StepInput>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&state);
    let outcome = service
        .advance(session_id, input, Utc::now(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(outcome)))
}

/// Abandon a session. Idempotent on sessions that already ended.
#[axum::debug_handler]
pub async fn cancel_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&state);
    let outcome = service
        .cancel(session_id, Utc::now(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!(outcome)))
}

/// Sweep sessions idle past the inactivity window. Meant for a cron
/// caller; lazy expiry on access covers sessions the sweep misses.
#[axum::debug_handler]
pub async fn expire_stale_sessions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&state);
    let expired = service
        .expire_stale_sessions(Utc::now(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "expired": expired })))
}
