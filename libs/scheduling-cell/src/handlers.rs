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

use crate::models::{BookAppointmentRequest, SchedulingError};
use crate::services::resolver::BookingConflictResolver;

fn map_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::Conflict => {
            AppError::Conflict("Requested time is no longer available".to_string())
        }
        SchedulingError::InvalidTime(_)
        | SchedulingError::DateInPast
        | SchedulingError::OutsideAvailability => AppError::ValidationError(e.to_string()),
        SchedulingError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        SchedulingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Direct booking entry for the form channel. The chat channel reaches
/// the same resolver through the conversation cell.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let resolver = BookingConflictResolver::new(&state);
    let appointment = resolver
        .try_book(request, Utc::now(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let resolver = BookingConflictResolver::new(&state);
    let appointment = resolver
        .ledger()
        .get(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let resolver = BookingConflictResolver::new(&state);
    let appointment = resolver
        .cancel_appointment(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let resolver = BookingConflictResolver::new(&state);
    let appointment = resolver
        .confirm_appointment(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let resolver = BookingConflictResolver::new(&state);
    let appointment = resolver
        .complete_appointment(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}
