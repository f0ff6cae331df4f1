use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::AvailabilityError;
use crate::services::slots::SlotCalculator;

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
}

/// List bookable slots for a practitioner on a date. Used by the form
/// channel to preview availability; the chat flow reaches the same
/// calculator through the conversation cell.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(practitioner_id): Path<Uuid>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let duration = params
        .duration_minutes
        .unwrap_or(state.default_slot_duration_minutes);

    let calculator = SlotCalculator::new(&state);
    let slots = calculator
        .compute_slots(practitioner_id, params.date, duration, Utc::now(), token)
        .await
        .map_err(|e| match e {
            AvailabilityError::PractitionerNotFound => {
                AppError::NotFound("Practitioner not found".to_string())
            }
            AvailabilityError::InvalidDuration(_) => AppError::BadRequest(e.to_string()),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "practitioner_id": practitioner_id,
        "date": params.date,
        "slot_duration_minutes": duration,
        "slots": slots
    })))
}
