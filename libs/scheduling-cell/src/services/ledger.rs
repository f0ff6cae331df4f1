use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_database::{with_read_retry, DbError};

use crate::models::{Appointment, AppointmentStatus, BookAppointmentRequest, SchedulingError};

/// Thin contract over the appointments table. All writes funnel through
/// here; the range-exclusion constraint in Postgres makes
/// `insert_if_no_overlap` the atomic check-and-insert primitive.
pub struct AppointmentLedger {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentLedger {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Scheduled and confirmed appointments for a practitioner/date,
    /// ordered by start time.
    pub async fn list_active(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&date=eq.{}&status=in.(scheduled,confirmed)&order=start_time.asc",
            practitioner_id, date
        );

        let result: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        parse_rows(result)
    }

    /// Insert a scheduled appointment, relying on the storage-level
    /// exclusion constraint to reject any overlap with an active row.
    /// A detected conflict comes back as `SchedulingError::Conflict`;
    /// nothing here is retried, to rule out double submission.
    pub async fn insert_if_no_overlap(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let body = json!({
            "id": Uuid::new_v4(),
            "client_id": request.client_id,
            "practitioner_id": request.practitioner_id,
            "date": request.date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Scheduled.to_string(),
            "entry_method": request.entry_method.to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(detail) => {
                    warn!(
                        "Overlap rejected by exclusion constraint for practitioner {} on {}: {}",
                        request.practitioner_id, request.date, detail
                    );
                    SchedulingError::Conflict
                }
                other => SchedulingError::DatabaseError(other.to_string()),
            })?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| SchedulingError::DatabaseError("Insert returned no row".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| SchedulingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| SchedulingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "status": status.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| SchedulingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }
}

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, SchedulingError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| SchedulingError::DatabaseError(format!("Failed to parse appointments: {}", e)))
}
