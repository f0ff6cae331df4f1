use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use availability_cell::services::slots::merge_windows;
use availability_cell::AvailabilityStore;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentStatus, BookAppointmentRequest, SchedulingError};
use crate::services::ledger::AppointmentLedger;
use crate::services::lifecycle::validate_status_transition;

/// The correctness-critical commit path. A prior slot computation is
/// never trusted: validity is re-checked here and the final overlap test
/// happens atomically inside the storage insert, so concurrent callers
/// for the same practitioner/date serialize on the exclusion constraint
/// and exactly one wins.
pub struct BookingConflictResolver {
    ledger: AppointmentLedger,
    availability: AvailabilityStore,
}

impl BookingConflictResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            ledger: AppointmentLedger::new(Arc::clone(&supabase)),
            availability: AvailabilityStore::new(supabase),
        }
    }

    pub fn ledger(&self) -> &AppointmentLedger {
        &self.ledger
    }

    /// Validate and atomically commit a booking. Returns the committed
    /// appointment, or `Conflict` when a concurrent booking won the range.
    #[instrument(skip(self, auth_token), fields(practitioner = %request.practitioner_id, date = %request.date))]
    pub async fn try_book(
        &self,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        if request.start_time >= request.end_time {
            return Err(SchedulingError::InvalidTime(
                "start time must be before end time".to_string(),
            ));
        }

        let today = now.date_naive();
        if request.date < today {
            return Err(SchedulingError::DateInPast);
        }
        if request.date == today && request.start_time < now.time() {
            return Err(SchedulingError::InvalidTime(
                "start time has already passed".to_string(),
            ));
        }

        let day_of_week = request.date.weekday().num_days_from_sunday() as i32;
        let windows = self
            .availability
            .list_windows(request.practitioner_id, day_of_week, auth_token)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        let merged = merge_windows(windows.iter().map(|w| (w.start_time, w.end_time)).collect());
        if !range_within_any(&merged, request.start_time, request.end_time) {
            return Err(SchedulingError::OutsideAvailability);
        }

        match self.ledger.insert_if_no_overlap(&request, auth_token).await {
            Ok(appointment) => {
                info!("Booking committed: appointment {}", appointment.id);
                Ok(appointment)
            }
            Err(SchedulingError::Conflict) => {
                warn!("Booking lost the race for {} {}", request.date, request.start_time);
                Err(SchedulingError::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled, auth_token)
            .await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Completed, auth_token)
            .await
    }

    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed, auth_token)
            .await
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        to: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let current = self.ledger.get(appointment_id, auth_token).await?;
        validate_status_transition(current.status, to)?;
        let updated = self.ledger.set_status(appointment_id, to, auth_token).await?;
        info!("Appointment {} moved to {}", appointment_id, to);
        Ok(updated)
    }
}

/// True when [start, end) sits fully inside one merged availability
/// window.
pub fn range_within_any(
    merged: &[(NaiveTime, NaiveTime)],
    start: NaiveTime,
    end: NaiveTime,
) -> bool {
    merged
        .iter()
        .any(|(w_start, w_end)| *w_start <= start && end <= *w_end)
}
