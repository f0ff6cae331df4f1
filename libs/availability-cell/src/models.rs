use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recurring weekly availability window published by a practitioner.
///
/// Windows are managed elsewhere; this cell only reads them. Overlapping
/// windows for the same practitioner/day are legal and get merged before
/// slot generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

/// A bookable candidate range. Ephemeral: computed on demand, never
/// persisted outside a conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Appointment fields the calculator needs for the exclusion step.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedRange {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Practitioner not found")]
    PractitionerNotFound,

    #[error("Slot duration must be positive, got {0}")]
    InvalidDuration(i32),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
