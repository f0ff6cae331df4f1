use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::with_read_retry;

use crate::models::{AvailabilityError, BookedRange, Slot};
use crate::services::store::AvailabilityStore;

/// Derives bookable slots for a practitioner on a date by combining
/// recurring availability with existing bookings. Read-only; never caches
/// beyond a single computation.
pub struct SlotCalculator {
    supabase: Arc<SupabaseClient>,
    store: AvailabilityStore,
}

impl SlotCalculator {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_client(supabase)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        let store = AvailabilityStore::new(Arc::clone(&supabase));
        Self { supabase, store }
    }

    /// Compute the ordered bookable slots for a practitioner/date.
    ///
    /// `now` is caller-supplied so same-day computations exclude slots
    /// already fully or partially in the past.
    pub async fn compute_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        if duration_minutes <= 0 {
            return Err(AvailabilityError::InvalidDuration(duration_minutes));
        }

        if !self.store.practitioner_exists(practitioner_id, auth_token).await? {
            return Err(AvailabilityError::PractitionerNotFound);
        }

        let day_of_week = date.weekday().num_days_from_sunday() as i32;
        let windows = self
            .store
            .list_windows(practitioner_id, day_of_week, auth_token)
            .await?;

        let booked = self
            .get_booked_ranges(practitioner_id, date, auth_token)
            .await?;

        let merged = merge_windows(
            windows
                .iter()
                .map(|w| (w.start_time, w.end_time))
                .collect(),
        );

        let slots = compute_free_slots(&merged, &booked, duration_minutes, date, now);

        debug!(
            "Computed {} slots for practitioner {} on {}",
            slots.len(),
            practitioner_id,
            date
        );
        Ok(slots)
    }

    async fn get_booked_ranges(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedRange>, AvailabilityError> {
        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&date=eq.{}&status=in.(scheduled,confirmed)&order=start_time.asc",
            practitioner_id, date
        );

        let result: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedRange>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }
}

/// Merge overlapping or adjacent time ranges so duplicate windows never
/// produce duplicate slots. Input order does not matter.
pub fn merge_windows(mut ranges: Vec<(NaiveTime, NaiveTime)>) -> Vec<(NaiveTime, NaiveTime)> {
    ranges.retain(|(start, end)| start < end);
    ranges.sort_by_key(|(start, _)| *start);

    let mut merged: Vec<(NaiveTime, NaiveTime)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                if end > *last_end {
                    *last_end = end;
                }
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Partition a window into contiguous duration-sized candidates, dropping
/// any trailing remainder shorter than the duration.
pub fn partition_window(
    start: NaiveTime,
    end: NaiveTime,
    duration: Duration,
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut candidates = Vec::new();
    let mut cursor = start;

    loop {
        let (candidate_end, wrapped) = cursor.overflowing_add_signed(duration);
        if wrapped != 0 || candidate_end > end {
            break;
        }
        candidates.push((cursor, candidate_end));
        cursor = candidate_end;
    }

    candidates
}

pub fn ranges_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Pure core of the calculator: merged windows + booked ranges in,
/// ordered free slots out. A candidate partially covered by a booking is
/// dropped entirely; no partial slots are offered. Nothing in the past
/// is ever offered: past dates yield an empty list and today's slots
/// must not have started yet.
pub fn compute_free_slots(
    merged_windows: &[(NaiveTime, NaiveTime)],
    booked: &[BookedRange],
    duration_minutes: i32,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let duration = Duration::minutes(duration_minutes as i64);
    let today = now.date_naive();

    if date < today {
        return Vec::new();
    }

    let mut slots: Vec<Slot> = merged_windows
        .iter()
        .flat_map(|(start, end)| partition_window(*start, *end, duration))
        .filter(|(start, end)| {
            !booked
                .iter()
                .any(|b| ranges_overlap(*start, *end, b.start_time, b.end_time))
        })
        .filter(|(start, _)| date != today || *start >= now.time())
        .map(|(start_time, end_time)| Slot {
            date,
            start_time,
            end_time,
        })
        .collect();

    slots.sort_by_key(|s| s.start_time);
    slots
}
