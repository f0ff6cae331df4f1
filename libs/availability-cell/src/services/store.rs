use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_database::with_read_retry;

use crate::models::{AvailabilityError, AvailabilityWindow};

/// Read-only access to the recurring availability windows table.
pub struct AvailabilityStore {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fetch all active windows for a practitioner on a given weekday,
    /// ordered by start time.
    pub async fn list_windows(
        &self,
        practitioner_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!(
            "Fetching availability windows for practitioner {} on weekday {}",
            practitioner_id, day_of_week
        );

        let path = format!(
            "/rest/v1/availability_windows?practitioner_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            practitioner_id, day_of_week
        );

        let result: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let windows: Vec<AvailabilityWindow> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e))
            })?;

        Ok(windows)
    }

    /// Existence check backing the calculator's NotFound contract.
    pub async fn practitioner_exists(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AvailabilityError> {
        let path = format!(
            "/rest/v1/practitioners?id=eq.{}&select=id",
            practitioner_id
        );

        let result: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }
}
