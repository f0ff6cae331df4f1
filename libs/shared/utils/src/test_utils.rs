use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            default_slot_duration_minutes: 50,
            session_timeout_hours: 24,
            max_session_context_bytes: 4096,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Canned PostgREST row payloads used by the wiremock-based cell tests.
pub struct MockPostgrestResponses;

impl MockPostgrestResponses {
    pub fn practitioner_row(practitioner_id: &str, display_name: &str) -> Value {
        json!({
            "id": practitioner_id,
            "display_name": display_name,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn availability_window_row(
        practitioner_id: &str,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "practitioner_id": practitioner_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "is_active": true
        })
    }

    pub fn appointment_row(
        client_id: &str,
        practitioner_id: &str,
        date: NaiveDate,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "client_id": client_id,
            "practitioner_id": practitioner_id,
            "date": date,
            "start_time": start_time,
            "end_time": end_time,
            "status": status,
            "entry_method": "chat",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn session_row(
        session_id: &str,
        client_id: &str,
        practitioner_id: &str,
        status: &str,
        entry_method: &str,
    ) -> Value {
        json!({
            "id": session_id,
            "client_id": client_id,
            "practitioner_id": practitioner_id,
            "channel_identity": "test-channel",
            "status": status,
            "entry_method": entry_method,
            "started_at": Utc::now().to_rfc3339(),
            "ended_at": null
        })
    }

    pub fn session_state_row(
        session_id: &str,
        current_step: &str,
        context: Value,
        last_updated: &str,
    ) -> Value {
        json!({
            "session_id": session_id,
            "current_step": current_step,
            "context": context,
            "last_updated": last_updated
        })
    }
}
