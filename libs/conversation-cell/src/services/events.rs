use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use scheduling_cell::EntryMethod;
use shared_database::supabase::SupabaseClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEventKind {
    SessionStarted,
    StepAdvanced,
    BookingCommitted,
    BookingConflict,
    SessionAbandoned,
    SessionExpired,
}

impl fmt::Display for BookingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingEventKind::SessionStarted => write!(f, "session_started"),
            BookingEventKind::StepAdvanced => write!(f, "step_advanced"),
            BookingEventKind::BookingCommitted => write!(f, "booking_committed"),
            BookingEventKind::BookingConflict => write!(f, "booking_conflict"),
            BookingEventKind::SessionAbandoned => write!(f, "session_abandoned"),
            BookingEventKind::SessionExpired => write!(f, "session_expired"),
        }
    }
}

/// Fire-and-forget analytics feed. Consumers are external; the core
/// never reads these rows back, and a failed emit must never fail the
/// conversation turn it belongs to.
pub struct EventEmitter {
    supabase: Arc<SupabaseClient>,
}

impl EventEmitter {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub fn emit(&self, kind: BookingEventKind, session_id: Uuid, entry_method: EntryMethod) {
        let supabase = Arc::clone(&self.supabase);
        let row = json!({
            "event_type": kind.to_string(),
            "session_id": session_id,
            "entry_method": entry_method.to_string(),
            "occurred_at": Utc::now().to_rfc3339()
        });

        tokio::spawn(async move {
            let mut headers = HeaderMap::new();
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));

            let result = supabase
                .request_with_headers::<Vec<Value>>(
                    Method::POST,
                    "/rest/v1/booking_events",
                    None,
                    Some(row),
                    Some(headers),
                )
                .await;

            if let Err(e) = result {
                warn!("Failed to emit {} event for session {}: {}", kind, session_id, e);
            }
        });
    }
}
