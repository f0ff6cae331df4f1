use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use availability_cell::Slot;
use scheduling_cell::EntryMethod;

/// One client's end-to-end progress through the booking conversation,
/// independent of which channel delivered the messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub client_id: Uuid,
    pub practitioner_id: Uuid,
    pub channel_identity: String,
    pub status: SessionStatus,
    pub entry_method: EntryMethod,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    Welcome,
    DateSelection,
    TimeSelection,
    Confirmation,
    DetailsCollection,
    Completed,
}

impl fmt::Display for ConversationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStep::Welcome => write!(f, "welcome"),
            ConversationStep::DateSelection => write!(f, "date_selection"),
            ConversationStep::TimeSelection => write!(f, "time_selection"),
            ConversationStep::Confirmation => write!(f, "confirmation"),
            ConversationStep::DetailsCollection => write!(f, "details_collection"),
            ConversationStep::Completed => write!(f, "completed"),
        }
    }
}

/// The slot list last shown to the client, tagged with the date it was
/// computed for so a selection against an outdated list can be refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferedSlots {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

/// Accumulated booking intent. Grows monotonically until commit or
/// abandonment; no partial appointment row exists before commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offered: Option<OfferedSlots>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_slot: Option<Slot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Adapter-defined keys ride along untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The session's single current state, replaced on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub current_step: ConversationStep,
    pub context: SessionContext,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub client_id: Uuid,
    pub practitioner_id: Uuid,
    pub channel_identity: String,
    pub entry_method: EntryMethod,
}

/// One conversational turn, normalized by the entry adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInput {
    /// No payload; used to move past the welcome step.
    Continue,
    Date { date: NaiveDate },
    Slot { index: usize },
    Decision { accept: bool },
    Details { name: String, notes: Option<String> },
}

/// What the adapter renders after each turn. `prompt` carries
/// channel-agnostic data; formatting lives entirely outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    pub session_id: Uuid,
    pub session_status: SessionStatus,
    pub current_step: ConversationStep,
    pub prompt: Value,
    pub terminal: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversationError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Practitioner not found")]
    PractitionerNotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Selection {index} is outside the offered list of {count} slots")]
    SelectionOutOfRange { index: usize, count: usize },

    #[error("Offered slots are stale; the date changed since they were shown")]
    StaleSelection,

    #[error("Session context would grow to {bytes} bytes, over the {cap} byte cap")]
    ContextTooLarge { bytes: usize, cap: usize },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
