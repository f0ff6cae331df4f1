use chrono::{DateTime, Duration, NaiveDate, Utc};

use availability_cell::Slot;

use crate::models::{ConversationError, SessionContext};

/// Lazy expiry rule, shared by session load and the housekeeping sweep.
pub fn is_expired(last_updated: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now - last_updated > timeout
}

pub fn validate_date_choice(date: NaiveDate, today: NaiveDate) -> Result<(), ConversationError> {
    if date < today {
        return Err(ConversationError::InvalidInput(format!(
            "date {} is in the past",
            date
        )));
    }
    Ok(())
}

/// Resolve a slot index against the list last offered. Selections made
/// against a list computed for a different date than the one currently
/// in context are stale and refused.
pub fn validate_slot_selection(
    context: &SessionContext,
    index: usize,
) -> Result<Slot, ConversationError> {
    let offered = context
        .offered
        .as_ref()
        .ok_or_else(|| ConversationError::InvalidInput("no slots have been offered".to_string()))?;

    let selected_date = context
        .selected_date
        .ok_or_else(|| ConversationError::InvalidInput("no date has been selected".to_string()))?;

    if offered.date != selected_date {
        return Err(ConversationError::StaleSelection);
    }

    offered
        .slots
        .get(index)
        .cloned()
        .ok_or(ConversationError::SelectionOutOfRange {
            index,
            count: offered.slots.len(),
        })
}
