use crate::models::{AppointmentStatus, SchedulingError};

/// Allowed appointment status transitions. Cancel and complete are
/// external operations on an existing booking; terminal states are
/// immutable. A cancelled row vacates its time range because the
/// exclusion constraint only covers active statuses.
pub fn validate_status_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), SchedulingError> {
    use AppointmentStatus::*;

    let allowed = matches!(
        (from, to),
        (Scheduled, Confirmed) | (Scheduled, Cancelled) | (Scheduled, Completed)
            | (Confirmed, Cancelled)
            | (Confirmed, Completed)
    );

    if allowed {
        Ok(())
    } else {
        Err(SchedulingError::InvalidStatusTransition { from, to })
    }
}
