pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, EntryMethod, SchedulingError,
};
pub use services::ledger::AppointmentLedger;
pub use services::resolver::BookingConflictResolver;
