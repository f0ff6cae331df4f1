pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AvailabilityError, AvailabilityWindow, Slot};
pub use services::slots::SlotCalculator;
pub use services::store::AvailabilityStore;
