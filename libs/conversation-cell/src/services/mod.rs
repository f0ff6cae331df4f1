pub mod events;
pub mod session;
pub mod state_machine;
