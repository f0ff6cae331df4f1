pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    AdvanceOutcome, ConversationError, ConversationSession, ConversationStep, SessionContext,
    SessionState, SessionStatus, StartSessionRequest, StepInput,
};
pub use services::session::SessionService;
