use std::sync::Arc;

use axum::{routing::post, Router};

use shared_config::AppConfig;

use crate::handlers;

pub fn conversation_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::start_session))
        .route("/{session_id}/advance", post(handlers::advance_session))
        .route("/{session_id}/cancel", post(handlers::cancel_session))
        .route("/expire-stale", post(handlers::expire_stale_sessions))
        .with_state(state)
}
