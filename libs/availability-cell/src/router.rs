use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route(
            "/{practitioner_id}/slots",
            get(handlers::get_available_slots),
        )
        .with_state(state)
}
