use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use availability_cell::router::availability_routes;
use conversation_cell::router::conversation_routes;
use scheduling_cell::router::scheduling_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cadence Booking API is running!" }))
        .nest("/practitioners", availability_routes(state.clone()))
        .nest("/appointments", scheduling_routes(state.clone()))
        .nest("/sessions", conversation_routes(state.clone()))
}
