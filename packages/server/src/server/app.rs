//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::applications::ApplyService;
use crate::server::routes::{
    cancel_application_handler, create_application_handler, get_application_handler,
    health_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub applications: Arc<ApplyService>,
}

pub fn build_app(db_pool: PgPool, applications: Arc<ApplyService>) -> Router {
    let state = AppState {
        db_pool,
        applications,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/applications", post(create_application_handler))
        .route("/applications/:id", get(get_application_handler))
        .route("/applications/:id/cancel", post(cancel_application_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
