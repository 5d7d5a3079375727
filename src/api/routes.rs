use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // Settlement endpoints
        .route("/settlement/run", post(handlers::run_settlement))
        .route("/settlement/status", get(handlers::get_settlement_status))
        .with_state(state)
        .layer(cors)
}
