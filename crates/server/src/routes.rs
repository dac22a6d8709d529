//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let max_upload_size = usize::try_from(state.config.server.max_upload_size).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/api/retrieve/{file_hash}", get(handlers::retrieve_file));

    let mut router = Router::new().merge(api_routes);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    } else {
        tracing::info!("Metrics endpoint disabled by configuration");
    }

    if state.config.server.permissive_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
