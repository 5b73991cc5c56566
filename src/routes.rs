use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Path prefix of the content file API
pub const API_PREFIX: &str = "/api/v1";

/// Create content file routes
pub fn content_file_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Listing
        .route(
            "/api/v1/{containerName}/contentfiles",
            get(handlers::list_files),
        )
        // File operations
        .route(
            "/api/v1/{containerName}/contentfiles/{fileName}",
            get(handlers::get_file)
                .put(handlers::put_file)
                .patch(handlers::update_file)
                .delete(handlers::delete_file),
        )
}

/// Build the full application with body limit, CORS and tracing layers
pub fn app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_request_size()).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(content_file_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
