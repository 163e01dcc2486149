use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/templates", get(handlers::list_templates).post(handlers::create_template))
        .route(
            "/templates/{id}",
            get(handlers::get_template)
                .post(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/upload-image", post(handlers::upload_image))
        .route("/classify-upload", post(handlers::classify_upload))
        .route("/match-template", post(handlers::match_template))
        .route("/generate-meme-image", post(handlers::generate_meme_image))
        .route("/generated-memes", get(handlers::list_generated_memes))
        .route("/images/{*key}", get(handlers::get_image))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
