pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    Router,
    routing::{get, post},
};

use crate::infra::http::AppState;

pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/preview", post(handlers::preview))
        .route("/api/cancel", post(handlers::cancel))
        .route("/api/themes", get(handlers::themes))
        .route("/healthz", get(handlers::health))
}
