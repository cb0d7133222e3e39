use axum::{
    Router,
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::error::HttpError;
use crate::infra::assets::serve_dir;

use super::AppState;

const STYLE_DIR: &str = "style";
const LIBS_DIR: &str = "libs";
const INDEX_FILE: &str = "index.html";

pub fn build_asset_router() -> Router<AppState> {
    Router::new()
        .route("/style/{*path}", get(serve_style))
        .route("/libs/{*path}", get(serve_libs))
}

async fn serve_style(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    serve_dir(
        &state.assets_dir.join(STYLE_DIR),
        Some(path),
        "infra::http::public::serve_style",
    )
    .await
}

async fn serve_libs(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    serve_dir(
        &state.assets_dir.join(LIBS_DIR),
        Some(path),
        "infra::http::public::serve_libs",
    )
    .await
}

/// Fallback for the browser client: directory requests resolve to
/// `index.html`.
pub async fn serve_front_end(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    const SOURCE: &str = "infra::http::public::serve_front_end";

    if method != Method::GET && method != Method::HEAD {
        return HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{method} {}", uri.path()),
        )
        .into_response();
    }
    let Some(root) = state.public_dir.as_deref() else {
        return HttpError::new(SOURCE, StatusCode::NOT_FOUND, "Not found", uri.path().to_string())
            .into_response();
    };

    let decoded = urlencoding::decode(uri.path())
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| uri.path().to_string());
    let mut path = decoded.trim_start_matches('/').to_string();
    if path.is_empty() || path.ends_with('/') {
        path.push_str(INDEX_FILE);
    }
    serve_dir(root, Some(path), SOURCE).await
}
