//! Static asset serving from the configured assets directory.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::{Mime, MimeGuess};
use tracing::warn;

use crate::application::error::ErrorReport;

/// Serve `requested` from beneath `root`, refusing anything that would
/// escape it.
pub async fn serve_dir(root: &Path, requested: Option<String>, source: &'static str) -> Response {
    let Some(relative) = sanitize(requested) else {
        return not_found_response(source);
    };
    let path = root.join(&relative);

    match tokio::fs::read(&path).await {
        Ok(contents) => Asset {
            contents: Bytes::from(contents),
            mime: mime_guess::from_path(&relative),
        }
        .into_response(),
        Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory) => {
            not_found_response(source)
        }
        Err(err) => {
            warn!(
                target = "md2pdf::infra::assets",
                path = %path.display(),
                error = %err,
                "failed to read static asset"
            );
            rejected_response(source, StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Turn a captured URL path into a relative path made only of normal
/// components. Empty paths and directory requests are rejected.
fn sanitize(requested: Option<String>) -> Option<PathBuf> {
    let candidate = requested.unwrap_or_default();
    let candidate = candidate.trim_start_matches('/');
    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains('\\') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(candidate).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

fn not_found_response(source: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}

fn rejected_response(source: &'static str, status: StatusCode) -> Response {
    let mut response = status.into_response();
    ErrorReport::from_message(source, status, "Static asset request rejected")
        .attach(&mut response);
    response
}

struct Asset {
    contents: Bytes,
    mime: MimeGuess,
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        build_response(self.contents, self.mime.first_or_octet_stream())
    }
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    response
}
