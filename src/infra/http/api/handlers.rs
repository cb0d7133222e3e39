use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tracing::info;

use crate::application::render::{CancelOutcome, DocumentSource, PdfResult};
use crate::domain::{request::RenderRequest, theme::Theme};
use crate::infra::http::AppState;

use super::error::ApiError;
use super::models::{CancelPayload, CancelResponse, GeneratePayload, HealthView, ThemeView};

const PREVIEW_ASSET_ORIGIN: &str = "";

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePayload>, JsonRejection>,
) -> Response {
    let request = match parse_payload(payload, &state) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match state
        .driver
        .generate(&request, DocumentSource::Uploaded)
        .await
    {
        Ok(pdf) => pdf_response(pdf),
        Err(err) if err.is_aborted() => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn preview(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePayload>, JsonRejection>,
) -> Result<Html<String>, ApiError> {
    let request = parse_payload(payload, &state)?;
    let html = state.driver.preview(&request, PREVIEW_ASSET_ORIGIN)?;
    Ok(Html(html))
}

/// The id may arrive in the JSON body or as `?renderId=`; the body wins.
pub async fn cancel(
    State(state): State<AppState>,
    Query(query): Query<CancelPayload>,
    body: Bytes,
) -> Result<Json<CancelResponse>, ApiError> {
    let from_body = serde_json::from_slice::<CancelPayload>(&body)
        .ok()
        .and_then(|payload| payload.render_id);
    let render_id = from_body
        .or(query.render_id)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("renderId is required", None))?;

    match state.driver.registry().cancel(&render_id).await {
        CancelOutcome::NotFound => Err(ApiError::not_found("No render job with that id")
            .with_detail(format!("unknown render id `{render_id}`"))),
        status => {
            info!(
                target = "md2pdf::http::cancel",
                render_id = render_id.as_str(),
                status = status.as_str(),
                "cancel request handled"
            );
            Ok(Json(CancelResponse { ok: true, status }))
        }
    }
}

pub async fn themes() -> Json<Vec<ThemeView>> {
    Json(Theme::ALL.into_iter().map(ThemeView::from).collect())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        jobs_in_flight: state.driver.registry().len(),
    })
}

fn parse_payload(
    payload: Result<Json<GeneratePayload>, JsonRejection>,
    state: &AppState,
) -> Result<RenderRequest, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::bad_request("Request body is not a valid render payload", None)
            .with_detail(rejection.body_text())
    })?;
    Ok(payload.into_request(state.default_resolution)?)
}

fn pdf_response(pdf: PdfResult) -> Response {
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&pdf.file_name)
    );
    let len = pdf.bytes.len();

    let mut response = Response::new(Body::from(pdf.bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    response
}
