use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::render::RenderError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const RENDER: &str = "render_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// JSON error response. `hint` is shown to the client, `detail` only reaches
/// the logs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn invalid_input(err: &DomainError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid render request",
            Some(err.to_string()),
        )
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::invalid_input(&err)
    }
}

impl From<RenderError> for ApiError {
    /// Never called with `Aborted` by the handlers, which answer 204 instead.
    fn from(err: RenderError) -> Self {
        match &err {
            RenderError::Validation(inner) => Self::invalid_input(inner),
            RenderError::Markdown { message } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "PDF generation failed",
                Some(message.clone()),
            ),
            RenderError::Failed { phase, .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "PDF generation failed",
                Some(format!("the renderer failed while {phase}")),
            )
            .with_detail(err.to_string()),
            RenderError::Aborted | RenderError::Document { .. } | RenderError::Io(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "PDF generation failed",
                None,
            )
            .with_detail(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.to_string());
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, diagnostic),
        )
        .attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::JobPhase;

    #[test]
    fn failed_render_hint_omits_engine_message() {
        let err = ApiError::from(RenderError::failed(
            JobPhase::DocumentLoading,
            "net::ERR_FILE_NOT_FOUND at file:///tmp/md2pdf_tmp/markdown-1/markdown.html",
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.hint.as_deref(),
            Some("the renderer failed while document_loading")
        );
        assert!(err.detail.as_deref().is_some_and(|d| d.contains("md2pdf_tmp")));
    }

    #[test]
    fn report_carries_the_internal_detail() {
        let response = ApiError::from(RenderError::Document {
            message: "work directory must be an absolute path".to_string(),
        })
        .into_response();
        let report = response.extensions().get::<ErrorReport>().expect("report");
        assert!(report.messages[0].starts_with("render_error: document assembly failed"));
    }

    #[test]
    fn validation_is_reported_as_invalid_input() {
        let err = ApiError::from(DomainError::validation("theme", "unknown theme `x`"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code, codes::INVALID_INPUT);
    }
}
