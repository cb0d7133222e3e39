//! Validated render requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    error::DomainError,
    layout::{DEFAULT_DEVICE_SCALE, DEFAULT_MARGIN_MM, PagingMode, Resolution},
    theme::Theme,
};

pub const DEFAULT_FILE_STEM: &str = "markdown";

/// Raster image supplied by the caller, addressed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub name: String,
    pub data_uri: String,
}

impl ImageAsset {
    pub fn new(name: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_uri: data_uri.into(),
        }
    }
}

/// Everything the pipeline needs to turn one Markdown document into a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Caller-chosen identifier used for cancellation.
    pub job_id: String,
    pub markdown: String,
    pub theme: Theme,
    pub margin_mm: f64,
    pub device_scale: f64,
    pub resolution: Resolution,
    pub paging: PagingMode,
    /// Sanitised stem used for temp files and the suggested download name.
    pub file_name: String,
    pub images: Vec<ImageAsset>,
}

impl RenderRequest {
    pub fn new(markdown: impl Into<String>, theme: Theme) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            markdown: markdown.into(),
            theme,
            margin_mm: DEFAULT_MARGIN_MM,
            device_scale: DEFAULT_DEVICE_SCALE,
            resolution: Resolution::QHD,
            paging: PagingMode::default(),
            file_name: DEFAULT_FILE_STEM.to_string(),
            images: Vec::new(),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_file_name(mut self, hint: &str) -> Self {
        self.file_name = sanitize_file_stem(hint);
        self
    }

    pub fn with_margin(mut self, margin_mm: f64) -> Result<Self, DomainError> {
        if !margin_mm.is_finite() || margin_mm < 0.0 {
            return Err(DomainError::validation(
                "margin",
                "margin must be a non-negative number of millimetres",
            ));
        }
        self.margin_mm = margin_mm;
        Ok(self)
    }

    pub fn with_device_scale(mut self, scale: f64) -> Result<Self, DomainError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(DomainError::validation(
                "scaleFactor",
                "device scale factor must be greater than zero",
            ));
        }
        self.device_scale = scale;
        Ok(self)
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_paging(mut self, paging: PagingMode) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAsset>) -> Self {
        self.images = images
            .into_iter()
            .filter(|image| !image.name.trim().is_empty() && !image.data_uri.trim().is_empty())
            .collect();
        self
    }

    /// Download name in the form `{file}-{theme}-{timestamp}.pdf`.
    pub fn suggested_file_name(&self, timestamp_ms: i128) -> String {
        format!("{}-{}-{}.pdf", self.file_name, self.theme, timestamp_ms)
    }
}

/// Reduce a caller-supplied name to something safe to embed in a path.
pub fn sanitize_file_stem(hint: &str) -> String {
    let cleaned: String = hint
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}
