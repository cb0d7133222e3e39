//! Wire types for the JSON API. Browser clients send form values as strings,
//! so numeric and boolean fields accept either representation.

use serde::{Deserialize, Serialize};

use crate::application::render::CancelOutcome;
use crate::domain::{
    error::DomainError,
    layout::{DEFAULT_PAGE_WIDTH_MM, PagingMode, PaperFormat, Resolution},
    request::{ImageAsset, RenderRequest},
    theme::Theme,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    /// Blank strings count as absent.
    fn value(&self, field: &'static str) -> Result<Option<f64>, DomainError> {
        match self {
            NumberOrString::Number(value) => Ok(Some(*value)),
            NumberOrString::Text(text) if text.trim().is_empty() => Ok(None),
            NumberOrString::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| DomainError::validation(field, format!("`{text}` is not a number"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(value) => *value,
            Flag::Text(text) => matches!(text.trim(), "true" | "1" | "on"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResolutionField {
    Key(String),
    Size { width: u32, height: u32 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImagePayload {
    pub name: String,
    pub data_url: String,
}

/// Body of `POST /api/generate` and `POST /api/preview`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratePayload {
    pub markdown: Option<String>,
    pub theme: Option<String>,
    pub margin: Option<NumberOrString>,
    pub scale_factor: Option<NumberOrString>,
    pub force_single: Option<Flag>,
    pub resolution: Option<ResolutionField>,
    pub page_width: Option<NumberOrString>,
    pub format: Option<String>,
    pub file_name: Option<String>,
    pub images: Option<Vec<ImagePayload>>,
    pub render_id: Option<String>,
}

impl GeneratePayload {
    /// Validate the payload into a request. Absent fields take the server
    /// defaults; `default_resolution` applies when no resolution is sent.
    pub fn into_request(self, default_resolution: Resolution) -> Result<RenderRequest, DomainError> {
        let markdown = self
            .markdown
            .filter(|markdown| !markdown.is_empty())
            .ok_or_else(|| DomainError::validation("markdown", "markdown is required"))?;

        let theme = match non_blank(self.theme.as_deref()) {
            Some(theme) => theme.parse::<Theme>()?,
            None => Theme::default(),
        };

        let mut request = RenderRequest::new(markdown, theme);
        if let Some(margin) = optional_number(self.margin.as_ref(), "margin")? {
            request = request.with_margin(margin)?;
        }
        if let Some(scale) = optional_number(self.scale_factor.as_ref(), "scaleFactor")? {
            request = request.with_device_scale(scale)?;
        }

        let resolution = match self.resolution {
            None => default_resolution,
            Some(ResolutionField::Key(key)) if key.trim().is_empty() => default_resolution,
            Some(ResolutionField::Key(key)) => key.parse::<Resolution>()?,
            Some(ResolutionField::Size { width, height }) => Resolution::custom(width, height)?,
        };
        request = request.with_resolution(resolution);

        let force_single = self.force_single.as_ref().is_some_and(Flag::is_set);
        let paging = if force_single {
            let width = optional_number(self.page_width.as_ref(), "pageWidth")?
                .unwrap_or(DEFAULT_PAGE_WIDTH_MM);
            PagingMode::single_page(width)?
        } else {
            match non_blank(self.format.as_deref()) {
                Some(format) => PagingMode::FixedFormat(format.parse::<PaperFormat>()?),
                None => PagingMode::default(),
            }
        };
        request = request.with_paging(paging);

        if let Some(file_name) = self.file_name.as_deref() {
            request = request.with_file_name(file_name);
        }
        if let Some(render_id) = non_blank(self.render_id.as_deref()) {
            request = request.with_job_id(render_id);
        }

        let images = self
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|image| ImageAsset::new(image.name, image.data_url))
            .collect();
        Ok(request.with_images(images))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn optional_number(
    value: Option<&NumberOrString>,
    field: &'static str,
) -> Result<Option<f64>, DomainError> {
    value.map_or(Ok(None), |value| value.value(field))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelPayload {
    pub render_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
    pub status: CancelOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeView {
    pub id: Theme,
    pub description: &'static str,
    pub dark: bool,
}

impl From<Theme> for ThemeView {
    fn from(theme: Theme) -> Self {
        Self {
            id: theme,
            description: theme.description(),
            dark: theme.is_dark(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub jobs_in_flight: usize,
}
