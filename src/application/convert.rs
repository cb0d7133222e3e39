//! One-shot conversion of a local Markdown file, for `md2pdf convert`.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::{
    application::{
        error::AppError,
        render::{DocumentSource, RenderDriver},
    },
    config::{ConvertArgs, ConvertSettings},
    domain::{
        error::DomainError,
        layout::{DEFAULT_PAGE_WIDTH_MM, PagingMode, PaperFormat, Resolution},
        request::RenderRequest,
        theme::Theme,
    },
};

const ALL_THEMES: &str = "all";

/// What a conversion run will do, resolved before any browser starts.
#[derive(Debug, Clone)]
pub struct ConvertPlan {
    pub themes: Vec<Theme>,
    /// Canonical path of the Markdown file.
    pub source: PathBuf,
    pub paging: PagingMode,
    pub resolution: Resolution,
    pub output_dir: PathBuf,
}

impl ConvertPlan {
    pub fn from_args(args: &ConvertArgs, settings: &ConvertSettings) -> Result<Self, AppError> {
        let themes = parse_themes(&args.theme)?;

        let source = std::fs::canonicalize(&args.file).map_err(|err| {
            AppError::validation(format!(
                "markdown file `{}` is not readable: {err}",
                args.file.display()
            ))
        })?;
        if !source.is_file() {
            return Err(AppError::validation(format!(
                "`{}` is not a file",
                args.file.display()
            )));
        }

        let paging = match (&args.format, args.page_width) {
            (Some(format), _) => PagingMode::FixedFormat(format.parse::<PaperFormat>()?),
            (None, Some(width)) => PagingMode::single_page(width)?,
            (None, None) => PagingMode::single_page(DEFAULT_PAGE_WIDTH_MM)?,
        };

        Ok(Self {
            themes,
            source,
            paging,
            resolution: settings.resolution,
            output_dir: settings.output_dir.clone(),
        })
    }

    /// File stem shared by every output of this run.
    pub fn file_stem(&self) -> String {
        self.source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn base_dir(&self) -> Result<PathBuf, AppError> {
        self.source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::validation("markdown file has no parent directory"))
    }
}

fn parse_themes(value: &str) -> Result<Vec<Theme>, DomainError> {
    if value.trim().eq_ignore_ascii_case(ALL_THEMES) {
        return Ok(Theme::ALL.to_vec());
    }
    Ok(vec![value.parse::<Theme>()?])
}

/// Render every planned theme in turn. Later themes still run after a
/// failure; the run fails if any theme did.
pub async fn run(driver: &RenderDriver, plan: &ConvertPlan) -> Result<Vec<PathBuf>, AppError> {
    let markdown = tokio::fs::read_to_string(&plan.source).await.map_err(|err| {
        AppError::validation(format!(
            "failed to read `{}`: {err}",
            plan.source.display()
        ))
    })?;
    tokio::fs::create_dir_all(&plan.output_dir)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to create output directory: {err}")))?;

    let source = DocumentSource::LocalFile {
        base_dir: plan.base_dir()?,
    };
    let total = plan.themes.len();
    let mut written = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (index, theme) in plan.themes.iter().copied().enumerate() {
        info!(
            target = "md2pdf::convert",
            theme = theme.as_str(),
            progress = %format!("{}/{}", index + 1, total),
            "rendering theme"
        );

        let request = RenderRequest::new(markdown.clone(), theme)
            .with_file_name(&plan.file_stem())
            .with_resolution(plan.resolution)
            .with_paging(plan.paging);

        match render_one(driver, &request, source.clone(), &plan.output_dir).await {
            Ok(path) => {
                info!(
                    target = "md2pdf::convert",
                    theme = theme.as_str(),
                    path = %path.display(),
                    "pdf written"
                );
                written.push(path);
            }
            Err(err) => {
                error!(
                    target = "md2pdf::convert",
                    theme = theme.as_str(),
                    error = %err,
                    "theme failed"
                );
                failures.push(theme);
            }
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(AppError::unexpected(format!(
            "{} of {} themes failed: {}",
            failures.len(),
            total,
            failures.iter().map(|theme| theme.as_str()).collect::<Vec<_>>().join(", ")
        )))
    }
}

async fn render_one(
    driver: &RenderDriver,
    request: &RenderRequest,
    source: DocumentSource,
    output_dir: &Path,
) -> Result<PathBuf, AppError> {
    let pdf = driver.generate(request, source).await?;
    let path = output_dir.join(&pdf.file_name);
    tokio::fs::write(&path, &pdf.bytes)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to write `{}`: {err}", path.display())))?;
    Ok(path)
}
