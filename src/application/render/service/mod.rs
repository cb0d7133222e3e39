mod config;
mod math;
mod rewrite;

use comrak::{Arena, format_html, nodes::AstNode, parse_document};
use once_cell::sync::Lazy;
use tracing::debug;
use url::Url;

use crate::application::render::types::RenderError;

pub(crate) use rewrite::is_absolute_reference;

use config::default_options;
use math::ProtectedMath;
use rewrite::rewrite_ast;

/// Where relative image references in the Markdown should point.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Directory URL (with trailing slash) used to rebase relative images.
    /// `None` leaves image references untouched.
    pub image_base: Option<Url>,
}

impl TransformOptions {
    pub fn with_image_base(image_base: Url) -> Self {
        Self {
            image_base: Some(image_base),
        }
    }
}

/// HTML body produced from one Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub html: String,
    /// The source contains math delimiters and the page needs the typesetter.
    pub has_math: bool,
    pub math_spans: usize,
    pub diagrams: usize,
}

/// Comrak-based Markdown to HTML conversion with math protection and diagram
/// fences.
pub struct MarkdownTransformer {
    options: comrak::Options<'static>,
}

static TRANSFORMER: Lazy<MarkdownTransformer> = Lazy::new(MarkdownTransformer::new);

/// Shared transformer instance, initialised on first use.
pub fn transformer() -> &'static MarkdownTransformer {
    &TRANSFORMER
}

impl Default for MarkdownTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownTransformer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
        }
    }

    pub fn transform(
        &self,
        markdown: &str,
        options: &TransformOptions,
    ) -> Result<Transformed, RenderError> {
        let has_math = math::contains_math(markdown);
        let ProtectedMath { text, spans } = math::protect(markdown);

        let arena = Arena::new();
        let root = parse_document(&arena, &text, &self.options);
        let outcome = rewrite_ast(root, options.image_base.as_ref());
        let html = render_html_stage(root, &self.options)?;
        let html = math::restore(html, &spans);

        debug!(
            target = "md2pdf::render::transform",
            math_spans = spans.len(),
            diagrams = outcome.diagrams,
            code_blocks = outcome.code_blocks,
            images_rebased = outcome.images_rebased,
            "markdown transformed"
        );

        Ok(Transformed {
            html,
            has_math,
            math_spans: spans.len(),
            diagrams: outcome.diagrams,
        })
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}
