//! Resolve `<img>` references against caller-supplied image data.

use std::{borrow::Cow, cell::RefCell, collections::HashMap, rc::Rc};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::debug;

use crate::{application::render::types::RenderError, domain::request::ImageAsset};

use super::service::is_absolute_reference;

/// How unresolved local images are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// The engine can read the source directory; leave references alone.
    LocalFiles,
    /// No filesystem access to the original assets; attach a visible fallback.
    Detached,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedStats {
    pub embedded: usize,
    pub missing: usize,
}

/// Rewrite image sources to data URIs where the caller supplied the file.
pub fn embed(
    html: &str,
    images: &[ImageAsset],
    mode: EmbedMode,
) -> Result<(String, EmbedStats), RenderError> {
    if images.is_empty() && mode == EmbedMode::LocalFiles {
        return Ok((html.to_string(), EmbedStats::default()));
    }

    let lookup: HashMap<String, String> = images
        .iter()
        .map(|image| (image.name.clone(), image.data_uri.clone()))
        .collect();
    let stats = Rc::new(RefCell::new(EmbedStats::default()));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", {
                let stats = Rc::clone(&stats);
                move |el| {
                    let Some(src) = el.get_attribute("src") else {
                        return Ok(());
                    };
                    if is_absolute_reference(&src) {
                        return Ok(());
                    }

                    let name = file_name_of(&src);
                    if let Some(data_uri) = lookup_image(&lookup, name) {
                        el.set_attribute("src", data_uri)?;
                        stats.borrow_mut().embedded += 1;
                    } else if mode == EmbedMode::Detached {
                        el.set_attribute("onerror", &missing_image_handler(name))?;
                        el.set_attribute("data-missing-image", name)?;
                        stats.borrow_mut().missing += 1;
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    let stats = *stats.borrow();
    debug!(
        target = "md2pdf::render::embed",
        embedded = stats.embedded,
        missing = stats.missing,
        "images resolved"
    );
    Ok((rewritten, stats))
}

fn file_name_of(src: &str) -> &str {
    src.rsplit(['/', '\\']).next().unwrap_or(src)
}

fn lookup_image<'a>(lookup: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    if let Some(found) = lookup.get(name) {
        return Some(found.as_str());
    }
    // Markdown image URLs arrive percent-encoded while uploads keep the raw name.
    match urlencoding::decode(name) {
        Ok(Cow::Owned(decoded)) => lookup.get(&decoded).map(String::as_str),
        _ => None,
    }
}

/// Inline `onerror` handler that swaps a broken image for a placeholder
/// graphic naming the missing file.
pub fn missing_image_handler(name: &str) -> String {
    format!(
        "this.onerror=null;this.src='{}';",
        missing_image_placeholder(name)
    )
}

pub fn missing_image_placeholder(name: &str) -> String {
    let label = ammonia::clean_text(&format!("Missing image: {name}"));
    let svg = format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"480\" height=\"120\" viewBox=\"0 0 480 120\">",
            "<rect x=\"1\" y=\"1\" width=\"478\" height=\"118\" rx=\"6\" fill=\"#fdf2f2\" ",
            "stroke=\"#d9534f\" stroke-width=\"2\" stroke-dasharray=\"8 4\"/>",
            "<text x=\"240\" y=\"64\" text-anchor=\"middle\" font-family=\"sans-serif\" ",
            "font-size=\"18\" fill=\"#a94442\">{}</text></svg>"
        ),
        label
    );
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<ImageAsset> {
        vec![
            ImageAsset::new("chart.png", "data:image/png;base64,iVBORw0KGgo="),
            ImageAsset::new("my pic.jpg", "data:image/jpeg;base64,/9j/"),
        ]
    }

    #[test]
    fn known_images_become_data_uris() {
        let html = r#"<p><img src="assets/chart.png" alt="c"></p>"#;
        let (out, stats) = embed(html, &images(), EmbedMode::Detached).expect("embed");
        assert!(out.contains(r#"src="data:image/png;base64,iVBORw0KGgo=""#));
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.missing, 0);
    }

    #[test]
    fn windows_paths_and_encoded_names_resolve() {
        let html = r#"<img src="C:\shots\chart.png"><img src="img/my%20pic.jpg">"#;
        let (out, stats) = embed(html, &images(), EmbedMode::Detached).expect("embed");
        assert_eq!(stats.embedded, 2);
        assert!(out.contains("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn remote_and_data_sources_are_left_alone() {
        let html = r#"<img src="https://example.com/chart.png"><img src="data:image/gif;base64,R0lG">"#;
        let (out, stats) = embed(html, &images(), EmbedMode::Detached).expect("embed");
        assert_eq!(out, html);
        assert_eq!(stats, EmbedStats::default());
    }

    #[test]
    fn missing_images_get_a_visible_fallback_in_detached_mode() {
        let html = r#"<img src="figures/absent.png" alt="x">"#;
        let (out, stats) = embed(html, &images(), EmbedMode::Detached).expect("embed");
        assert_eq!(stats.missing, 1);
        assert!(out.contains("onerror="));
        assert!(out.contains("data:image/svg+xml;base64,"));
        assert!(out.contains(r#"data-missing-image="absent.png""#));
        assert!(out.contains(r#"src="figures/absent.png""#));
    }

    #[test]
    fn missing_images_are_untouched_for_local_files() {
        let html = r#"<img src="figures/absent.png">"#;
        let (out, stats) = embed(html, &images(), EmbedMode::LocalFiles).expect("embed");
        assert_eq!(out, html);
        assert_eq!(stats.missing, 0);
    }

    #[test]
    fn placeholder_names_the_missing_file() {
        let uri = missing_image_placeholder("diagram <1>.png");
        let encoded = uri
            .strip_prefix("data:image/svg+xml;base64,")
            .expect("base64 data uri");
        let svg = String::from_utf8(STANDARD.decode(encoded).expect("base64")).expect("utf8");
        assert!(svg.contains("Missing"));
        assert!(svg.contains("diagram"));
        assert!(!svg.contains("<1>"));
    }
}
