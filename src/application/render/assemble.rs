//! Wrap a transformed HTML body into the complete document loaded by the
//! rendering engine (or served to the browser preview).

use std::path::PathBuf;

use url::Url;

use crate::domain::theme::Theme;

const MERMAID_SCRIPT: &str = "libs/mermaid.min.js";
const HIGHLIGHT_SCRIPT: &str = "libs/highlight.min.js";
const MATHJAX_SCRIPT: &str = "libs/tex-mml-svg.js";

const MATHJAX_CONFIG: &str = r#"<script id="mathjax-config">
window.MathJax = {
  tex: {
    inlineMath: [['$', '$'], ['\\(', '\\)']],
    displayMath: [['$$', '$$'], ['\\[', '\\]']]
  },
  options: { skipHtmlTags: ['noscript', 'style', 'textarea', 'pre', 'code'] },
  svg: { fontCache: 'global' },
  startup: { typeset: false }
};
</script>"#;

const BOOTSTRAP: &str = r#"<script>
document.addEventListener('DOMContentLoaded', function () {
  if (window.mermaid) {
    mermaid.initialize({ startOnLoad: false });
    var pending = typeof mermaid.run === 'function'
      ? mermaid.run({ querySelector: '.mermaid' })
      : Promise.resolve(mermaid.init(undefined, '.mermaid'));
    Promise.resolve(pending).catch(function (err) { console.warn('diagram render failed', err); });
  }
  if (window.hljs) {
    hljs.highlightAll();
    document.querySelectorAll('code.hljs').forEach(function (el) { el.classList.remove('hljs'); });
  }
});
</script>"#;

/// Root that stylesheet and script references are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetBase {
    /// Absolute directory containing `style/` and `libs/`; emitted as `file://` URLs.
    Directory(PathBuf),
    /// URL prefix for documents served over HTTP; empty means origin-relative.
    Origin(String),
}

impl AssetBase {
    pub fn url(&self, relative: &str) -> String {
        match self {
            AssetBase::Directory(dir) => {
                let path = dir.join(relative);
                Url::from_file_path(&path)
                    .map(String::from)
                    .unwrap_or_else(|()| path.to_string_lossy().into_owned())
            }
            AssetBase::Origin(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), relative),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub theme: Theme,
    /// Width the content column is constrained to, in millimetres.
    pub content_width_mm: f64,
    pub margin_mm: f64,
    pub title: String,
    pub has_math: bool,
    pub assets: AssetBase,
}

pub fn assemble(body: &str, options: &DocumentOptions) -> String {
    let assets = &options.assets;
    let theme = options.theme;
    let mut html = String::with_capacity(body.len() + 4096);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\" />\n");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />\n",
    );
    push_stylesheet(&mut html, &assets.url(&format!("style/{}", theme.stylesheet())));
    push_stylesheet(
        &mut html,
        &assets.url(&format!("style/{}", theme.highlight_stylesheet())),
    );
    html.push_str(&format!(
        "<title>{} - PDF export</title>\n",
        escape_html(&options.title)
    ));
    push_page_style(&mut html, options);
    push_deferred_script(&mut html, &assets.url(MERMAID_SCRIPT));
    push_deferred_script(&mut html, &assets.url(HIGHLIGHT_SCRIPT));
    if options.has_math {
        html.push_str(MATHJAX_CONFIG);
        html.push('\n');
        push_deferred_script(&mut html, &assets.url(MATHJAX_SCRIPT));
    }
    html.push_str("</head>\n<body>\n<div class=\"markdown-body\">\n");
    html.push_str(body);
    html.push_str("\n</div>\n");
    html.push_str(BOOTSTRAP);
    html.push_str("\n</body>\n</html>\n");
    html
}

fn push_page_style(html: &mut String, options: &DocumentOptions) {
    let width = options.content_width_mm;
    let margin = options.margin_mm;
    let background = options.theme.background();
    html.push_str(&format!(
        r#"<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
html, body {{
  max-width: {width}mm !important;
  margin: 0 auto;
  padding: {margin}mm;
  height: auto !important;
  min-height: auto;
  background: {background};
  overflow-y: auto;
}}
.markdown-body {{ width: 100%; box-sizing: border-box; }}
h1, h2, h3, h4, h5, h6 {{ margin-top: 1.2em; margin-bottom: 0.6em; }}
p, ul, ol {{ margin-bottom: 1em; }}
pre, table {{ margin: 1em 0; }}
pre {{ white-space: pre-wrap; word-wrap: break-word; }}
.mermaid {{ display: block; margin: 1.5em auto; text-align: center; }}
.hljs-comment, .hljs-quote {{ font-style: normal !important; }}
@media print {{
  body {{ padding: 0; height: auto !important; min-height: 100vh; }}
  @page :first {{ margin-top: 0mm; }}
  @page {{ margin: 0mm {margin}mm; }}
}}
</style>
"#
    ));
}

fn push_stylesheet(html: &mut String, href: &str) {
    html.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"{}\">\n",
        escape_html(href)
    ));
}

fn push_deferred_script(html: &mut String, src: &str) {
    html.push_str(&format!(
        "<script src=\"{}\" defer></script>\n",
        escape_html(src)
    ));
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\n' | '\r' | '\t' => escaped.push(' '),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(theme: Theme, has_math: bool) -> DocumentOptions {
        DocumentOptions {
            theme,
            content_width_mm: 580.0,
            margin_mm: 10.0,
            title: "notes".to_string(),
            has_math,
            assets: AssetBase::Directory(PathBuf::from("/srv/md2pdf/assets")),
        }
    }

    #[test]
    fn dark_themes_get_dark_background() {
        let html = assemble("<p>x</p>", &options(Theme::Atom, false));
        assert!(html.contains("background: #282c34;"));
        let html = assemble("<p>x</p>", &options(Theme::Github, false));
        assert!(html.contains("background: #ffffff;"));
    }

    #[test]
    fn content_width_and_margin_are_applied() {
        let mut opts = options(Theme::Vue, false);
        opts.content_width_mm = 210.5;
        opts.margin_mm = 12.0;
        let html = assemble("<p>x</p>", &opts);
        assert!(html.contains("max-width: 210.5mm !important;"));
        assert!(html.contains("padding: 12mm;"));
        assert!(html.contains("@page { margin: 0mm 12mm; }"));
    }

    #[test]
    fn assets_resolve_to_file_urls() {
        let html = assemble("", &options(Theme::Monokai, false));
        assert!(html.contains(r#"href="file:///srv/md2pdf/assets/style/monokai.css""#));
        assert!(html.contains(r#"href="file:///srv/md2pdf/assets/style/monokai.min.css""#));
        assert!(html.contains(r#"<script src="file:///srv/md2pdf/assets/libs/mermaid.min.js" defer>"#));
        assert!(html.contains(r#"<script src="file:///srv/md2pdf/assets/libs/highlight.min.js" defer>"#));
    }

    #[test]
    fn math_engine_is_loaded_only_when_needed_and_never_auto_typesets() {
        let without = assemble("", &options(Theme::Vue, false));
        assert!(!without.contains("MathJax"));
        assert!(!without.contains("tex-mml-svg.js"));

        let with = assemble("", &options(Theme::Vue, true));
        assert!(with.contains("startup: { typeset: false }"));
        assert!(with.contains(r#"libs/tex-mml-svg.js" defer>"#));
    }

    #[test]
    fn diagrams_do_not_start_on_load() {
        let html = assemble("", &options(Theme::Vue, false));
        assert!(html.contains("startOnLoad: false"));
        assert!(!html.contains("startOnLoad: true"));
    }

    #[test]
    fn origin_base_emits_relative_urls_and_escapes_title() {
        let mut opts = options(Theme::Light, false);
        opts.assets = AssetBase::Origin(String::new());
        opts.title = "<script>".to_string();
        let html = assemble("<p>body</p>", &opts);
        assert!(html.contains(r#"href="/style/light.css""#));
        assert!(html.contains("<title>&lt;script&gt; - PDF export</title>"));
        assert!(html.contains("<div class=\"markdown-body\">\n<p>body</p>\n</div>"));
    }

    #[test]
    fn head_elements_are_emitted_one_per_line() {
        let html = assemble("", &options(Theme::Github, true));
        let head = html.split("</head>").next().expect("head");
        let lines: Vec<&str> = head.lines().collect();
        assert!(lines.contains(&r#"<link rel="stylesheet" href="file:///srv/md2pdf/assets/style/github.css">"#));
        assert!(lines.contains(&"<title>notes - PDF export</title>"));
        assert!(lines.contains(&r#"<script src="file:///srv/md2pdf/assets/libs/tex-mml-svg.js" defer></script>"#));
        assert!(head.trim_end().ends_with("</script>"));
    }
}
