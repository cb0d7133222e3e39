use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use tracing::debug;
use url::Url;

const DIAGRAM_LANGUAGE: &str = "mermaid";

#[derive(Debug, Default)]
pub(crate) struct RewriteOutcome {
    pub(crate) diagrams: usize,
    pub(crate) code_blocks: usize,
    pub(crate) images_rebased: usize,
}

/// Walk the AST once, turning diagram fences into raw containers and, when an
/// image base is given, rebasing relative image references onto it.
pub(crate) fn rewrite_ast<'a>(root: &'a AstNode<'a>, image_base: Option<&Url>) -> RewriteOutcome {
    let mut walker = RewriteWalker {
        image_base,
        outcome: RewriteOutcome::default(),
    };
    walker.visit_nodes(root);
    walker.outcome
}

struct RewriteWalker<'a> {
    image_base: Option<&'a Url>,
    outcome: RewriteOutcome,
}

impl RewriteWalker<'_> {
    fn visit_nodes(&mut self, node: &AstNode<'_>) {
        if let Some(base) = self.image_base
            && rebase_image_node(node, base)
        {
            self.outcome.images_rebased += 1;
        }

        if let Some((info, literal)) = extract_code_block(node) {
            if info.trim() == DIAGRAM_LANGUAGE {
                let mut data = node.data.borrow_mut();
                data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                    block_type: 0,
                    literal: build_diagram_container(&literal),
                });
                self.outcome.diagrams += 1;
            } else {
                self.outcome.code_blocks += 1;
            }
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit_nodes(next);
            child = next.next_sibling();
        }
    }
}

/// Diagram source is emitted as-is; the in-page diagram engine reads the
/// element's text content.
fn build_diagram_container(literal: &str) -> String {
    let mut html = String::with_capacity(literal.len() + 32);
    html.push_str("<div class=\"mermaid\">\n");
    html.push_str(literal);
    if !literal.ends_with('\n') {
        html.push('\n');
    }
    html.push_str("</div>\n");
    html
}

fn rebase_image_node(node: &AstNode<'_>, base: &Url) -> bool {
    let mut data = node.data.borrow_mut();
    let NodeValue::Image(link) = &mut data.value else {
        return false;
    };
    if link.url.is_empty() || is_absolute_reference(&link.url) {
        return false;
    }

    match base.join(&link.url) {
        Ok(resolved) => {
            link.url = resolved.as_str().replace('\'', "%27");
            true
        }
        Err(err) => {
            debug!(
                target = "md2pdf::render::transform",
                src = %link.url,
                error = %err,
                "image reference could not be rebased"
            );
            false
        }
    }
}

pub(crate) fn is_absolute_reference(src: &str) -> bool {
    let lowered = src.trim_start().to_ascii_lowercase();
    ["http:", "https:", "file:", "data:", "blob:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        let info = block.info.trim().to_string();
        let literal = block.literal.clone();
        Some((info, literal))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comrak::{Arena, format_html, parse_document};

    fn render(markdown: &str, base: Option<&Url>) -> (String, RewriteOutcome) {
        let options = crate::application::render::service::config::default_options();
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &options);
        let outcome = rewrite_ast(root, base);
        let mut html = String::new();
        format_html(root, &options, &mut html).expect("html");
        (html, outcome)
    }

    #[test]
    fn mermaid_fence_becomes_unescaped_container() {
        let (html, outcome) = render("```mermaid\ngraph TD;A-->B;\n```", None);
        assert_eq!(outcome.diagrams, 1);
        assert!(html.contains("<div class=\"mermaid\">\ngraph TD;A-->B;\n</div>"));
        assert!(!html.contains("&gt;"));
    }

    #[test]
    fn other_fences_stay_escaped_code() {
        let (html, outcome) = render("```html\n<b>bold</b>\n```", None);
        assert_eq!(outcome.code_blocks, 1);
        assert!(html.contains("<code class=\"language-html\">&lt;b&gt;bold&lt;/b&gt;"));
    }

    #[test]
    fn relative_images_are_rebased_onto_the_source_directory() {
        let base = Url::parse("file:///home/user/notes/").expect("base");
        let (html, outcome) = render(
            "![a](<img/it's here.png>) ![b](https://example.com/x.png)",
            Some(&base),
        );
        assert_eq!(outcome.images_rebased, 1);
        assert!(html.contains("src=\"file:///home/user/notes/img/it%27s%20here.png\""));
        assert!(html.contains("src=\"https://example.com/x.png\""));
    }

    #[test]
    fn images_untouched_without_base() {
        let (html, outcome) = render("![a](img/a.png)", None);
        assert_eq!(outcome.images_rebased, 0);
        assert!(html.contains("src=\"img/a.png\""));
    }
}
