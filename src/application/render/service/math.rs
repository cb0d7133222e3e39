//! Math span protection.
//!
//! Math delimiters (`$$`, `\(`, `\[`) collide with Markdown escaping and
//! emphasis rules, so spans are swapped for opaque alphanumeric tokens before
//! parsing and put back verbatim afterwards. Spans that start inside a fenced
//! code block are left alone.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

const TOKEN_STEM: &str = "MDPDFMATH";

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```.*$").expect("fence pattern is valid"));

static MATH_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\$\$.+?\$\$|\\\(.+?\\\)|\\\[.+?\\\]").expect("math span pattern is valid")
});

static MATH_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\$\$.+?\$\$|\\\(|\\\[").expect("math hint pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MathSpan {
    pub(crate) token: String,
    pub(crate) source: String,
}

#[derive(Debug, Default)]
pub(crate) struct ProtectedMath {
    pub(crate) text: String,
    pub(crate) spans: Vec<MathSpan>,
}

/// Whether the raw source looks like it needs the math typesetter at all.
pub(crate) fn contains_math(source: &str) -> bool {
    MATH_HINT.is_match(source)
}

/// Byte ranges of fenced code blocks. A fence opens on a line starting with
/// three backticks and closes at the next three backticks; an unterminated
/// fence runs to the end of input.
pub(crate) fn fence_ranges(source: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut cursor = 0;

    while cursor < source.len() {
        let Some(open) = FENCE_OPEN.find_at(source, cursor) else {
            break;
        };
        let body_start = open.end();
        let end = source[body_start..]
            .find("```")
            .map(|offset| body_start + offset + 3)
            .unwrap_or(source.len());
        ranges.push(open.start()..end);
        cursor = end;
    }

    ranges
}

pub(crate) fn protect(source: &str) -> ProtectedMath {
    let fences = fence_ranges(source);
    let prefix = token_prefix(source);

    let mut text = String::with_capacity(source.len());
    let mut spans = Vec::new();
    let mut last = 0;

    for found in MATH_SPAN.find_iter(source) {
        if fences.iter().any(|range| range.contains(&found.start())) {
            continue;
        }
        let token = format!("{prefix}{}X", spans.len());
        text.push_str(&source[last..found.start()]);
        text.push_str(&token);
        last = found.end();
        spans.push(MathSpan {
            token,
            source: found.as_str().to_string(),
        });
    }
    text.push_str(&source[last..]);

    ProtectedMath { text, spans }
}

pub(crate) fn restore(html: String, spans: &[MathSpan]) -> String {
    spans
        .iter()
        .fold(html, |acc, span| acc.replace(&span.token, &span.source))
}

/// Pick a token prefix that does not already occur in the document.
fn token_prefix(source: &str) -> String {
    (0u32..)
        .map(|salt| format!("{TOKEN_STEM}{salt}N"))
        .find(|candidate| !source.contains(candidate.as_str()))
        .unwrap_or_else(|| TOKEN_STEM.to_string())
}
