//! Main-text extraction from article pages.
//!
//! Article pages come from many templates, so extraction tries a ranked list
//! of known content containers (the people.cn family first, generic class
//! names last). Inside the first container that exists, noise subtrees such
//! as scripts, related-article widgets, inline links and spans are skipped
//! before the visible text is collected. If no container yields enough text,
//! every `<p>` on the page is concatenated instead.
//!
//! Extraction is CPU-bound and `scraper::Html` is not `Send`, so callers run
//! [`extract_body`] inside `spawn_blocking` and only move `String`s across.

use crate::utils::clean_text;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Minimum number of characters a candidate body needs to be accepted.
pub const MIN_EXTRACT_CHARS: usize = 50;

const CONTENT_SELECTORS: [&str; 9] = [
    "#rwb_zw",
    ".rm_txt_con",
    ".rm_txt",
    ".article-content",
    ".article",
    ".content",
    ".main-content",
    "#articleContent",
    ".text_content",
];

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static NOISE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script, style, .zdfy, .editor, .related-news, a, span").unwrap());

static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Extract the cleaned main text of an HTML page.
///
/// Returns an empty string when nothing on the page qualifies; that means
/// "no usable body", not an error.
pub fn extract_body(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);

    for selector in CONTAINERS.iter() {
        if let Some(node) = document.select(selector).next() {
            let mut parts = Vec::new();
            collect_visible_text(node, &mut parts);
            let body = clean_text(&parts.join(" "));
            if body.chars().count() > MIN_EXTRACT_CHARS {
                return body;
            }
        }
    }

    let paragraphs = document
        .select(&PARAGRAPHS)
        .map(|p| p.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>();
    if !paragraphs.is_empty() {
        let body = clean_text(&paragraphs.join(" "));
        if body.chars().count() > MIN_EXTRACT_CHARS {
            return body;
        }
    }

    String::new()
}

fn collect_visible_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if NOISE.matches(&child_element) {
                continue;
            }
            collect_visible_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push(text.to_string());
        }
    }
}
