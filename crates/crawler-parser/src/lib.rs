//! Pulls outlinks, title, and visible text out of a fetched HTML page.
//!
//! Link extraction hands back raw `href` attribute values — resolving and
//! canonicalizing them against the page's URL is the caller's job, so this
//! crate stays free of any particular URL-handling policy.

use scraper::{Html, Selector};

pub struct ParsedPage {
    pub title: Option<String>,
    pub body_text: String,
    pub links: Vec<String>,
}

/// Schemes and placeholders that can never resolve to a crawlable page.
fn is_skippable_href(href: &str) -> bool {
    let h = href.trim();
    h.is_empty()
        || h.starts_with('#')
        || h.starts_with("javascript:")
        || h.starts_with("mailto:")
        || h.starts_with("tel:")
        || h.starts_with("data:")
}

/// Parses `html`, returning its title, flattened visible body text, and the
/// raw (unresolved) `href` values of every `<a>` tag worth following.
pub fn parse(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let body_text = select_first(&document, "body")
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let links = extract_links(&document);

    ParsedPage {
        title,
        body_text,
        links,
    }
}

fn select_first<'a>(document: &'a Html, sel: &str) -> Option<scraper::ElementRef<'a>> {
    let selector = Selector::parse(sel).ok()?;
    document.select(&selector).next()
}

fn extract_links(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !is_skippable_href(href))
        .map(|href| href.to_string())
        .collect()
}
