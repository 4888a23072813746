//! Scraping: the page-fetching seam, shared selector and text helpers, listing walk, and detail extraction.

mod client;
mod error;

pub mod detail;
pub mod listing;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use detail::{extract_detail, fetch_details, DetailOptions};
pub use error::ScraperError;
pub use listing::{parse_listing, walk_listing, WalkOptions};

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

/// Source of page markup. `PoliteClient` fetches over HTTP; tests serve fixtures from memory.
///
/// An `Err` means the page is unavailable after whatever retrying the source does; callers skip
/// that unit of work.
pub trait PageSource: Sync {
    fn fetch_page(&self, url: &str) -> Result<String, ScraperError>;
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_url(input: &str) -> Result<Url, ScraperError> {
    Url::parse(input).map_err(|e| ScraperError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve `href` against `base`. Blank hrefs resolve to nothing.
pub(crate) fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// Text of `el` with each text node trimmed, blanks dropped, and the rest joined by `sep`.
pub(crate) fn stripped_text(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// First non-blank value of the listed attributes on `el`, trimmed.
pub(crate) fn first_attr(el: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// First element in `doc` matching `sel`, or None when nothing matches.
pub(crate) fn select_first<'a>(doc: &'a Html, sel: &Selector) -> Option<ElementRef<'a>> {
    doc.select(sel).next()
}
