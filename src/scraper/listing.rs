//! Listing pages: entry extraction with ordered selector fallbacks, and the paginated walk.
//!
//! The target theme is not guaranteed stable, so each field is resolved by trying several
//! known template conventions in order until one yields a value.

use crate::model::ListingEntry;
use crate::scraper::{
    first_attr, parse_selector, parse_url, resolve, stripped_text, PageSource, ScraperError,
};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Anchor selectors, one per anticipated listing template, tried in this order.
const ANCHOR_SELECTORS: [&str; 6] = [
    ".bsx a",
    ".page-item-detail .item-thumb a",
    ".c-page__content .page-listing-item .page-item-detail a",
    ".post .thumb a",
    ".item-thumb a",
    ".cover a",
];

/// Headings searched inside the anchor and its ancestors, in priority order.
const HEADING_SELECTORS: [&str; 4] = [".post-title", ".title", "h3", "h2"];

const NEXT_PAGE_SELECTOR: &str = "a.next, a.paginate-next, li.next a, .wp-pagenavi a.next";

/// Anchor plus up to three ancestors.
const ANCESTOR_LEVELS: usize = 4;

const ANCHOR_IMAGE_ATTRS: [&str; 3] = ["data-src", "src", "data-lazy-src"];
const PARENT_IMAGE_ATTRS: [&str; 2] = ["data-src", "src"];

/// Compiled selectors for listing pages.
struct ListingSelectors {
    anchors: Vec<Selector>,
    headings: Vec<Selector>,
    short_title: Selector,
    img: Selector,
    next_page: Selector,
}

impl ListingSelectors {
    fn new() -> Result<Self, ScraperError> {
        Ok(Self {
            anchors: ANCHOR_SELECTORS
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_, _>>()?,
            headings: HEADING_SELECTORS
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_, _>>()?,
            short_title: parse_selector(".tt")?,
            img: parse_selector("img")?,
            next_page: parse_selector(NEXT_PAGE_SELECTOR)?,
        })
    }
}

/// One step of a fallback chain: look at an anchor, maybe produce a value.
type Resolver = fn(ElementRef<'_>, &ListingSelectors) -> Option<String>;

const TITLE_CHAIN: [Resolver; 3] = [
    title_from_attrs,
    title_from_short_title,
    title_from_ancestor_heading,
];

const IMAGE_CHAIN: [Resolver; 2] = [image_in_anchor, image_in_parent];

fn first_of(chain: &[Resolver], a: ElementRef<'_>, sels: &ListingSelectors) -> Option<String> {
    chain.iter().find_map(|resolver| resolver(a, sels))
}

fn title_from_attrs(a: ElementRef<'_>, _: &ListingSelectors) -> Option<String> {
    first_attr(a, &["title", "aria-label"])
}

fn title_from_short_title(a: ElementRef<'_>, sels: &ListingSelectors) -> Option<String> {
    a.select(&sels.short_title)
        .next()
        .map(|el| stripped_text(el, ""))
        .filter(|t| !t.is_empty())
}

fn title_from_ancestor_heading(a: ElementRef<'_>, sels: &ListingSelectors) -> Option<String> {
    std::iter::successors(Some(a), |el| el.parent().and_then(ElementRef::wrap))
        .take(ANCESTOR_LEVELS)
        .find_map(|level| {
            sels.headings.iter().find_map(|sel| {
                level
                    .select(sel)
                    .next()
                    .map(|el| stripped_text(el, ""))
                    .filter(|t| !t.is_empty())
            })
        })
}

fn image_in_anchor(a: ElementRef<'_>, sels: &ListingSelectors) -> Option<String> {
    a.select(&sels.img)
        .next()
        .and_then(|img| first_attr(img, &ANCHOR_IMAGE_ATTRS))
}

fn image_in_parent(a: ElementRef<'_>, sels: &ListingSelectors) -> Option<String> {
    a.parent()
        .and_then(ElementRef::wrap)?
        .select(&sels.img)
        .next()
        .and_then(|img| first_attr(img, &PARENT_IMAGE_ATTRS))
}

/// Extract listing entries from one page. Links and images are resolved against `page_url`;
/// entries are deduplicated by link within the page, first occurrence kept.
pub fn parse_listing(html: &str, page_url: &Url) -> Result<Vec<ListingEntry>, ScraperError> {
    let sels = ListingSelectors::new()?;
    let doc = Html::parse_document(html);
    Ok(entries_in(&doc, page_url, &sels))
}

fn entries_in(doc: &Html, page_url: &Url, sels: &ListingSelectors) -> Vec<ListingEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for sel in &sels.anchors {
        for a in doc.select(sel) {
            let Some(link) = a.value().attr("href").and_then(|h| resolve(page_url, h)) else {
                continue;
            };
            if !seen.insert(link.clone()) {
                continue;
            }
            let title = first_of(&TITLE_CHAIN, a, sels).unwrap_or_default();
            let image = first_of(&IMAGE_CHAIN, a, sels)
                .and_then(|src| resolve(page_url, &src))
                .unwrap_or_default();
            entries.push(ListingEntry { title, link, image });
        }
    }
    entries
}

/// Explicit "next page" navigation link, if the page has one.
fn next_page_url(doc: &Html, page_url: &Url, sels: &ListingSelectors) -> Option<Url> {
    doc.select(&sels.next_page)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty() && !h.starts_with('#'))
        .find_map(|h| page_url.join(h).ok())
}

/// True when the path already names a page: `.../page/` or `.../page/<n>/`.
fn looks_paginated(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., "page"] => true,
        [.., "page", n] => n.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Best-effort guess at the second page when the first page shows no navigation:
/// `<path>/page/2/`, keeping the query. Returns None for paths that already look paginated.
fn guess_second_page(page_url: &Url) -> Option<Url> {
    if looks_paginated(page_url.path()) {
        return None;
    }
    let mut next = page_url.clone();
    let path = format!("{}/page/2/", page_url.path().trim_end_matches('/'));
    next.set_path(&path);
    next.set_fragment(None);
    Some(next)
}

/// Limits for a listing walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Stop once this many entries are collected. 0 means no limit.
    pub limit: usize,
    /// Pause between consecutive page fetches.
    pub page_delay: Duration,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            page_delay: Duration::from_secs(1),
        }
    }
}

/// Run-scoped accumulator: entries in discovery order plus the set of links already taken.
#[derive(Debug, Default)]
pub struct ListingAccumulator {
    entries: Vec<ListingEntry>,
    seen: HashSet<String>,
    limit: usize,
}

impl ListingAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn is_full(&self) -> bool {
        self.limit > 0 && self.entries.len() >= self.limit
    }

    /// Add an entry unless its link was already taken or the limit is reached. Returns whether it was added.
    pub fn push(&mut self, entry: ListingEntry) -> bool {
        if self.is_full() || self.seen.contains(&entry.link) {
            return false;
        }
        self.seen.insert(entry.link.clone());
        self.entries.push(entry);
        true
    }

    /// Add entries in order, stopping as soon as the limit is reached. Returns how many were added.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ListingEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if self.is_full() {
                break;
            }
            if self.push(entry) {
                added += 1;
            }
        }
        added
    }

    pub fn into_entries(self) -> Vec<ListingEntry> {
        self.entries
    }
}

/// Follow listing pagination from `start_url`, collecting unique entries.
///
/// Stops when the limit is reached (possibly mid-page), when a page cannot be fetched, or when
/// no next page can be found. A fetch failure ends the walk with whatever was collected so far.
/// Only an unparseable start URL is an error.
pub fn walk_listing<S: PageSource + ?Sized>(
    source: &S,
    start_url: &str,
    options: &WalkOptions,
) -> Result<Vec<ListingEntry>, ScraperError> {
    let sels = ListingSelectors::new()?;
    let mut acc = ListingAccumulator::new(options.limit);
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(parse_url(start_url)?);
    let mut page_count = 0u32;

    while let Some(page_url) = next.take() {
        if !visited.insert(page_url.to_string()) {
            debug!("Listing page {} already visited; stopping", page_url);
            break;
        }
        info!("Fetching listing page: {}", page_url);
        let html = match source.fetch_page(page_url.as_str()) {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to load listing page {}: {}", page_url, e);
                break;
            }
        };
        page_count += 1;

        let doc = Html::parse_document(&html);
        let added = acc.extend(entries_in(&doc, &page_url, &sels));
        if acc.is_full() {
            info!("Reached limit {}", options.limit);
            break;
        }
        info!("Added {} entries from page {}", added, page_count);

        next = next_page_url(&doc, &page_url, &sels).or_else(|| {
            if page_count == 1 {
                guess_second_page(&page_url)
            } else {
                None
            }
        });
        if next.is_some() && !options.page_delay.is_zero() {
            std::thread::sleep(options.page_delay);
        }
    }

    Ok(acc.into_entries())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::StaticSite;

    fn base() -> Url {
        Url::parse("https://mangaindo.biz/all-mangas/").expect("static url")
    }

    fn no_delay(limit: usize) -> WalkOptions {
        WalkOptions {
            limit,
            page_delay: Duration::ZERO,
        }
    }

    fn bsx_item(slug: &str, title: &str) -> String {
        format!(
            r#"<div class="bsx"><a href="/manga/{slug}/" title="{title}"><img data-src="/covers/{slug}.jpg" src="/placeholder.gif"></a></div>"#
        )
    }

    #[test]
    fn parse_listing_collapses_duplicate_links() -> Result<(), ScraperError> {
        let html = format!(
            "<html><body>{}{}{}{}</body></html>",
            bsx_item("a", "A"),
            bsx_item("b", "B"),
            bsx_item("a", "A again"),
            bsx_item("c", "C"),
        );
        let entries = parse_listing(&html, &base())?;
        let links: Vec<_> = entries.iter().map(|e| e.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://mangaindo.biz/manga/a/",
                "https://mangaindo.biz/manga/b/",
                "https://mangaindo.biz/manga/c/",
            ]
        );
        assert_eq!(entries[0].title, "A");
        Ok(())
    }

    #[test]
    fn anchors_matched_by_several_strategies_appear_once() -> Result<(), ScraperError> {
        let html = r#"<div class="page-item-detail"><div class="item-thumb"><a href="/manga/x/" title="X"></a></div></div>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://mangaindo.biz/manga/x/");
        Ok(())
    }

    #[test]
    fn anchors_without_href_are_skipped() -> Result<(), ScraperError> {
        let html = r#"<div class="bsx"><a>no link</a><a href="  ">blank</a></div>"#;
        assert!(parse_listing(html, &base())?.is_empty());
        Ok(())
    }

    #[test]
    fn title_attribute_beats_ancestor_heading() -> Result<(), ScraperError> {
        let html = r#"<div class="bsx"><h3>Heading Title</h3><a href="/m/1/" title="Attr Title"><div class="tt">Short</div></a></div>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries[0].title, "Attr Title");
        Ok(())
    }

    #[test]
    fn aria_label_then_short_title() -> Result<(), ScraperError> {
        let html = r#"<div class="bsx"><a href="/m/1/" aria-label=" Label "></a><a href="/m/2/"><span class="tt"> Short Two </span></a></div>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries[0].title, "Label");
        assert_eq!(entries[1].title, "Short Two");
        Ok(())
    }

    #[test]
    fn title_from_ancestor_heading_within_four_levels() -> Result<(), ScraperError> {
        let html = r#"<div class="item"><h3> Found Me </h3><div class="cover"><span><a href="/m/1/"><img src="/c.jpg"></a></span></div></div>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries[0].title, "Found Me");
        Ok(())
    }

    #[test]
    fn ancestor_heading_search_stops_after_four_levels() -> Result<(), ScraperError> {
        let html = r#"<section><h2>Too Far</h2><div><div><div class="cover"><span><a href="/m/1/"></a></span></div></div></div></section>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries[0].title, "");
        Ok(())
    }

    #[test]
    fn image_prefers_lazy_source_then_parent() -> Result<(), ScraperError> {
        let html = r#"<div class="bsx">
            <a href="/m/1/" title="One"><img src="/ph.gif" data-src="https://cdn.example.com/1.jpg"></a>
        </div>
        <div class="cover"><img data-src="/covers/2.jpg" src="/ph.gif"><a href="/m/2/" title="Two">Two</a></div>
        <div class="cover"><a href="/m/3/" title="Three">Three</a></div>"#;
        let entries = parse_listing(html, &base())?;
        assert_eq!(entries[0].image, "https://cdn.example.com/1.jpg");
        assert_eq!(entries[1].image, "https://mangaindo.biz/covers/2.jpg");
        assert_eq!(entries[2].image, "");
        Ok(())
    }

    #[test]
    fn looks_paginated_paths() {
        assert!(looks_paginated("/all-mangas/page/"));
        assert!(looks_paginated("/all-mangas/page/1/"));
        assert!(looks_paginated("/all-mangas/page/7"));
        assert!(!looks_paginated("/all-mangas/"));
        assert!(!looks_paginated("/page-turners/"));
    }

    #[test]
    fn guess_second_page_appends_page_two() {
        let guessed = guess_second_page(&base()).map(String::from);
        assert_eq!(
            guessed.as_deref(),
            Some("https://mangaindo.biz/all-mangas/page/2/")
        );
        let paged = Url::parse("https://mangaindo.biz/all-mangas/page/1/").expect("static url");
        assert!(guess_second_page(&paged).is_none());
    }

    #[test]
    fn accumulator_dedupes_and_truncates() {
        let mut acc = ListingAccumulator::new(2);
        let entry = |l: &str| ListingEntry {
            title: String::new(),
            link: l.to_string(),
            image: String::new(),
        };
        assert_eq!(acc.extend(vec![entry("a"), entry("a"), entry("b"), entry("c")]), 2);
        assert!(acc.is_full());
        assert!(!acc.push(entry("d")));
        let links: Vec<_> = acc.into_entries().into_iter().map(|e| e.link).collect();
        assert_eq!(links, vec!["a", "b"]);
    }

    #[test]
    fn walk_follows_next_links_and_dedupes_globally() -> Result<(), ScraperError> {
        let page1 = format!(
            r#"<html><body>{}{}<a class="next" href="https://mangaindo.biz/all-mangas/page/2/">Next</a></body></html>"#,
            bsx_item("a", "A"),
            bsx_item("b", "B"),
        );
        let page2 = format!(
            "<html><body>{}{}</body></html>",
            bsx_item("b", "B"),
            bsx_item("c", "C")
        );
        let site = StaticSite::new()
            .page("https://mangaindo.biz/all-mangas/", &page1)
            .page("https://mangaindo.biz/all-mangas/page/2/", &page2);
        let entries = walk_listing(&site, "https://mangaindo.biz/all-mangas/", &no_delay(0))?;
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        Ok(())
    }

    #[test]
    fn walk_truncates_mid_page_at_limit() -> Result<(), ScraperError> {
        let page1 = format!(
            r#"{}{}{}<a class="next" href="/all-mangas/page/2/">Next</a>"#,
            bsx_item("a", "A"),
            bsx_item("b", "B"),
            bsx_item("c", "C"),
        );
        let site = StaticSite::new().page("https://mangaindo.biz/all-mangas/", &page1);
        let entries = walk_listing(&site, "https://mangaindo.biz/all-mangas/", &no_delay(2))?;
        assert_eq!(entries.len(), 2);
        assert_eq!(site.requested(), vec!["https://mangaindo.biz/all-mangas/"]);
        Ok(())
    }

    #[test]
    fn walk_limit_larger_than_available_returns_all() -> Result<(), ScraperError> {
        let page1 = format!("{}{}", bsx_item("a", "A"), bsx_item("b", "B"));
        let site = StaticSite::new().page("https://mangaindo.biz/all-mangas/page/1/", &page1);
        let entries = walk_listing(
            &site,
            "https://mangaindo.biz/all-mangas/page/1/",
            &no_delay(10),
        )?;
        assert_eq!(entries.len(), 2);
        Ok(())
    }

    #[test]
    fn walk_guesses_page_two_only_after_first_page() -> Result<(), ScraperError> {
        let site = StaticSite::new()
            .page("https://mangaindo.biz/all-mangas/", &bsx_item("a", "A"))
            .page("https://mangaindo.biz/all-mangas/page/2/", &bsx_item("b", "B"));
        let entries = walk_listing(&site, "https://mangaindo.biz/all-mangas/", &no_delay(0))?;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            site.requested(),
            vec![
                "https://mangaindo.biz/all-mangas/",
                "https://mangaindo.biz/all-mangas/page/2/",
            ]
        );
        Ok(())
    }

    #[test]
    fn walk_first_page_failure_yields_nothing() -> Result<(), ScraperError> {
        let site = StaticSite::new();
        let entries = walk_listing(&site, "https://mangaindo.biz/all-mangas/", &no_delay(0))?;
        assert!(entries.is_empty());
        assert_eq!(site.requested().len(), 1);
        Ok(())
    }

    #[test]
    fn walk_stops_on_self_referencing_next_link() -> Result<(), ScraperError> {
        let page = format!(
            r#"{}<a class="next" href="/all-mangas/page/3/">Next</a>"#,
            bsx_item("a", "A")
        );
        let site = StaticSite::new().page("https://mangaindo.biz/all-mangas/page/3/", &page);
        let entries = walk_listing(
            &site,
            "https://mangaindo.biz/all-mangas/page/3/",
            &no_delay(0),
        )?;
        assert_eq!(entries.len(), 1);
        assert_eq!(site.requested().len(), 1);
        Ok(())
    }

    #[test]
    fn walk_rejects_invalid_start_url() {
        let site = StaticSite::new();
        assert!(matches!(
            walk_listing(&site, "not a url", &no_delay(0)),
            Err(ScraperError::InvalidUrl { .. })
        ));
    }
}
