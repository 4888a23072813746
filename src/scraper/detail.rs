//! Detail pages: title, description, cover, and chapter list; plus the worker pool that runs
//! extraction for a whole listing.

use crate::model::{ChapterRef, ListingEntry, MangaDetail};
use crate::scraper::{
    first_attr, parse_selector, parse_url, resolve, select_first, stripped_text, PageSource,
    ScraperError,
};
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const TITLE_SELECTORS: [&str; 4] = [".post-title h1", ".post-title", "h1.entry-title", "h1"];
const SUMMARY_SELECTOR: &str =
    ".summary_content, .entry-content .summary, .main-content .summary, .summary";
const CONTENT_SELECTOR: &str = ".post .entry-content";
const META_DESCRIPTION_SELECTOR: &str = r#"meta[name="description"]"#;
const META_IMAGE_SELECTOR: &str = r#"meta[property="og:image"]"#;
const IMAGE_SELECTORS: [&str; 3] = [".summary_image img", ".post-thumb img", ".entry-content img"];
const CHAPTER_SELECTOR: &str = "li.wp-manga-chapter a";

/// Path and query appended to a detail URL to reach its chapter-list fragment.
const CHAPTERS_ENDPOINT_SUFFIX: &str = "/ajax/chapters/?t=1";

struct DetailSelectors {
    titles: Vec<Selector>,
    summary: Selector,
    content: Selector,
    meta_description: Selector,
    meta_image: Selector,
    images: Vec<Selector>,
    chapter: Selector,
}

impl DetailSelectors {
    fn new() -> Result<Self, ScraperError> {
        Ok(Self {
            titles: TITLE_SELECTORS
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_, _>>()?,
            summary: parse_selector(SUMMARY_SELECTOR)?,
            content: parse_selector(CONTENT_SELECTOR)?,
            meta_description: parse_selector(META_DESCRIPTION_SELECTOR)?,
            meta_image: parse_selector(META_IMAGE_SELECTOR)?,
            images: IMAGE_SELECTORS
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_, _>>()?,
            chapter: parse_selector(CHAPTER_SELECTOR)?,
        })
    }
}

type PageResolver = fn(&Html, &DetailSelectors) -> Option<String>;

const DESCRIPTION_CHAIN: [PageResolver; 3] = [
    description_from_summary,
    description_from_content,
    description_from_meta,
];

const IMAGE_CHAIN: [PageResolver; 2] = [image_from_meta, image_from_blocks];

fn block_text(doc: &Html, sel: &Selector) -> Option<String> {
    select_first(doc, sel)
        .map(|el| stripped_text(el, "\n"))
        .filter(|t| !t.is_empty())
}

fn title_of(doc: &Html, sels: &DetailSelectors) -> String {
    sels.titles
        .iter()
        .find_map(|sel| {
            select_first(doc, sel)
                .map(|el| stripped_text(el, ""))
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

fn description_from_summary(doc: &Html, sels: &DetailSelectors) -> Option<String> {
    block_text(doc, &sels.summary)
}

fn description_from_content(doc: &Html, sels: &DetailSelectors) -> Option<String> {
    block_text(doc, &sels.content)
}

fn description_from_meta(doc: &Html, sels: &DetailSelectors) -> Option<String> {
    select_first(doc, &sels.meta_description).and_then(|m| first_attr(m, &["content"]))
}

fn image_from_meta(doc: &Html, sels: &DetailSelectors) -> Option<String> {
    select_first(doc, &sels.meta_image).and_then(|m| first_attr(m, &["content"]))
}

fn image_from_blocks(doc: &Html, sels: &DetailSelectors) -> Option<String> {
    sels.images.iter().find_map(|sel| {
        select_first(doc, sel).and_then(|img| first_attr(img, &["data-src", "src"]))
    })
}

/// URL of the chapter-list fragment for a detail page.
pub(crate) fn chapters_endpoint(detail_url: &str) -> String {
    format!(
        "{}{}",
        detail_url.trim_end_matches('/'),
        CHAPTERS_ENDPOINT_SUFFIX
    )
}

/// Chapter items in document order. Links resolve against the URL the markup came from.
fn chapters_in(doc: &Html, doc_url: &Url, sel: &Selector) -> Vec<ChapterRef> {
    doc.select(sel)
        .filter_map(|a| {
            let link = a.value().attr("href").and_then(|h| resolve(doc_url, h))?;
            Some(ChapterRef {
                title: stripped_text(a, ""),
                link,
            })
        })
        .collect()
}

/// Chapters from the auxiliary endpoint, or from the detail page itself when the endpoint
/// fails or lists nothing.
fn fetch_chapters<S: PageSource + ?Sized>(
    source: &S,
    detail_url: &Url,
    page: &Html,
    sels: &DetailSelectors,
) -> Result<Vec<ChapterRef>, ScraperError> {
    let endpoint = chapters_endpoint(detail_url.as_str());
    let endpoint_url = parse_url(&endpoint)?;
    let from_endpoint = match source.fetch_page(&endpoint) {
        Ok(fragment) => chapters_in(&Html::parse_fragment(&fragment), &endpoint_url, &sels.chapter),
        Err(e) => {
            debug!("Chapter endpoint unavailable, using page markup: {}", e);
            Vec::new()
        }
    };
    if !from_endpoint.is_empty() {
        return Ok(from_endpoint);
    }
    Ok(chapters_in(page, detail_url, &sels.chapter))
}

/// Settings for detail extraction.
#[derive(Debug, Clone)]
pub struct DetailOptions {
    /// Number of concurrent detail workers (minimum 1).
    pub workers: usize,
    /// Retrieve chapter lists. When false the auxiliary endpoint is never requested.
    pub fetch_chapters: bool,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            fetch_chapters: true,
        }
    }
}

/// Fetch one detail page and extract its fields.
///
/// Fails only when the link is not a URL or the page cannot be fetched. Missing fields come back
/// empty. Chapter retrieval problems are logged and degrade to an empty chapter list.
pub fn extract_detail<S: PageSource + ?Sized>(
    source: &S,
    link: &str,
    options: &DetailOptions,
) -> Result<MangaDetail, ScraperError> {
    let detail_url = parse_url(link)?;
    let sels = DetailSelectors::new()?;
    let html = source.fetch_page(link)?;
    let doc = Html::parse_document(&html);

    let title = title_of(&doc, &sels);
    let description = DESCRIPTION_CHAIN
        .iter()
        .find_map(|resolver| resolver(&doc, &sels))
        .unwrap_or_default();
    let image = IMAGE_CHAIN
        .iter()
        .find_map(|resolver| resolver(&doc, &sels))
        .and_then(|src| resolve(&detail_url, &src))
        .unwrap_or_default();

    let chapters = if options.fetch_chapters {
        fetch_chapters(source, &detail_url, &doc, &sels).unwrap_or_else(|e| {
            warn!("Chapter retrieval failed for {}: {}", link, e);
            Vec::new()
        })
    } else {
        Vec::new()
    };

    Ok(MangaDetail {
        title,
        description,
        image,
        chapters,
        url: link.to_string(),
    })
}

/// Extract details for every entry on a fixed pool of worker threads.
///
/// Failed entries are logged and dropped. Successful details are backfilled from their listing
/// entry and returned in listing order regardless of completion order. `progress` receives
/// (finished, total) after each entry.
pub fn fetch_details<S: PageSource + ?Sized>(
    source: &S,
    entries: &[ListingEntry],
    options: &DetailOptions,
    progress: Option<&(dyn Fn(usize, usize) + Sync)>,
) -> Vec<MangaDetail> {
    let total = entries.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = options.workers.clamp(1, total);
    let next = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, MangaDetail)>> = Mutex::new(Vec::with_capacity(total));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(entry) = entries.get(index) else {
                    break;
                };
                match extract_detail(source, &entry.link, options) {
                    Ok(mut detail) => {
                        detail.backfill_from(entry);
                        debug!("Detail OK: {}", detail.title);
                        match results.lock() {
                            Ok(mut r) => r.push((index, detail)),
                            Err(poisoned) => poisoned.into_inner().push((index, detail)),
                        }
                    }
                    Err(e) => warn!("Detail failed for {}: {}", entry.link, e),
                }
                let n = finished.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(p) = progress {
                    p(n, total);
                }
            });
        }
    });

    let mut results = results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|(index, _)| *index);
    info!("Extracted {} of {} details", results.len(), total);
    results.into_iter().map(|(_, detail)| detail).collect()
}
