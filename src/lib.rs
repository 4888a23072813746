//! mangafeed: CLI scraper for Madara-style manga listings, outputting a Blogger Atom import feed.

pub mod cli;
pub mod config;
pub mod feed;
pub mod formats;
pub mod model;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use feed::{build_feed, build_feed_at, FeedOptions};
pub use formats::{write_feed, write_json, FormatError, OutputFormat};
pub use model::{ChapterRef, ListingEntry, MangaDetail};
pub use scraper::{
    extract_detail, fetch_details, parse_listing, walk_listing, DetailOptions, PageSource,
    PoliteClient, PoliteClientBuilder, ScraperError, WalkOptions,
};
