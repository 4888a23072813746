//! Data model for scraped listings and manga details.
//!
//! The listing walk produces [ListingEntry]; the detail extractor produces [MangaDetail];
//! the feed builder and the JSON writer consume details.

use serde::{Deserialize, Serialize};

/// One item found on a listing page. `link` is absolute and unique across a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Possibly empty when no title convention matched.
    pub title: String,
    pub link: String,
    /// Thumbnail URL, possibly empty.
    pub image: String,
}

/// One chapter of a manga, in the order the site lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub title: String,
    pub link: String,
}

/// Everything extracted from a manga's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaDetail {
    pub title: String,
    pub description: String,
    pub image: String,
    pub chapters: Vec<ChapterRef>,
    /// Same as the originating [ListingEntry::link].
    pub url: String,
}

impl MangaDetail {
    /// Fill an empty title (listing title, else the link) and an empty image from the listing entry.
    pub fn backfill_from(&mut self, entry: &ListingEntry) {
        if self.title.is_empty() {
            self.title = if entry.title.is_empty() {
                entry.link.clone()
            } else {
                entry.title.clone()
            };
        }
        if self.image.is_empty() {
            self.image = entry.image.clone();
        }
    }
}
