//! Blogger Atom import feed. One post per manga and, optionally, one post per chapter.

use crate::model::{ChapterRef, MangaDetail};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
const NS_OPENSEARCH: &str = "http://a9.com/-/spec/opensearch/1.1/";
const NS_BLOGGER: &str = "http://schemas.google.com/blogger/2008";
const NS_GD: &str = "http://schemas.google.com/g/2005";
const CATEGORY_SCHEME: &str = "http://www.blogger.com/atom/ns#";
const FEED_AUTHOR: &str = "Imported";

const MANGA_CATEGORIES: [&str; 2] = ["Manga", "Komik"];
const CHAPTER_CATEGORIES: [&str; 2] = ["Chapter", "Manga"];

pub const DEFAULT_BLOG_TITLE: &str = "Mangaindo Import";

/// Which posts to emit and how to title the feed.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub include_manga_posts: bool,
    pub include_chapters: bool,
    pub blog_title: String,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            include_manga_posts: true,
            include_chapters: true,
            blog_title: DEFAULT_BLOG_TITLE.to_string(),
        }
    }
}

/// Build the feed with a fresh id and the current time.
pub fn build_feed(details: &[MangaDetail], options: &FeedOptions) -> String {
    build_feed_at(details, options, Utc::now(), Uuid::new_v4())
}

/// Build the feed document. Every entry is stamped with `now`; `id` becomes the feed's urn:uuid.
///
/// Details are emitted in the given order: the manga post first (if enabled), then its chapters
/// in list order (if enabled). Chapters without a link are skipped.
pub fn build_feed_at(
    details: &[MangaDetail],
    options: &FeedOptions,
    now: DateTime<Utc>,
    id: Uuid,
) -> String {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut out = String::new();
    out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
    out.push_str(&format!(
        "<feed xmlns='{}'\n      xmlns:openSearch='{}'\n      xmlns:blogger='{}'\n      xmlns:gd='{}'>\n",
        NS_ATOM, NS_OPENSEARCH, NS_BLOGGER, NS_GD
    ));
    out.push_str(&format!(
        "<title type='text'>{}</title>\n",
        xml_escape(&options.blog_title)
    ));
    out.push_str(&format!("<updated>{}</updated>\n", stamp));
    out.push_str(&format!("<id>urn:uuid:{}</id>\n", id));
    out.push_str(&format!("<author><name>{}</name></author>\n", FEED_AUTHOR));

    for manga in details {
        if options.include_manga_posts {
            let title = if manga.title.is_empty() {
                &manga.url
            } else {
                &manga.title
            };
            out.push_str(&entry(
                title,
                &manga_body(manga, title),
                &manga.url,
                &stamp,
                &MANGA_CATEGORIES,
            ));
        }
        if options.include_chapters {
            for chapter in manga.chapters.iter().filter(|c| !c.link.is_empty()) {
                let title = format!("{} — {}", manga.title, chapter.title);
                out.push_str(&entry(
                    &title,
                    &chapter_body(manga, chapter),
                    &chapter.link,
                    &stamp,
                    &CHAPTER_CATEGORIES,
                ));
            }
        }
    }

    out.push_str("</feed>");
    out
}

fn manga_body(manga: &MangaDetail, title: &str) -> String {
    let mut body = String::new();
    if !manga.image.is_empty() {
        body.push_str(&format!(
            "<p><img src='{}' alt='{}'></p>",
            xml_escape(&manga.image),
            xml_escape(title)
        ));
    }
    if !manga.description.is_empty() {
        body.push_str(&format!("<p>{}</p>", xml_escape(&manga.description)));
    }
    let url = xml_escape(&manga.url);
    body.push_str(&format!("<p>Source: <a href='{}'>{}</a></p>", url, url));
    body
}

fn chapter_body(manga: &MangaDetail, chapter: &ChapterRef) -> String {
    let link = xml_escape(&chapter.link);
    let url = xml_escape(&manga.url);
    format!(
        "<p>Chapter link: <a href='{}'>{}</a></p><p>From manga: <a href='{}'>{}</a></p>",
        link, link, url, url
    )
}

fn entry(title: &str, body_html: &str, link: &str, stamp: &str, categories: &[&str]) -> String {
    let mut e = String::new();
    e.push_str("  <entry>\n");
    e.push_str(&format!(
        "    <title type='text'>{}</title>\n",
        xml_escape(title)
    ));
    e.push_str(&format!(
        "    <content type='html'>{}</content>\n",
        cdata(body_html)
    ));
    e.push_str(&format!("    <published>{}</published>\n", stamp));
    e.push_str(&format!("    <updated>{}</updated>\n", stamp));
    for c in categories {
        e.push_str(&format!(
            "    <category scheme='{}' term='{}'/>\n",
            CATEGORY_SCHEME,
            xml_escape(c)
        ));
    }
    e.push_str(&format!(
        "    <link rel='alternate' type='text/html' href='{}'/>\n",
        xml_escape(link)
    ));
    e.push_str("  </entry>\n");
    e
}

/// Wrap markup in CDATA so it is carried verbatim. A `]]>` inside is split across two sections.
fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
