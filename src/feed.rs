//! Sitemap and RSS serialization.
//!
//! Both feeds are complete XML documents rebuilt from the snapshot on every
//! rebuild, never patched. They differ in what they include:
//!
//! | Feed | Root | Articles | Subjects |
//! |------|------|----------|----------|
//! | `sitemap.xml` | yes | all, drafts included | all |
//! | `rss.xml` | channel link | public only | no |
//!
//! Wall-clock time (sitemap `lastmod` for the root and subjects, RSS
//! `lastBuildDate`) comes from a [`Clock`], so tests can pin it.
//!
//! The XML is produced with the same maud macros as the HTML pages, which
//! gives element-content escaping for titles and URLs for free.

use crate::render::{article_href, listing_order, newest_first, subject_href};
use crate::types::{ArticleView, Subject};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use maud::{Markup, html};
use std::fmt;

pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Channel description of the RSS feed.
pub const FEED_DESCRIPTION: &str = "New articles as they are published";

/// Item description. Subscribers are told an article exists, not given its
/// content.
pub const ITEM_NOTICE: &str = "A new article has been published.";

/// RFC 1123 with a numeric zone, e.g. `Sat, 15 Jun 2024 08:00:00 +0200`.
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Which feed a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Sitemap,
    Rss,
}

impl FeedKind {
    /// Path relative to the output root.
    pub fn file_name(self) -> &'static str {
        match self {
            FeedKind::Sitemap => "sitemap.xml",
            FeedKind::Rss => "rss.xml",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for build dates.
pub trait Clock: Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the wrapped instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Format a timestamp as `YYYY-MM-DD` in its own zone.
pub fn format_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%Y-%m-%d").to_string()
}

/// Format a timestamp for RSS (`lastBuildDate`, `pubDate`).
pub fn format_rfc1123z<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format(RFC1123Z).to_string()
}

// ============================================================================
// Canonical URLs
// ============================================================================

/// Absolute URL builder rooted at the configured site base URL.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: String,
}

impl SiteUrls {
    /// `base_url` may carry a trailing slash; it is normalized away.
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> String {
        format!("{}/", self.base)
    }

    pub fn article(&self, slug: &str) -> String {
        format!("{}/{}", self.base, article_href(slug))
    }

    pub fn subject(&self, slug: &str) -> String {
        format!("{}/{}", self.base, subject_href(slug))
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Build `sitemap.xml`: the root, every article and every subject.
pub fn build_sitemap(
    views: &[ArticleView],
    subjects: &[Subject],
    urls: &SiteUrls,
    clock: &dyn Clock,
) -> String {
    let today = format_date(&clock.now());
    let doc: Markup = html! {
        urlset xmlns=(SITEMAP_NAMESPACE) {
            url {
                loc { (urls.root()) }
                lastmod { (today) }
            }
            @for view in newest_first(views) {
                url {
                    loc { (urls.article(&view.slug)) }
                    lastmod { (format_date(&view.created_at)) }
                }
            }
            @for subject in listing_order(subjects) {
                url {
                    loc { (urls.subject(&subject.slug)) }
                    lastmod { (today) }
                }
            }
        }
    };
    xml_document(doc)
}

/// Build `rss.xml`: one channel, one item per public article.
pub fn build_rss(views: &[ArticleView], urls: &SiteUrls, site_title: &str, clock: &dyn Clock) -> String {
    let public = newest_first(views.iter().filter(|v| v.visibility.is_public()));
    let doc: Markup = html! {
        rss version="2.0" {
            channel {
                title { (site_title) }
                link { (urls.root()) }
                description { (FEED_DESCRIPTION) }
                lastBuildDate { (format_rfc1123z(&clock.now())) }
                @for view in public {
                    @let url = urls.article(&view.slug);
                    item {
                        title { (view.title) }
                        link { (url) }
                        guid isPermaLink="true" { (url) }
                        pubDate { (format_rfc1123z(&view.created_at)) }
                        description { (ITEM_NOTICE) }
                    }
                }
            }
        }
    };
    xml_document(doc)
}

fn xml_document(body: Markup) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(&body.into_string());
    out.push('\n');
    out
}
