//! HTML page rendering.
//!
//! Produces the three page kinds of the output tree from projected
//! [`ArticleView`]s:
//!
//! - **Index** (`index.html`): every article, newest first, with subject filter links
//! - **Subject pages** (`sub/{slug}.html`): the same listing restricted to one subject
//! - **Article pages** (`articles/{slug}.html`): the full trusted HTML body
//!
//! Listing order is owned here: cards are sorted by identifier descending no
//! matter what order the caller passes views in. Identifiers are unique and
//! assigned monotonically by storage, so this is a total, newest-first order.
//!
//! ## Trust boundary
//!
//! Templates use [maud](https://maud.lambda.xyz/), so titles and every other
//! interpolated field are escaped. The article body is the one exception: it
//! is authored HTML and is emitted verbatim through `PreEscaped`.
//!
//! ## Links
//!
//! All links are relative, so the generated tree can be served from any
//! path prefix. Pages one directory deep prefix links with `../`.

use crate::types::{ArticleView, Subject};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Template error: {0}")]
    Template(String),
}

/// Site name shown in page titles and the header.
pub const SITE_TITLE: &str = "Notebook";

/// Stylesheet copied to `style.css` at the root of every generation.
pub const STYLESHEET: &str = include_str!("../static/style.css");

/// Ellipsis appended to truncated excerpts.
const ELLIPSIS: char = '…';

/// One page of the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Index,
    Subject(String),
    Article(String),
}

impl Document {
    /// Path relative to the output root.
    pub fn relative_path(&self) -> String {
        match self {
            Document::Index => "index.html".to_string(),
            Document::Subject(slug) => subject_href(slug),
            Document::Article(slug) => article_href(slug),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Root-relative path of an article page.
pub fn article_href(slug: &str) -> String {
    format!("articles/{slug}.html")
}

/// Root-relative path of a subject listing page.
pub fn subject_href(slug: &str) -> String {
    format!("sub/{slug}.html")
}

/// Renders one document per call.
///
/// [`HtmlRenderer`] is the production implementation. The rebuild
/// orchestrator is generic over this trait so a rebuild can be driven with a
/// renderer that fails on demand.
pub trait PageRenderer: Sync {
    /// Listing of every article plus links to every subject.
    fn render_index(
        &self,
        views: &[ArticleView],
        subjects: &[Subject],
    ) -> Result<Vec<u8>, RenderError>;

    /// Listing of the articles in `views` that belong to `subject`.
    fn render_subject_page(
        &self,
        subject: &Subject,
        views: &[ArticleView],
    ) -> Result<Vec<u8>, RenderError>;

    /// Full page for a single article.
    fn render_article_page(&self, view: &ArticleView) -> Result<Vec<u8>, RenderError>;
}

/// Maud-backed renderer.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    excerpt_words: usize,
}

impl HtmlRenderer {
    pub fn new(excerpt_words: usize) -> Self {
        Self { excerpt_words }
    }
}

impl PageRenderer for HtmlRenderer {
    fn render_index(
        &self,
        views: &[ArticleView],
        subjects: &[Subject],
    ) -> Result<Vec<u8>, RenderError> {
        Ok(render_index(views, subjects, self.excerpt_words)
            .into_string()
            .into_bytes())
    }

    fn render_subject_page(
        &self,
        subject: &Subject,
        views: &[ArticleView],
    ) -> Result<Vec<u8>, RenderError> {
        Ok(render_subject_page(subject, views, self.excerpt_words)
            .into_string()
            .into_bytes())
    }

    fn render_article_page(&self, view: &ArticleView) -> Result<Vec<u8>, RenderError> {
        Ok(render_article_page(view).into_string().into_bytes())
    }
}

// ============================================================================
// Ordering and excerpts
// ============================================================================

/// Views sorted by identifier, newest (highest) first.
pub fn newest_first<'a>(views: impl IntoIterator<Item = &'a ArticleView>) -> Vec<&'a ArticleView> {
    let mut sorted: Vec<&ArticleView> = views.into_iter().collect();
    sorted.sort_by(|a, b| b.id.cmp(&a.id));
    sorted
}

/// Subjects in navigation order: by title, ties broken by identifier.
pub fn listing_order(subjects: &[Subject]) -> Vec<&Subject> {
    let mut sorted: Vec<&Subject> = subjects.iter().collect();
    sorted.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    sorted
}

/// Plain-text preview of an HTML body.
///
/// Tags are stripped, entities decoded and whitespace collapsed. At most
/// `words` words are kept; `…` is appended only when words were dropped.
pub fn excerpt(html: &str, words: usize) -> String {
    let text = strip_html_tags(html);
    let text = html_escape::decode_html_entities(&text);
    let all: Vec<&str> = text.split_whitespace().collect();
    if all.len() <= words {
        return all.join(" ");
    }
    let mut cut = all[..words].join(" ");
    cut.push(ELLIPSIS);
    cut
}

/// Remove complete `<...>` tags, substituting nothing.
///
/// A `<` with no closing `>` (or an empty `<>`) is not a tag and stays in
/// the text.
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) if close > 0 => rest = &after[close + 1..],
            _ => {
                result.push('<');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

// ============================================================================
// HTML Components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(title: &str, root: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                link rel="stylesheet" href={ (root) "style.css" };
                link rel="alternate" type="application/rss+xml" title=(SITE_TITLE) href={ (root) "rss.xml" };
            }
            body {
                (content)
            }
        }
    }
}

/// Renders the site header with breadcrumb
fn site_header(breadcrumb: Markup) -> Markup {
    html! {
        header.site-header {
            nav.breadcrumb {
                (breadcrumb)
            }
        }
    }
}

/// Subject filter links shown above the full listing.
fn subject_nav(subjects: &[&Subject]) -> Markup {
    html! {
        nav.subject-nav {
            ul {
                li.current {
                    a href="index.html" { "All" }
                }
                @for subject in subjects {
                    li {
                        a href=(subject_href(&subject.slug)) { (subject.title) }
                    }
                }
            }
        }
    }
}

/// One listing entry: title, subject, date and excerpt.
fn article_card(view: &ArticleView, root: &str, excerpt_words: usize) -> Markup {
    html! {
        article.card data-article-id=(view.id) {
            h2 {
                a href={ (root) (article_href(&view.slug)) } { (view.title) }
            }
            p.meta {
                a.subject href={ (root) (subject_href(&view.subject_slug)) } { (view.subject_title) }
                " · "
                (published(view))
                @if !view.visibility.is_public() {
                    " "
                    span.draft { "draft" }
                }
            }
            p.excerpt { (excerpt(&view.html, excerpt_words)) }
        }
    }
}

fn published(view: &ArticleView) -> Markup {
    html! {
        time datetime=(view.created_at.format("%Y-%m-%d").to_string()) {
            (view.created_at.format("%Y-%m-%d").to_string())
        }
    }
}

fn article_list(views: &[&ArticleView], root: &str, excerpt_words: usize) -> Markup {
    html! {
        @if views.is_empty() {
            p.empty { "No articles yet." }
        } @else {
            div.article-list {
                @for view in views {
                    (article_card(view, root, excerpt_words))
                }
            }
        }
    }
}

// ============================================================================
// Page Renderers
// ============================================================================

/// Renders the index page: every article, newest first.
pub fn render_index(views: &[ArticleView], subjects: &[Subject], excerpt_words: usize) -> Markup {
    let sorted = newest_first(views);
    let nav_subjects = listing_order(subjects);

    let breadcrumb = html! {
        a href="index.html" { (SITE_TITLE) }
    };

    let content = html! {
        (site_header(breadcrumb))
        (subject_nav(&nav_subjects))
        main.index-page {
            (article_list(&sorted, "", excerpt_words))
        }
    };

    base_document(SITE_TITLE, "", content)
}

/// Renders a subject listing page. Views from other subjects are ignored.
pub fn render_subject_page(subject: &Subject, views: &[ArticleView], excerpt_words: usize) -> Markup {
    let sorted = newest_first(views.iter().filter(|v| v.subject_id == subject.id));

    let breadcrumb = html! {
        a href="../index.html" { (SITE_TITLE) }
        " › "
        (subject.title)
    };

    let content = html! {
        (site_header(breadcrumb))
        main.subject-page {
            h1 { (subject.title) }
            (article_list(&sorted, "../", excerpt_words))
        }
    };

    base_document(&format!("{} - {}", subject.title, SITE_TITLE), "../", content)
}

/// Renders an article page with its body inserted unescaped.
pub fn render_article_page(view: &ArticleView) -> Markup {
    let breadcrumb = html! {
        a href="../index.html" { (SITE_TITLE) }
        " › "
        a href={ "../" (subject_href(&view.subject_slug)) } { (view.subject_title) }
    };

    let content = html! {
        (site_header(breadcrumb))
        main.article-page {
            article {
                header.article-header {
                    h1 { (view.title) }
                    p.meta { (published(view)) }
                }
                div.article-body {
                    (PreEscaped(&view.html))
                }
            }
        }
    };

    base_document(&format!("{} - {}", view.title, SITE_TITLE), "../", content)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::types::Snapshot;

    // =========================================================================
    // Excerpts
    // =========================================================================

    #[test]
    fn excerpt_truncates_with_ellipsis() {
        assert_eq!(
            excerpt("<p>one two three four five</p>", 3),
            "one two three…"
        );
    }

    #[test]
    fn excerpt_under_limit_has_no_ellipsis() {
        assert_eq!(
            excerpt("<p>one two three four five</p>", 10),
            "one two three four five"
        );
    }

    #[test]
    fn excerpt_exactly_at_limit_has_no_ellipsis() {
        assert_eq!(excerpt("<p>one two three</p>", 3), "one two three");
    }

    #[test]
    fn excerpt_decodes_entities_after_stripping() {
        assert_eq!(
            excerpt("<p>Fish &amp; chips &lt;b&gt;</p>", 10),
            "Fish & chips <b>"
        );
    }

    #[test]
    fn excerpt_keeps_words_with_inline_markup_whole() {
        assert_eq!(excerpt("<p><b>H</b>ello world</p>", 1), "Hello…");
        assert_eq!(excerpt("<p>a<b>bold</b>word</p>", 10), "aboldword");
    }

    #[test]
    fn excerpt_keeps_unclosed_angle_bracket() {
        assert_eq!(
            excerpt("<p>1 &lt; 2</p> and x < y", 20),
            "1 < 2 and x < y"
        );
    }

    #[test]
    fn strip_leaves_empty_brackets() {
        assert_eq!(strip_html_tags("a <> b"), "a <> b");
        assert_eq!(strip_html_tags("<p>x</p>\n<p>y</p>"), "x\ny");
    }

    #[test]
    fn excerpt_of_empty_body_is_empty() {
        assert_eq!(excerpt("<div>   </div>", 5), "");
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    fn three_articles() -> Snapshot {
        Snapshot::new(
            vec![article(5, "Five", 1), article(1, "One", 1), article(3, "Three", 1)],
            vec![subject(1, "General")],
        )
    }

    #[test]
    fn index_lists_newest_first() {
        let snap = three_articles();
        let views = views_of(&snap);
        let html = render_index(&views, snap.subjects(), 30).into_string();
        assert_eq!(listed_ids(&html), vec![5, 3, 1]);
    }

    #[test]
    fn subject_page_lists_newest_first() {
        let snap = three_articles();
        let views = views_of(&snap);
        let html = render_subject_page(&snap.subjects()[0], &views, 30).into_string();
        assert_eq!(listed_ids(&html), vec![5, 3, 1]);
    }

    #[test]
    fn listing_order_sorts_subjects_by_title() {
        let subjects = vec![subject(1, "Zebra"), subject(2, "Apple"), subject(3, "Apple")];
        let ids: Vec<i64> = listing_order(&subjects).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    // =========================================================================
    // Index
    // =========================================================================

    #[test]
    fn index_links_every_subject() {
        let snap = Snapshot::new(
            vec![article(1, "A", 1)],
            vec![subject(1, "General"), subject(2, "Empty Topic")],
        );
        let html = render_index(&views_of(&snap), snap.subjects(), 30).into_string();
        assert!(html.contains(r#"href="sub/general.html""#));
        assert!(html.contains(r#"href="sub/empty-topic.html""#));
    }

    #[test]
    fn index_shows_subject_title_and_excerpt() {
        let snap = Snapshot::new(vec![article(7, "Hi", 1)], vec![subject(1, "General")]);
        let html = render_index(&views_of(&snap), snap.subjects(), 30).into_string();
        assert!(html.contains(r#"href="articles/hi.html""#));
        assert!(html.contains(">General</a>"));
        assert!(html.contains(r#"<p class="excerpt">Hi</p>"#));
    }

    #[test]
    fn index_marks_drafts() {
        let snap = Snapshot::new(
            vec![article(1, "Live", 1), draft(2, "Wip", 1)],
            vec![subject(1, "General")],
        );
        let html = render_index(&views_of(&snap), snap.subjects(), 30).into_string();
        assert_eq!(html.matches(r#"class="draft""#).count(), 1);
        assert_eq!(listed_ids(&html), vec![2, 1]);
    }

    #[test]
    fn index_escapes_titles() {
        let snap = Snapshot::new(
            vec![article(1, "<script>alert('x')</script>", 1)],
            vec![subject(1, "General")],
        );
        let html = render_index(&views_of(&snap), snap.subjects(), 30).into_string();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    // =========================================================================
    // Subject pages
    // =========================================================================

    #[test]
    fn subject_page_filters_other_subjects() {
        let snap = Snapshot::new(
            vec![article(1, "Mine", 1), article(2, "Theirs", 2)],
            vec![subject(1, "General"), subject(2, "Other")],
        );
        let html = render_subject_page(&snap.subjects()[0], &views_of(&snap), 30).into_string();
        assert_eq!(listed_ids(&html), vec![1]);
        assert!(html.contains("<h1>General</h1>"));
    }

    #[test]
    fn empty_subject_renders_empty_listing() {
        let snap = Snapshot::new(vec![], vec![subject(1, "Quiet")]);
        let html = render_subject_page(&snap.subjects()[0], &[], 30).into_string();
        assert!(html.contains("No articles yet."));
        assert!(listed_ids(&html).is_empty());
    }

    #[test]
    fn subject_page_links_go_up_one_level() {
        let snap = Snapshot::new(vec![article(1, "Deep", 1)], vec![subject(1, "General")]);
        let html = render_subject_page(&snap.subjects()[0], &views_of(&snap), 30).into_string();
        assert!(html.contains(r#"href="../articles/deep.html""#));
        assert!(html.contains(r#"href="../style.css""#));
    }

    // =========================================================================
    // Article pages
    // =========================================================================

    #[test]
    fn article_body_is_emitted_verbatim() {
        let mut a = article(1, "Rich", 1);
        a.html = r#"<p>Some <em>rich</em> &amp; <a href="x">linked</a> text</p>"#.to_string();
        let snap = Snapshot::new(vec![a], vec![subject(1, "General")]);
        let html = render_article_page(&views_of(&snap)[0]).into_string();
        assert!(html.contains(r#"<p>Some <em>rich</em> &amp; <a href="x">linked</a> text</p>"#));
    }

    #[test]
    fn article_page_has_title_and_subject_breadcrumb() {
        let snap = Snapshot::new(vec![article(1, "Hello There", 1)], vec![subject(1, "General")]);
        let html = render_article_page(&views_of(&snap)[0]).into_string();
        assert!(html.contains("<title>Hello There - Notebook</title>"));
        assert!(html.contains("<h1>Hello There</h1>"));
        assert!(html.contains(r#"href="../sub/general.html""#));
    }

    #[test]
    fn base_document_includes_doctype() {
        let doc = base_document("Test", "", html! { p { "test" } }).into_string();
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains(r#"href="rss.xml""#));
    }

    #[test]
    fn document_paths() {
        assert_eq!(Document::Index.relative_path(), "index.html");
        assert_eq!(Document::Subject("general".into()).to_string(), "sub/general.html");
        assert_eq!(Document::Article("hi".into()).to_string(), "articles/hi.html");
    }

    #[test]
    fn html_renderer_returns_utf8_bytes() {
        let snap = Snapshot::new(vec![article(1, "Café", 1)], vec![subject(1, "General")]);
        let bytes = HtmlRenderer::new(30)
            .render_article_page(&views_of(&snap)[0])
            .unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("Café"));
    }
}
