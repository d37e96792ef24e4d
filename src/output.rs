//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Output is a content inventory, not a file listing. Every subject and
//! article leads with its positional index and title; output paths follow an
//! arrow as secondary context. Drafts are marked so it is obvious which
//! articles stay out of the feed.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Home → index.html
//! 001 General (2 articles) → sub/general.html
//!     001 Hi → articles/hi.html
//!     002 Later [draft] → articles/later.html
//!
//! Feeds
//!     sitemap.xml (4 entries)
//!     rss.xml (1 item)
//!
//! Published 20240615T080000.123456Z-4242-0 → dist
//! Generated 1 subject, 2 articles
//! ```
//!
//! ## Check
//!
//! ```text
//! Subjects
//! 001 General (1 article)
//!     001 Hi
//!
//! Issues
//!     error: article 3 references missing subject 9
//!     warning: article 7 slug "old" no longer matches its title ("new")
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::audit::{Issue, Severity};
use crate::feed::FeedKind;
use crate::publish::RebuildReport;
use crate::render::listing_order;
use crate::types::{Snapshot, Visibility};

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Subject header: positional index, title and article count.
///
/// ```text
/// 001 General (2 articles)
/// ```
fn subject_header(index: usize, title: &str, articles: usize) -> String {
    format!(
        "{} {} ({})",
        format_index(index),
        title,
        plural(articles, "article", "articles")
    )
}

/// Article line, with drafts marked.
///
/// ```text
/// 001 Hi
/// 002 Later [draft]
/// ```
fn article_line(index: usize, title: &str, visibility: Visibility) -> String {
    match visibility {
        Visibility::Public => format!("{} {}", format_index(index), title),
        Visibility::Draft => format!("{} {} [draft]", format_index(index), title),
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format the result of a successful rebuild.
pub fn format_build_output(report: &RebuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("Home \u{2192} index.html".to_string());

    for (i, subject) in report.inventory.iter().enumerate() {
        lines.push(format!(
            "{} \u{2192} {}",
            subject_header(i + 1, &subject.title, subject.articles.len()),
            subject.path
        ));
        for (j, article) in subject.articles.iter().enumerate() {
            lines.push(format!(
                "{}{} \u{2192} {}",
                indent(1),
                article_line(j + 1, &article.title, article.visibility),
                article.path
            ));
        }
    }

    lines.push(String::new());
    lines.push("Feeds".to_string());
    lines.push(format!(
        "{}{} ({})",
        indent(1),
        FeedKind::Sitemap,
        plural(report.sitemap_entries, "entry", "entries")
    ));
    lines.push(format!(
        "{}{} ({})",
        indent(1),
        FeedKind::Rss,
        plural(report.feed_items, "item", "items")
    ));

    lines.push(String::new());
    lines.push(format!(
        "Published {} \u{2192} {}",
        report.generation,
        report.output_root.display()
    ));
    lines.push(format!(
        "Generated {}, {}",
        plural(report.subject_pages, "subject", "subjects"),
        plural(report.article_pages, "article", "articles")
    ));
    lines
}

/// Print build output to stdout.
pub fn print_build_output(report: &RebuildReport) {
    for line in format_build_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the content inventory and audit findings of a snapshot.
///
/// Articles whose subject is missing do not appear in the inventory; they
/// show up under Issues instead.
pub fn format_check_output(snapshot: &Snapshot, issues: &[Issue]) -> Vec<String> {
    let mut lines = Vec::new();

    if !snapshot.subjects().is_empty() {
        lines.push("Subjects".to_string());
    }
    for (i, subject) in listing_order(snapshot.subjects()).into_iter().enumerate() {
        let mut articles: Vec<_> = snapshot
            .articles()
            .iter()
            .filter(|a| a.subject_id == subject.id)
            .collect();
        articles.sort_by(|a, b| b.id.cmp(&a.id));

        lines.push(subject_header(i + 1, &subject.title, articles.len()));
        for (j, article) in articles.iter().enumerate() {
            lines.push(format!(
                "{}{}",
                indent(1),
                article_line(j + 1, &article.title, article.visibility)
            ));
        }
    }

    if !issues.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Issues".to_string());
        for issue in issues {
            let label = match issue.severity() {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            lines.push(format!("{}{}: {}", indent(1), label, issue));
        }
    }
    lines
}

/// Print check output to stdout.
pub fn print_check_output(snapshot: &Snapshot, issues: &[Issue]) {
    for line in format_check_output(snapshot, issues) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
