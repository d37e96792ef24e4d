//! Shared builders for the pressroom unit tests.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let snap = Snapshot::new(
//!     vec![article(7, "Hi", 1), draft(8, "Later", 1)],
//!     vec![subject(1, "General")],
//! );
//! ```

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

use crate::feed::FixedClock;
use crate::project::project;
use crate::slug::slugify;
use crate::types::{Article, ArticleView, Snapshot, Subject, Visibility};

// =========================================================================
// Entity builders
// =========================================================================

/// Public article whose slug is derived from `title`, body `<p>{title}</p>`,
/// created `id` days after 2024-01-01.
pub fn article(id: i64, title: &str, subject_id: i64) -> Article {
    Article {
        id,
        title: title.to_string(),
        slug: slugify(title),
        subject_id,
        html: format!("<p>{title}</p>"),
        visibility: Visibility::Public,
        created_at: created(id),
    }
}

/// Same as [`article`] but hidden from the feed.
pub fn draft(id: i64, title: &str, subject_id: i64) -> Article {
    Article {
        visibility: Visibility::Draft,
        ..article(id, title, subject_id)
    }
}

pub fn subject(id: i64, title: &str) -> Subject {
    Subject {
        id,
        title: title.to_string(),
        slug: slugify(title),
    }
}

fn created(id: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap() + Duration::days(id)
}

// =========================================================================
// Derived fixtures
// =========================================================================

/// Project a snapshot, panicking on dangling references.
pub fn views_of(snapshot: &Snapshot) -> Vec<ArticleView> {
    project(snapshot.articles(), snapshot.subjects()).unwrap()
}

/// Clock pinned to 2024-06-15 08:00:00 +02:00.
pub fn fixed_clock() -> FixedClock {
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    FixedClock(offset.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap())
}

/// IDs in the order they first appear in rendered HTML, using the
/// `data-article-id` attribute every listing card carries.
pub fn listed_ids(html: &str) -> Vec<i64> {
    html.split("data-article-id=\"")
        .skip(1)
        .map(|rest| {
            let end = rest.find('"').unwrap();
            rest[..end].parse().unwrap()
        })
        .collect()
}
