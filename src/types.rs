//! Content entities shared by every rebuild stage.
//!
//! [`Article`] and [`Subject`] are owned by storage and arrive read-only inside
//! a [`Snapshot`]. [`ArticleView`] is the denormalized, render-ready join built
//! fresh by [`crate::project`] on every rebuild and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slug of the subject storage assigns to articles created without one.
///
/// Upstream policy protects it from deletion; the generator treats it like
/// any other subject.
pub const DEFAULT_SUBJECT_SLUG: &str = "default";

/// Whether an article appears in the RSS feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Draft,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }
}

/// An article row as exported by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    /// Title-derived path segment, unique across articles.
    pub slug: String,
    pub subject_id: i64,
    /// Trusted HTML fragment produced by the editor. Never sanitized here.
    pub html: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

/// A subject (category) row as exported by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub title: String,
    /// Title-derived filename stem for the subject listing page.
    pub slug: String,
}

/// Everything one rebuild reads: all articles and all subjects, taken from
/// storage after the triggering write committed.
///
/// Fields are private so a snapshot cannot be edited once handed to the
/// generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    subjects: Vec<Subject>,
}

impl Snapshot {
    pub fn new(articles: Vec<Article>, subjects: Vec<Subject>) -> Self {
        Self { articles, subjects }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

/// Render-ready article joined with its owning subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleView {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub subject_id: i64,
    pub subject_slug: String,
    pub subject_title: String,
    pub visibility: Visibility,
    /// Emitted verbatim on the article page.
    pub html: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_parses_from_storage_export() {
        let json = r#"{
            "articles": [
                {"id": 7, "title": "Hi", "slug": "hi", "subject_id": 1,
                 "html": "<p>hi</p>", "visibility": "draft",
                 "created_at": "2024-03-01T12:00:00Z"}
            ],
            "subjects": [{"id": 1, "title": "General", "slug": "general"}]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.articles().len(), 1);
        assert_eq!(snapshot.articles()[0].visibility, Visibility::Draft);
        assert_eq!(snapshot.subjects()[0].slug, "general");
    }

    #[test]
    fn visibility_defaults_to_public() {
        let json = r#"{"id": 1, "title": "T", "slug": "t", "subject_id": 1,
                       "html": "", "created_at": "2024-03-01T12:00:00Z"}"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert!(article.visibility.is_public());
    }

    #[test]
    fn empty_export_is_an_empty_snapshot() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.articles().is_empty());
        assert!(snapshot.subjects().is_empty());
    }
}
