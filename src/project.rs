//! Article/subject join.
//!
//! [`project`] turns storage rows into [`ArticleView`]s. A subject reference
//! that does not resolve is referential corruption upstream and fails the
//! whole projection; the article is never silently dropped.

use crate::types::{Article, ArticleView, Subject};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("article {article_id} references missing subject {subject_id}")]
    DanglingSubjectReference { article_id: i64, subject_id: i64 },
}

/// Join every article with its subject.
///
/// Output order follows `articles` but carries no meaning; listings sort on
/// their own.
pub fn project(articles: &[Article], subjects: &[Subject]) -> Result<Vec<ArticleView>, ProjectError> {
    let by_id: HashMap<i64, &Subject> = subjects.iter().map(|s| (s.id, s)).collect();

    articles
        .iter()
        .map(|article| {
            let subject = by_id.get(&article.subject_id).ok_or(
                ProjectError::DanglingSubjectReference {
                    article_id: article.id,
                    subject_id: article.subject_id,
                },
            )?;
            Ok(ArticleView {
                id: article.id,
                title: article.title.clone(),
                slug: article.slug.clone(),
                subject_id: subject.id,
                subject_slug: subject.slug.clone(),
                subject_title: subject.title.clone(),
                visibility: article.visibility,
                html: article.html.clone(),
                created_at: article.created_at,
            })
        })
        .collect()
}
