//! Snapshot integrity audit.
//!
//! A rebuild stops at the first dangling reference or colliding output path.
//! The audit walks the whole snapshot instead and reports every problem it
//! finds, without rendering or touching the output tree. It backs the `check`
//! command.
//!
//! | Issue | Severity | Effect on a rebuild |
//! |-------|----------|---------------------|
//! | empty slug | error | page written as `.html` |
//! | malformed slug | error | may be rejected as an unsafe path |
//! | duplicate slug | error | rebuild fails on the second page |
//! | dangling subject | error | rebuild fails before rendering |
//! | slug drift | warning | none; the URL no longer matches the title |

use crate::slug::{disambiguate, slugify};
use crate::types::Snapshot;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// The record an issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Entity {
    Article(i64),
    Subject(i64),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Article(id) => write!(f, "article {id}"),
            Entity::Subject(id) => write!(f, "subject {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    EmptySlug {
        entity: Entity,
    },
    /// Slug is not what [`slugify`] would produce for it.
    MalformedSlug {
        entity: Entity,
        slug: String,
    },
    /// Several articles (or several subjects) share one output path. The
    /// lowest id keeps the slug; `renames` proposes a free slug for the rest.
    DuplicateSlug {
        slug: String,
        entities: Vec<Entity>,
        renames: Vec<(Entity, String)>,
    },
    DanglingSubject {
        article_id: i64,
        subject_id: i64,
    },
    /// The title was edited after the slug was derived.
    SlugDrift {
        entity: Entity,
        slug: String,
        derived: String,
    },
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Issue::SlugDrift { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::EmptySlug { entity } => write!(f, "{entity} has an empty slug"),
            Issue::MalformedSlug { entity, slug } => {
                write!(f, "{entity} has malformed slug {slug:?}")
            }
            Issue::DuplicateSlug {
                slug,
                entities,
                renames,
            } => {
                let list: Vec<String> = entities.iter().map(ToString::to_string).collect();
                write!(f, "slug {slug:?} is shared by {}", list.join(", "))?;
                let fixes: Vec<String> = renames
                    .iter()
                    .map(|(entity, slug)| format!("rename {entity} to {slug:?}"))
                    .collect();
                if !fixes.is_empty() {
                    write!(f, " ({})", fixes.join(", "))?;
                }
                Ok(())
            }
            Issue::DanglingSubject {
                article_id,
                subject_id,
            } => write!(f, "article {article_id} references missing subject {subject_id}"),
            Issue::SlugDrift {
                entity,
                slug,
                derived,
            } => write!(f, "{entity} slug {slug:?} no longer matches its title ({derived:?})"),
        }
    }
}

pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity() == Severity::Error)
}

/// Audit a snapshot. Issues come out errors first, then by entity.
pub fn audit(snapshot: &Snapshot) -> Vec<Issue> {
    let mut issues = Vec::new();

    let records = snapshot
        .articles()
        .iter()
        .map(|a| (Entity::Article(a.id), a.slug.as_str(), a.title.as_str()))
        .chain(
            snapshot
                .subjects()
                .iter()
                .map(|s| (Entity::Subject(s.id), s.slug.as_str(), s.title.as_str())),
        );

    // Articles and subjects live in different folders, so collisions are
    // only checked within one kind.
    let mut article_slugs: BTreeMap<&str, Vec<Entity>> = BTreeMap::new();
    let mut subject_slugs: BTreeMap<&str, Vec<Entity>> = BTreeMap::new();

    for (entity, slug, title) in records {
        if slug.is_empty() {
            issues.push(Issue::EmptySlug { entity });
            continue;
        }
        if slugify(slug) != slug {
            issues.push(Issue::MalformedSlug {
                entity,
                slug: slug.to_string(),
            });
        } else if let Some(derived) = drift(slug, title) {
            issues.push(Issue::SlugDrift {
                entity,
                slug: slug.to_string(),
                derived,
            });
        }
        let bucket = match entity {
            Entity::Article(_) => &mut article_slugs,
            Entity::Subject(_) => &mut subject_slugs,
        };
        bucket.entry(slug).or_default().push(entity);
    }

    issues.extend(duplicates(article_slugs));
    issues.extend(duplicates(subject_slugs));

    let subject_ids: HashSet<i64> = snapshot.subjects().iter().map(|s| s.id).collect();
    for article in snapshot.articles() {
        if !subject_ids.contains(&article.subject_id) {
            issues.push(Issue::DanglingSubject {
                article_id: article.id,
                subject_id: article.subject_id,
            });
        }
    }

    issues.sort_by_key(|issue| std::cmp::Reverse(issue.severity()));
    issues
}

/// One issue per slug claimed by more than one entity of a kind, with the
/// storage-side renames that would resolve it.
fn duplicates(by_slug: BTreeMap<&str, Vec<Entity>>) -> Vec<Issue> {
    let mut taken: HashSet<String> = by_slug.keys().map(|slug| slug.to_string()).collect();
    let mut issues = Vec::new();
    for (slug, mut entities) in by_slug {
        if entities.len() < 2 {
            continue;
        }
        entities.sort();
        let renames = entities[1..]
            .iter()
            .map(|&entity| {
                let free = disambiguate(slug, |candidate| taken.contains(candidate));
                taken.insert(free.clone());
                (entity, free)
            })
            .collect();
        issues.push(Issue::DuplicateSlug {
            slug: slug.to_string(),
            entities,
            renames,
        });
    }
    issues
}

/// The slug the title would produce now, if `slug` is neither that nor a
/// disambiguated form of it (`derived-2`, `derived-3`, ...).
fn drift(slug: &str, title: &str) -> Option<String> {
    let derived = slugify(title);
    if derived.is_empty() || slug == derived {
        return None;
    }
    let suffixed = slug
        .strip_prefix(derived.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|n| n.parse::<u32>().ok())
        .is_some_and(|n| n >= 2);
    (!suffixed).then_some(derived)
}
