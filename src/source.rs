//! Storage seam.
//!
//! The relational store lives outside this crate. A rebuild only needs two
//! reads from it, modeled by [`ContentSource`]. The CLI reads a JSON export
//! through [`JsonSnapshotSource`]; an admin server would implement the trait
//! over its database connection.
//!
//! Any storage failure is fatal to the rebuild attempt that needed it.

use crate::types::{Article, Snapshot, Subject};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to all content, in storage order.
pub trait ContentSource {
    fn list_all_articles(&self) -> Result<Vec<Article>, StorageError>;
    fn list_all_subjects(&self) -> Result<Vec<Subject>, StorageError>;

    /// Take a full snapshot. Callers must do this after committing the write
    /// that triggered the rebuild.
    fn snapshot(&self) -> Result<Snapshot, StorageError> {
        let articles = self.list_all_articles()?;
        let subjects = self.list_all_subjects()?;
        Ok(Snapshot::new(articles, subjects))
    }
}

/// A storage export on disk: `{"articles": [...], "subjects": [...]}`.
///
/// The file is re-read on every call, so a snapshot always reflects the
/// latest export.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Snapshot, StorageError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StorageError::Unavailable {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

impl ContentSource for JsonSnapshotSource {
    fn list_all_articles(&self) -> Result<Vec<Article>, StorageError> {
        Ok(self.load()?.articles().to_vec())
    }

    fn list_all_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        Ok(self.load()?.subjects().to_vec())
    }

    // One read for both lists, so the two halves come from the same export.
    fn snapshot(&self) -> Result<Snapshot, StorageError> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    #[test]
    fn reads_export_written_by_storage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        let snap = Snapshot::new(vec![article(7, "Hi", 1)], vec![subject(1, "General")]);
        fs::write(&path, serde_json::to_string_pretty(&snap).unwrap()).unwrap();

        let source = JsonSnapshotSource::new(&path);
        assert_eq!(source.snapshot().unwrap(), snap);
        assert_eq!(source.list_all_articles().unwrap().len(), 1);
        assert_eq!(source.list_all_subjects().unwrap()[0].slug, "general");
    }

    #[test]
    fn missing_export_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let source = JsonSnapshotSource::new(tmp.path().join("nope.json"));
        assert!(matches!(
            source.snapshot(),
            Err(StorageError::Unavailable { .. })
        ));
    }

    #[test]
    fn garbage_export_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonSnapshotSource::new(&path).list_all_subjects().unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
        assert!(err.to_string().contains("snapshot.json"));
    }
}
