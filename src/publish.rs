//! Rebuild orchestration and atomic publishing.
//!
//! A rebuild turns one [`Snapshot`] into a complete output tree and makes it
//! visible in a single step. Readers see either the previous tree or the new
//! one, never a mix.
//!
//! ## States
//!
//! ```text
//! Idle → PreparingOutput → RenderingIndex → RenderingSubjectPages
//!      → RenderingArticlePages → WritingFeeds → Published
//!                    (any step) ↘ Failed
//! ```
//!
//! ## On-disk layout
//!
//! ```text
//! site/                         ← output root, a symlink on Unix
//!   → .site.generations/20240615T080000.123456Z-4242-0
//! .site.generations/
//! ├── 20240614T…-4242-0/        # previous generation, kept one cycle
//! ├── 20240615T…-4242-0/        # current generation
//! │   ├── index.html
//! │   ├── style.css
//! │   ├── sitemap.xml
//! │   ├── rss.xml
//! │   ├── articles/{slug}.html
//! │   └── sub/{slug}.html
//! └── 20240615T…-4242-1.staging/ # rebuild in flight
//! ```
//!
//! Every rebuild renders into a freshly created `.staging` directory. Only
//! when every page and both feeds are written is the directory sealed and the
//! output root repointed with `rename(2)`, which replaces the symlink
//! atomically. A failure at any earlier step deletes the staging directory and
//! leaves the published tree untouched.
//!
//! ## Mutual exclusion
//!
//! One [`Rebuilder`] runs one rebuild at a time; concurrent callers block on an
//! internal mutex. Across processes, every rebuild holds an exclusive `flock`
//! on `.site.generations/.lock` from staging until pruning is done, so one
//! process never prunes a generation another is about to swap in. Staging
//! directories are created with `create_dir` under names that embed a
//! timestamp, the process id and a sequence number, so rebuilds never share a
//! staging path.

use crate::config::SiteConfig;
use crate::feed::{self, Clock, FeedKind, SiteUrls, SystemClock};
use crate::project::{ProjectError, project};
use crate::render::{
    self, Document, HtmlRenderer, PageRenderer, RenderError, SITE_TITLE, STYLESHEET,
};
use crate::source::{ContentSource, StorageError};
use crate::types::{ArticleView, Snapshot, Subject, Visibility};
use chrono::Utc;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

const STAGING_SUFFIX: &str = ".staging";
const LOCK_FILE: &str = ".lock";
const STYLESHEET_FILE: &str = "style.css";

/// Disambiguates generation ids minted within one process.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("article {article_id} references missing subject {subject_id}")]
    DanglingSubjectReference { article_id: i64, subject_id: i64 },
    #[error("failed to render {document}: {cause}")]
    RenderFailure {
        document: Document,
        #[source]
        cause: RenderError,
    },
    #[error("failed to write {feed}: {cause}")]
    FeedFailure {
        feed: FeedKind,
        #[source]
        cause: io::Error,
    },
    #[error("failed to swap in the new site tree, inspect the output root: {cause}")]
    PublishFailure {
        #[source]
        cause: io::Error,
    },
    #[error("failed to prepare staging directory {path}: {cause}")]
    PrepareFailure {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ProjectError> for RebuildError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::DanglingSubjectReference {
                article_id,
                subject_id,
            } => RebuildError::DanglingSubjectReference {
                article_id,
                subject_id,
            },
        }
    }
}

/// Where a rebuild is, or where the last one ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Idle,
    PreparingOutput,
    RenderingIndex,
    RenderingSubjectPages,
    RenderingArticlePages,
    WritingFeeds,
    Published,
    Failed,
}

/// Summary of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Name of the generation directory now served at the output root.
    pub generation: String,
    pub output_root: PathBuf,
    pub article_pages: usize,
    pub subject_pages: usize,
    /// Entries in `sitemap.xml`, root included.
    pub sitemap_entries: usize,
    /// Items in `rss.xml` (public articles).
    pub feed_items: usize,
    /// SHA-256 over every HTML page path and body, in write order. Feeds are
    /// excluded because they carry the build time.
    pub pages_digest: String,
    /// Subjects in listing order with their articles, newest first.
    pub inventory: Vec<SubjectEntry>,
}

/// A published subject listing and the article pages under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectEntry {
    pub title: String,
    /// Path relative to the output root.
    pub path: String,
    pub articles: Vec<ArticleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleEntry {
    pub title: String,
    pub path: String,
    pub visibility: Visibility,
}

/// Runs full rebuilds against one output root.
///
/// Generic over the page renderer and the clock so tests can inject failures
/// and pin build dates; [`Rebuilder::new`] wires the production pair.
pub struct Rebuilder<R = HtmlRenderer, C = SystemClock> {
    output_root: PathBuf,
    urls: SiteUrls,
    renderer: R,
    clock: C,
    in_flight: Mutex<()>,
    state: Mutex<RebuildState>,
}

impl Rebuilder {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            output_root: config.output_root.clone(),
            urls: SiteUrls::new(&config.base_url),
            renderer: HtmlRenderer::new(config.excerpt_words),
            clock: SystemClock,
            in_flight: Mutex::new(()),
            state: Mutex::new(RebuildState::Idle),
        }
    }
}

impl<R: PageRenderer, C: Clock> Rebuilder<R, C> {
    pub fn with_renderer<R2: PageRenderer>(self, renderer: R2) -> Rebuilder<R2, C> {
        Rebuilder {
            output_root: self.output_root,
            urls: self.urls,
            renderer,
            clock: self.clock,
            in_flight: self.in_flight,
            state: self.state,
        }
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> Rebuilder<R, C2> {
        Rebuilder {
            output_root: self.output_root,
            urls: self.urls,
            renderer: self.renderer,
            clock,
            in_flight: self.in_flight,
            state: self.state,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn state(&self) -> RebuildState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot `source`, then rebuild from it.
    pub fn rebuild_from(&self, source: &impl ContentSource) -> Result<RebuildReport, RebuildError> {
        let snapshot = match source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.enter(RebuildState::Failed);
                tracing::warn!(error = %err, "could not read content, rebuild not started");
                return Err(err.into());
            }
        };
        self.rebuild(&snapshot)
    }

    /// Render `snapshot` into a new generation and publish it.
    ///
    /// Blocks until the new tree is live or the attempt has failed. On any
    /// error the previously published tree is still being served, except
    /// after [`RebuildError::PublishFailure`], where the output root needs
    /// a look.
    pub fn rebuild(&self, snapshot: &Snapshot) -> Result<RebuildReport, RebuildError> {
        let _guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        let result = self.run(snapshot);
        match &result {
            Ok(report) => {
                self.enter(RebuildState::Published);
                tracing::info!(
                    generation = %report.generation,
                    articles = report.article_pages,
                    subjects = report.subject_pages,
                    "published {}",
                    report.output_root.display()
                );
            }
            Err(err @ RebuildError::PublishFailure { .. }) => {
                self.enter(RebuildState::Failed);
                tracing::error!(error = %err, "publish step failed, output root needs operator attention");
            }
            Err(err) => {
                self.enter(RebuildState::Failed);
                tracing::warn!(error = %err, "rebuild failed, previous site left in place");
            }
        }
        result
    }

    fn enter(&self, next: RebuildState) {
        tracing::debug!(state = ?next, "rebuild state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn run(&self, snapshot: &Snapshot) -> Result<RebuildReport, RebuildError> {
        // Integrity is checked before anything touches the disk.
        let views = project(snapshot.articles(), snapshot.subjects())?;
        let subjects = render::listing_order(snapshot.subjects());
        let ordered = render::newest_first(&views);

        self.enter(RebuildState::PreparingOutput);
        let layout = Layout::for_root(&self.output_root)?;
        let _lock = PublishLock::acquire(&layout)?;
        let mut staging = Staging::create(&layout)?;

        self.enter(RebuildState::RenderingIndex);
        let index = self
            .renderer
            .render_index(&views, snapshot.subjects())
            .map_err(|cause| render_failure(Document::Index, cause))?;
        staging.write_page(&Document::Index, &index)?;

        self.enter(RebuildState::RenderingSubjectPages);
        for subject in &subjects {
            let document = Document::Subject(subject.slug.clone());
            let page = self
                .renderer
                .render_subject_page(subject, &views)
                .map_err(|cause| render_failure(document.clone(), cause))?;
            staging.write_page(&document, &page)?;
        }

        self.enter(RebuildState::RenderingArticlePages);
        let pages = ordered
            .par_iter()
            .map(|view| {
                let document = Document::Article(view.slug.clone());
                match self.renderer.render_article_page(view) {
                    Ok(page) => Ok((document, page)),
                    Err(cause) => Err(render_failure(document, cause)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (document, page) in &pages {
            staging.write_page(document, page)?;
        }

        self.enter(RebuildState::WritingFeeds);
        let sitemap = feed::build_sitemap(&views, snapshot.subjects(), &self.urls, &self.clock);
        staging.write_feed(FeedKind::Sitemap, &sitemap)?;
        let rss = feed::build_rss(&views, &self.urls, SITE_TITLE, &self.clock);
        staging.write_feed(FeedKind::Rss, &rss)?;

        let pages_digest = staging.digest();
        let generation = staging.publish(&layout)?;

        Ok(RebuildReport {
            generation,
            output_root: self.output_root.clone(),
            article_pages: pages.len(),
            subject_pages: subjects.len(),
            sitemap_entries: 1 + views.len() + subjects.len(),
            feed_items: views.iter().filter(|v| v.visibility.is_public()).count(),
            pages_digest,
            inventory: inventory(&subjects, &ordered),
        })
    }
}

fn inventory(subjects: &[&Subject], ordered: &[&ArticleView]) -> Vec<SubjectEntry> {
    subjects
        .iter()
        .map(|subject| SubjectEntry {
            title: subject.title.clone(),
            path: Document::Subject(subject.slug.clone()).relative_path(),
            articles: ordered
                .iter()
                .filter(|view| view.subject_id == subject.id)
                .map(|view| ArticleEntry {
                    title: view.title.clone(),
                    path: Document::Article(view.slug.clone()).relative_path(),
                    visibility: view.visibility,
                })
                .collect(),
        })
        .collect()
}

fn render_failure(document: Document, cause: RenderError) -> RebuildError {
    RebuildError::RenderFailure { document, cause }
}

fn publish_failure(cause: io::Error) -> RebuildError {
    RebuildError::PublishFailure { cause }
}

// ============================================================================
// Layout
// ============================================================================

/// Paths derived from the output root.
#[derive(Debug, Clone)]
struct Layout {
    root: PathBuf,
    parent: PathBuf,
    name: OsString,
    /// `.<name>.generations`, relative to `parent`. Symlinks store this form
    /// so the whole site directory can be moved.
    generations_rel: PathBuf,
    generations: PathBuf,
}

impl Layout {
    fn for_root(root: &Path) -> Result<Self, RebuildError> {
        let name = root
            .file_name()
            .ok_or_else(|| RebuildError::PrepareFailure {
                path: root.to_path_buf(),
                cause: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "output root must name a directory",
                ),
            })?
            .to_os_string();
        let parent = match root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let generations_rel = PathBuf::from(format!(".{}.generations", name.to_string_lossy()));
        let generations = parent.join(&generations_rel);
        Ok(Self {
            root: root.to_path_buf(),
            parent,
            name,
            generations_rel,
            generations,
        })
    }
}

/// Identifier of a new generation: sortable by creation time, unique across
/// processes.
fn generation_id() -> String {
    format!(
        "{}-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

// ============================================================================
// Cross-process lock
// ============================================================================

/// Exclusive lock on the generations directory, released on drop.
///
/// Blocks until any other process rebuilding the same output root is done.
struct PublishLock {
    _file: fs::File,
}

impl PublishLock {
    fn acquire(layout: &Layout) -> Result<Self, RebuildError> {
        let path = layout.generations.join(LOCK_FILE);
        let prepare_failure = |cause| RebuildError::PrepareFailure {
            path: path.clone(),
            cause,
        };
        fs::create_dir_all(&layout.generations).map_err(prepare_failure)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(prepare_failure)?;
        flock_exclusive(&file).map_err(prepare_failure)?;
        tracing::debug!(lock = %path.display(), "acquired publish lock");
        Ok(Self { _file: file })
    }
}

/// Block until an exclusive `flock` is held on `file`. Closing the file
/// releases it.
#[cfg(unix)]
fn flock_exclusive(file: &fs::File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    loop {
        // SAFETY: flock is a standard POSIX call and the descriptor is owned
        // by `file`, which outlives the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn flock_exclusive(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// Staging
// ============================================================================

/// A generation being written. Removed on drop unless it was published.
struct Staging {
    id: String,
    dir: PathBuf,
    digest: Sha256,
    published: bool,
}

impl Staging {
    fn create(layout: &Layout) -> Result<Self, RebuildError> {
        let prepare_failure = |path: &Path, cause| RebuildError::PrepareFailure {
            path: path.to_path_buf(),
            cause,
        };

        fs::create_dir_all(&layout.generations)
            .map_err(|cause| prepare_failure(&layout.generations, cause))?;

        let id = generation_id();
        let dir = layout.generations.join(format!("{id}{STAGING_SUFFIX}"));
        // Exclusive: fails if another rebuild somehow picked the same name.
        fs::create_dir(&dir).map_err(|cause| prepare_failure(&dir, cause))?;
        tracing::debug!(staging = %dir.display(), "created staging directory");

        let staging = Self {
            id,
            dir,
            digest: Sha256::new(),
            published: false,
        };
        let stylesheet = staging.dir.join(STYLESHEET_FILE);
        write_new_file(&stylesheet, STYLESHEET.as_bytes())
            .map_err(|cause| prepare_failure(&stylesheet, cause))?;
        Ok(staging)
    }

    fn write_page(&mut self, document: &Document, bytes: &[u8]) -> Result<(), RebuildError> {
        if let Some(slug) = unsafe_slug(document) {
            return Err(render_failure(
                document.clone(),
                RenderError::Template(format!("slug {slug:?} is not a single path segment")),
            ));
        }
        let rel = document.relative_path();
        write_new_file(&self.dir.join(&rel), bytes).map_err(|cause| {
            render_failure(document.clone(), RenderError::Io(cause))
        })?;
        self.digest.update(rel.as_bytes());
        self.digest.update([0u8]);
        self.digest.update(bytes);
        self.digest.update([0u8]);
        Ok(())
    }

    fn write_feed(&self, feed: FeedKind, xml: &str) -> Result<(), RebuildError> {
        write_new_file(&self.dir.join(feed.file_name()), xml.as_bytes())
            .map_err(|cause| RebuildError::FeedFailure { feed, cause })
    }

    fn digest(&self) -> String {
        format!("{:x}", self.digest.clone().finalize())
    }

    /// Seal the staging directory and make it the live tree.
    fn publish(mut self, layout: &Layout) -> Result<String, RebuildError> {
        let sealed = layout.generations.join(&self.id);
        fs::rename(&self.dir, &sealed).map_err(publish_failure)?;
        self.dir = sealed;

        let previous = swap(layout, &self.id).map_err(publish_failure)?;
        self.published = true;

        prune(layout, &self.id, previous.as_deref());
        Ok(self.id.clone())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(staging = %self.dir.display(), "discarded staging directory"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                error = %err,
                "could not remove staging directory {}",
                self.dir.display()
            ),
        }
    }
}

/// The slug of a subject or article document if it could escape its folder.
fn unsafe_slug(document: &Document) -> Option<&str> {
    let slug = match document {
        Document::Index => return None,
        Document::Subject(slug) | Document::Article(slug) => slug.as_str(),
    };
    let escapes = slug.contains(['/', '\\']) || slug == "." || slug == "..";
    escapes.then_some(slug)
}

/// Write a file that must not exist yet, creating parent directories.
///
/// Two documents mapping to the same path (duplicate slugs) fail here
/// instead of one silently replacing the other.
fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ============================================================================
// Swap
// ============================================================================

/// Point the output root at generation `id`. Returns the generation it
/// pointed at before, if any.
#[cfg(unix)]
fn swap(layout: &Layout, id: &str) -> io::Result<Option<String>> {
    let previous = match fs::symlink_metadata(&layout.root) {
        Ok(meta) if meta.file_type().is_symlink() => fs::read_link(&layout.root)?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        Ok(meta) if meta.is_dir() => retire_directory(layout, id)?,
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "{} exists and is not a directory or symlink",
                    layout.root.display()
                ),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(err),
    };

    let target = layout.generations_rel.join(id);
    let next_link = layout
        .parent
        .join(format!(".{}.next-{id}", layout.name.to_string_lossy()));
    std::os::unix::fs::symlink(&target, &next_link)?;
    if let Err(err) = fs::rename(&next_link, &layout.root) {
        let _ = fs::remove_file(&next_link);
        return Err(err);
    }
    sync_dir(&layout.parent);
    Ok(previous)
}

/// Move a plain output directory out of the way so a symlink can take its
/// place. An empty directory is removed instead.
#[cfg(unix)]
fn retire_directory(layout: &Layout, id: &str) -> io::Result<Option<String>> {
    if fs::read_dir(&layout.root)?.next().is_none() {
        fs::remove_dir(&layout.root)?;
        return Ok(None);
    }
    let legacy = format!("legacy-{id}");
    tracing::warn!(
        "{} is a plain directory; moving it to {} (this first swap is not atomic)",
        layout.root.display(),
        layout.generations_rel.join(&legacy).display()
    );
    fs::rename(&layout.root, layout.generations.join(&legacy))?;
    Ok(Some(legacy))
}

/// Without symlink replacement the best available is a rename pair: the
/// output root is briefly absent between the two renames.
#[cfg(not(unix))]
fn swap(layout: &Layout, id: &str) -> io::Result<Option<String>> {
    let generation = layout.generations.join(id);
    let retired = format!("retired-{id}");
    let aside = layout.generations.join(&retired);
    let had_previous = layout.root.exists();
    if had_previous {
        fs::rename(&layout.root, &aside)?;
    }
    if let Err(err) = fs::rename(&generation, &layout.root) {
        if had_previous {
            let _ = fs::rename(&aside, &layout.root);
        }
        return Err(err);
    }
    Ok(had_previous.then_some(retired))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Delete generations older than `current`, except `previous`.
///
/// Readers that resolved the output root just before the swap may still be
/// walking `previous`, so it survives one more cycle. Anything newer than
/// `current` was minted after this rebuild started and is left alone, as is
/// the lock file. Failures are logged; the new tree is already live.
// TODO: reap `.staging` directories left behind by rebuilds that crashed
// mid-render; they are skipped here because they may belong to a live rebuild.
fn prune(layout: &Layout, current: &str, previous: Option<&str>) {
    let entries = match fs::read_dir(&layout.generations) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "could not list generations for pruning");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == current
            || Some(name.as_str()) == previous
            || name == LOCK_FILE
            || name.ends_with(STAGING_SUFFIX)
            || generation_stamp(&name) > current
        {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => tracing::debug!(generation = %name, "pruned old generation"),
            Err(err) => tracing::warn!(error = %err, generation = %name, "could not prune generation"),
        }
    }
}

/// The generation id inside a directory name, without the prefix given to
/// trees moved aside by [`swap`].
fn generation_stamp(name: &str) -> &str {
    name.strip_prefix("legacy-")
        .or_else(|| name.strip_prefix("retired-"))
        .unwrap_or(name)
}
