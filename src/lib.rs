//! # Pressroom
//!
//! Regenerates a small article site from its content store. After every
//! committed write the whole site is rebuilt from a fresh snapshot: an index,
//! one listing page per subject, one page per article, a sitemap and an RSS
//! feed of public articles.
//!
//! # Architecture: One Full Rebuild Per Write
//!
//! ```text
//! storage ──snapshot──▶ project ──views──▶ render × N ─┐
//!                                        └──▶ feed × 2 ─┴─▶ staging ──swap──▶ output root
//! ```
//!
//! There is no incremental mode. A rebuild reads everything, renders
//! everything into a fresh staging directory and publishes it in one step.
//! Output is a pure function of the snapshot (plus the build date in the
//! feeds), so two rebuilds from the same data produce the same pages.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`slug`] | Title → URL-safe slug, plus collision suffixes for storage writes |
//! | [`types`] | Storage entities (`Article`, `Subject`), the `Snapshot`, and `ArticleView` |
//! | [`project`] | Joins articles with their subjects; rejects dangling references |
//! | [`render`] | Maud templates for index, subject and article pages behind the `PageRenderer` seam |
//! | [`feed`] | `sitemap.xml` and `rss.xml`, plus the `Clock` seam |
//! | [`publish`] | The rebuild state machine: staging, rendering, atomic swap, pruning |
//! | [`source`] | The storage seam (`ContentSource`) and the JSON export reader |
//! | [`audit`] | Non-fatal integrity report behind the `check` command |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Stage, Then Swap
//!
//! The published tree is never edited in place. Each rebuild writes a new
//! generation next to it and repoints the output root (a symlink) with a
//! single `rename`. A reader that opens `index.html` mid-rebuild gets the old
//! site; one that opens it a moment later gets the new site. A failed rebuild
//! leaves nothing behind. See [`publish`].
//!
//! ## Maud Over Template Engines
//!
//! HTML and the XML feeds are generated with [Maud](https://maud.lambda.xyz/):
//! templates are checked at compile time and every interpolation is escaped.
//! Article bodies are the single exception; they are trusted editor output and
//! inserted verbatim.
//!
//! ## Explicit Ordering
//!
//! Listings are sorted by article identifier, newest first, and subjects by
//! title. Nothing depends on storage order or hash iteration order, which is
//! what makes rebuilds reproducible.

pub mod audit;
pub mod config;
pub mod feed;
pub mod output;
pub mod project;
pub mod publish;
pub mod render;
pub mod slug;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
