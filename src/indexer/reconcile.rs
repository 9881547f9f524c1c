//! Chapter reconciliation
//!
//! Diffs the chapters present on disk for one title against the stored set
//! and applies the difference in a single write transaction.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use sqlx::SqliteConnection;
use walkdir::WalkDir;

use super::classify::is_hidden;
use super::error::IndexerError;
use crate::db::chapters::{NewChapter, delete_all_chapters, delete_chapter, insert_chapter, stored_slugs};
use crate::db::titles::{set_chapter_count, title_path};
use crate::db::Database;
use crate::services::text_utils::{display_name, entry_base_name, has_digit, slugify};

/// A chapter present on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub slug: String,
    pub name: String,
    /// File or folder name relative to the title's folder
    pub file: String,
}

impl Candidate {
    fn from_entry(path: &Path, is_dir: bool) -> Option<Self> {
        let base = entry_base_name(path, is_dir)?;
        let slug = slugify(&base);
        if slug.is_empty() {
            return None;
        }
        Some(Self {
            slug,
            name: display_name(&base),
            file: path.file_name()?.to_string_lossy().into_owned(),
        })
    }

    fn to_new_chapter(&self) -> NewChapter {
        NewChapter::new(&self.slug, &self.name, &self.file)
    }
}

/// Enumerate chapter candidates for a title folder or single archive.
///
/// Returns `None` when the path no longer exists. A single file is its own
/// only chapter; in a folder every visible top-level entry whose stripped name
/// holds a digit is a chapter. Entries are visited in name order and the
/// first entry wins when two normalize to the same slug.
pub fn chapter_candidates(path: &Path) -> Result<Option<Vec<Candidate>>, IndexerError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexerError::io(path, e)),
    };

    if !metadata.is_dir() {
        return Ok(Some(Candidate::from_entry(path, false).into_iter().collect()));
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| IndexerError::io(path, io::Error::from(e)))?;
        let entry_path = entry.path();
        if is_hidden(entry_path) {
            continue;
        }

        let is_dir = entry.file_type().is_dir();
        let Some(base) = entry_base_name(entry_path, is_dir) else {
            continue;
        };
        if !has_digit(&base) {
            continue;
        }

        if let Some(candidate) = Candidate::from_entry(entry_path, is_dir) {
            if seen.insert(candidate.slug.clone()) {
                candidates.push(candidate);
            }
        }
    }

    Ok(Some(candidates))
}

/// Candidate enumeration off the async runtime
pub async fn scan_candidates(path: &Path) -> Result<Option<Vec<Candidate>>, IndexerError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || chapter_candidates(&owned))
        .await
        .map_err(|e| IndexerError::io(path, io::Error::other(e)))?
}

/// Number of chapters present on disk, zero when the path is gone
pub async fn count_candidates(path: &Path) -> Result<usize, IndexerError> {
    Ok(scan_candidates(path).await?.map(|c| c.len()).unwrap_or(0))
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: usize,
    pub removed: usize,
    /// Chapter slugs present on disk after the pass
    pub chapter_slugs: Vec<String>,
    pub present: usize,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone)]
pub struct ChapterReconciler {
    db: Database,
}

impl ChapterReconciler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Bring a title's stored chapters in line with `path`.
    ///
    /// With `dry_run` nothing is read from or written to the catalog; only
    /// `present` and `chapter_slugs` are filled in. Otherwise additions,
    /// removals and the cached chapter count commit together or not at all,
    /// and only while the title is still backed by `path`. A title that was
    /// repointed at another folder yields [`IndexerError::TitleMoved`] with
    /// nothing written.
    pub async fn reconcile(
        &self,
        title_slug: &str,
        path: &Path,
        dry_run: bool,
    ) -> Result<Reconciliation, IndexerError> {
        let Some(candidates) = scan_candidates(path).await? else {
            if dry_run {
                return Ok(Reconciliation::default());
            }
            return self.remove_all(title_slug, path).await;
        };

        let chapter_slugs: Vec<String> = candidates.iter().map(|c| c.slug.clone()).collect();
        let present = candidates.len();

        if dry_run {
            return Ok(Reconciliation {
                chapter_slugs,
                present,
                ..Default::default()
            });
        }

        let mut tx = self.db.begin_write().await?;
        ensure_backed_by(&mut tx, title_slug, path).await?;
        let stored = stored_slugs(&mut tx, title_slug).await?;

        let mut added = 0;
        for candidate in candidates.iter().filter(|c| !stored.contains(&c.slug)) {
            insert_chapter(&mut tx, title_slug, &candidate.to_new_chapter()).await?;
            added += 1;
        }

        let on_disk: HashSet<&str> = chapter_slugs.iter().map(String::as_str).collect();
        let mut removals: Vec<&String> = stored
            .iter()
            .filter(|slug| !on_disk.contains(slug.as_str()))
            .collect();
        removals.sort();
        for slug in &removals {
            delete_chapter(&mut tx, title_slug, slug).await?;
        }

        set_chapter_count(&mut tx, title_slug, present as i64).await?;
        tx.commit().await?;

        tracing::debug!(
            title = %title_slug,
            added,
            removed = removals.len(),
            present,
            "Reconciled chapters"
        );

        Ok(Reconciliation {
            added,
            removed: removals.len(),
            chapter_slugs,
            present,
        })
    }

    async fn remove_all(
        &self,
        title_slug: &str,
        path: &Path,
    ) -> Result<Reconciliation, IndexerError> {
        let mut tx = self.db.begin_write().await?;
        ensure_backed_by(&mut tx, title_slug, path).await?;
        let removed = delete_all_chapters(&mut tx, title_slug).await?;
        set_chapter_count(&mut tx, title_slug, 0).await?;
        tx.commit().await?;

        tracing::debug!(title = %title_slug, removed, "Title path gone, removed all chapters");

        Ok(Reconciliation {
            removed: removed as usize,
            ..Default::default()
        })
    }
}

/// Fail unless the title's stored folder is still `path`.
///
/// Runs inside the write transaction, so a concurrent promotion either
/// commits before this check or waits for the reconciliation to finish.
async fn ensure_backed_by(
    conn: &mut SqliteConnection,
    title_slug: &str,
    path: &Path,
) -> Result<(), IndexerError> {
    let expected = path.to_string_lossy();
    match title_path(conn, title_slug).await? {
        Some(current) if current == expected => Ok(()),
        current => Err(IndexerError::TitleMoved {
            slug: title_slug.to_string(),
            path: path.to_path_buf(),
            current,
        }),
    }
}
