//! Duplicate resolution for colliding title slugs
//!
//! When a newly discovered folder computes the slug of a title already backed
//! by a different folder, either the new folder takes over the title or the
//! pair is recorded for review. The rule is local and greedy: three-way
//! collisions end up as pairwise records.

use std::path::Path;

use tracing::{debug, info};

use super::error::IndexerError;
use super::reconcile::count_candidates;
use crate::db::{Database, DuplicateRecord, TitleRecord};

/// What happened to a colliding folder
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The new folder had strictly more chapters and now backs the title.
    Promoted { chapters_removed: u64 },
    /// The incumbent folder is gone from disk; the title moved.
    Relocated { chapters_removed: u64 },
    /// A review record was created for the pair.
    Recorded(DuplicateRecord),
    /// An open record already covers the pair.
    AlreadyRecorded,
}

impl Resolution {
    /// Whether indexing should continue with the new folder as the title's folder.
    pub fn takes_over(&self) -> bool {
        matches!(self, Self::Promoted { .. } | Self::Relocated { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateResolver {
    db: Database,
}

impl DuplicateResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Decide between `incumbent` and the folder at `candidate_path`.
    ///
    /// Strictly more chapter candidates than the incumbent's cached count wins;
    /// a tie keeps the incumbent and raises a review record.
    pub async fn resolve(
        &self,
        library_slug: &str,
        incumbent: &TitleRecord,
        candidate_path: &Path,
    ) -> Result<Resolution, IndexerError> {
        let candidate = candidate_path.to_string_lossy();

        let incumbent_exists = tokio::fs::try_exists(&incumbent.path)
            .await
            .unwrap_or(false);
        if !incumbent_exists {
            let chapters_removed = self
                .db
                .titles()
                .promote(&incumbent.slug, &candidate, library_slug)
                .await?;
            info!(
                library = %library_slug,
                title = %incumbent.slug,
                from = %incumbent.path,
                to = %candidate,
                "Title folder moved, relocating"
            );
            return Ok(Resolution::Relocated { chapters_removed });
        }

        let present = count_candidates(candidate_path).await?;
        if present as i64 > incumbent.chapter_count {
            let chapters_removed = self
                .db
                .titles()
                .promote(&incumbent.slug, &candidate, library_slug)
                .await?;
            info!(
                library = %library_slug,
                title = %incumbent.slug,
                from = %incumbent.path,
                to = %candidate,
                present,
                cached = incumbent.chapter_count,
                "Promoted folder with more chapters"
            );
            return Ok(Resolution::Promoted { chapters_removed });
        }

        let recorded = self
            .db
            .duplicates()
            .record_if_absent(&incumbent.slug, library_slug, &candidate, &incumbent.path)
            .await?;

        match recorded {
            Some(record) => {
                info!(
                    library = %library_slug,
                    title = %incumbent.slug,
                    folder_a = %record.folder_a,
                    folder_b = %record.folder_b,
                    "Recorded duplicate title folder"
                );
                Ok(Resolution::Recorded(record))
            }
            None => {
                debug!(
                    library = %library_slug,
                    title = %incumbent.slug,
                    path = %candidate,
                    "Duplicate already on file"
                );
                Ok(Resolution::AlreadyRecorded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateTitle;
    use crate::db::test_support::test_db;
    use crate::indexer::reconcile::ChapterReconciler;
    use assert_matches::assert_matches;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn folder_with_chapters(root: &Path, name: &str, count: usize) -> PathBuf {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        for n in 1..=count {
            fs::write(folder.join(format!("ch-{n:03}.cbz")), b"").unwrap();
        }
        folder
    }

    async fn incumbent(db: &Database, folder: &Path) -> TitleRecord {
        db.titles()
            .create_if_absent(CreateTitle {
                slug: "berserk".into(),
                library_slug: "manga".into(),
                path: folder.to_string_lossy().into_owned(),
                name: "Berserk".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        ChapterReconciler::new(db.clone())
            .reconcile("berserk", folder, false)
            .await
            .unwrap();
        db.titles().get("berserk").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_equal_count_records_instead_of_promoting() {
        let (_db_dir, db) = test_db().await;
        let root = TempDir::new().unwrap();
        let a = folder_with_chapters(root.path(), "A/Berserk", 5);
        let b = folder_with_chapters(root.path(), "B/Berserk", 5);
        let title = incumbent(&db, &a).await;
        assert_eq!(title.chapter_count, 5);

        let resolution = DuplicateResolver::new(db.clone())
            .resolve("comics", &title, &b)
            .await
            .unwrap();

        assert_matches!(resolution, Resolution::Recorded(_));
        assert!(!resolution.takes_over());
        let title = db.titles().get("berserk").await.unwrap().unwrap();
        assert_eq!(title.path, a.to_string_lossy());
        assert_eq!(db.duplicates().list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_strictly_more_chapters_promotes() {
        let (_db_dir, db) = test_db().await;
        let root = TempDir::new().unwrap();
        let a = folder_with_chapters(root.path(), "A/Berserk", 5);
        let b = folder_with_chapters(root.path(), "B/Berserk", 6);
        let title = incumbent(&db, &a).await;

        let resolution = DuplicateResolver::new(db.clone())
            .resolve("comics", &title, &b)
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Promoted { chapters_removed: 5 });
        let title = db.titles().get("berserk").await.unwrap().unwrap();
        assert_eq!(title.path, b.to_string_lossy());
        assert_eq!(title.library_slug, "comics");
        assert_eq!(title.chapter_count, 0);
        assert_eq!(db.chapters().count("berserk").await.unwrap(), 0);
        assert!(db.duplicates().list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_detection_records_once() {
        let (_db_dir, db) = test_db().await;
        let root = TempDir::new().unwrap();
        let a = folder_with_chapters(root.path(), "A/Berserk", 3);
        let b = folder_with_chapters(root.path(), "B/Berserk", 2);
        let title = incumbent(&db, &a).await;
        let resolver = DuplicateResolver::new(db.clone());

        assert_matches!(
            resolver.resolve("manga", &title, &b).await.unwrap(),
            Resolution::Recorded(_)
        );
        assert_eq!(
            resolver.resolve("manga", &title, &b).await.unwrap(),
            Resolution::AlreadyRecorded
        );
        assert_eq!(db.duplicates().list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_incumbent_relocates() {
        let (_db_dir, db) = test_db().await;
        let root = TempDir::new().unwrap();
        let a = folder_with_chapters(root.path(), "A/Berserk", 4);
        let b = folder_with_chapters(root.path(), "B/Berserk", 1);
        let title = incumbent(&db, &a).await;
        fs::remove_dir_all(&a).unwrap();

        let resolution = DuplicateResolver::new(db.clone())
            .resolve("manga", &title, &b)
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Relocated { chapters_removed: 4 });
        assert!(resolution.takes_over());
        let title = db.titles().get("berserk").await.unwrap().unwrap();
        assert_eq!(title.path, b.to_string_lossy());
    }
}
