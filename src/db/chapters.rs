//! Chapter database repository
//!
//! Chapter rows are only ever changed in batches inside a write transaction
//! so a title's stored chapter set is never partially updated.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqliteConnection;

use super::Database;
use super::sqlite_helpers::now_iso8601;

/// Chapter record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChapterRecord {
    pub title_slug: String,
    pub slug: String,
    pub name: String,
    pub file: String,
    pub created_at: String,
}

/// A chapter to insert: slug, display name and file reference relative to the title folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChapter {
    pub slug: String,
    pub name: String,
    pub file: String,
}

impl NewChapter {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            file: file.into(),
        }
    }
}

pub struct ChapterRepository {
    db: Database,
}

impl ChapterRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get all chapters of a title
    pub async fn list(&self, title_slug: &str) -> Result<Vec<ChapterRecord>> {
        let records = sqlx::query_as::<_, ChapterRecord>(
            r#"
            SELECT title_slug, slug, name, file, created_at
            FROM chapters
            WHERE title_slug = ?1
            ORDER BY slug
            "#,
        )
        .bind(title_slug)
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Stored chapter slugs of a title
    pub async fn list_slugs(&self, title_slug: &str) -> Result<HashSet<String>> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(stored_slugs(&mut conn, title_slug).await?)
    }

    pub async fn count(&self, title_slug: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters WHERE title_slug = ?1")
            .bind(title_slug)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count)
    }
}

/// Stored chapter slugs of a title, read on the given connection.
pub async fn stored_slugs(
    conn: &mut SqliteConnection,
    title_slug: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM chapters WHERE title_slug = ?1")
        .bind(title_slug)
        .fetch_all(conn)
        .await?;

    Ok(slugs.into_iter().collect())
}

pub async fn insert_chapter(
    conn: &mut SqliteConnection,
    title_slug: &str,
    chapter: &NewChapter,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chapters (title_slug, slug, name, file, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(title_slug)
    .bind(&chapter.slug)
    .bind(&chapter.name)
    .bind(&chapter.file)
    .bind(now_iso8601())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn delete_chapter(
    conn: &mut SqliteConnection,
    title_slug: &str,
    slug: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM chapters WHERE title_slug = ?1 AND slug = ?2")
        .bind(title_slug)
        .bind(slug)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete every chapter of a title, returning how many were removed.
pub async fn delete_all_chapters(
    conn: &mut SqliteConnection,
    title_slug: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM chapters WHERE title_slug = ?1")
        .bind(title_slug)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateTitle;
    use crate::db::test_support::test_db;

    async fn seeded() -> (tempfile::TempDir, Database) {
        let (dir, db) = test_db().await;
        db.titles()
            .create_if_absent(CreateTitle {
                slug: "berserk".into(),
                library_slug: "manga".into(),
                path: "/lib/A/Berserk".into(),
                name: "Berserk".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_batch_inserts_and_deletes_in_one_transaction() {
        let (_dir, db) = seeded().await;

        let mut tx = db.begin_write().await.unwrap();
        insert_chapter(&mut tx, "berserk", &NewChapter::new("ch-1", "ch 1", "ch-1.cbz"))
            .await
            .unwrap();
        insert_chapter(&mut tx, "berserk", &NewChapter::new("ch-2", "ch 2", "ch-2.cbz"))
            .await
            .unwrap();
        delete_chapter(&mut tx, "berserk", "ch-1").await.unwrap();
        tx.commit().await.unwrap();

        let chapters = db.chapters().list("berserk").await.unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].slug, "ch-2");
        assert_eq!(chapters[0].file, "ch-2.cbz");
        assert_eq!(
            db.chapters().list_slugs("berserk").await.unwrap(),
            HashSet::from(["ch-2".to_string()])
        );
    }

    #[tokio::test]
    async fn test_uncommitted_batch_leaves_nothing() {
        let (_dir, db) = seeded().await;

        let mut tx = db.begin_write().await.unwrap();
        insert_chapter(&mut tx, "berserk", &NewChapter::new("ch-1", "ch 1", "ch-1.cbz"))
            .await
            .unwrap();
        // Same slug twice violates the primary key.
        let duplicate =
            insert_chapter(&mut tx, "berserk", &NewChapter::new("ch-1", "ch 1", "ch-1.cbr")).await;
        assert!(duplicate.is_err());
        tx.rollback().await.unwrap();

        assert_eq!(db.chapters().count("berserk").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_all_counts_rows() {
        let (_dir, db) = seeded().await;
        let mut tx = db.begin_write().await.unwrap();
        for n in 1..=3 {
            let slug = format!("ch-{n}");
            insert_chapter(&mut tx, "berserk", &NewChapter::new(&slug, &slug, format!("{slug}.cbz")))
                .await
                .unwrap();
        }
        assert_eq!(delete_all_chapters(&mut tx, "berserk").await.unwrap(), 3);
        tx.commit().await.unwrap();

        assert_eq!(db.chapters().count("berserk").await.unwrap(), 0);
    }
}
