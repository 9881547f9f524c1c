//! Duplicate record repository
//!
//! A duplicate record is raised when two folders compute the same title slug
//! and the newcomer was not promoted. Folder pairs are stored sorted so the
//! same collision always maps to the same row.

use anyhow::Result;
use serde::Serialize;

use super::Database;
use super::sqlite_helpers::{now_iso8601, sorted_pair};

/// Duplicate record from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DuplicateRecord {
    pub id: i64,
    pub title_slug: String,
    pub library_slug: String,
    pub folder_a: String,
    pub folder_b: String,
    pub dismissed: bool,
    pub created_at: String,
}

const DUPLICATE_COLUMNS: &str =
    "id, title_slug, library_slug, folder_a, folder_b, dismissed, created_at";

pub struct DuplicateRepository {
    db: Database,
}

impl DuplicateRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a collision unless an open record already covers the same
    /// (slug, folder pair).
    ///
    /// Dismissed records do not count, so a pair that is still colliding after
    /// review is raised again. Returns the new record, or `None` when nothing
    /// was inserted.
    pub async fn record_if_absent(
        &self,
        title_slug: &str,
        library_slug: &str,
        folder: &str,
        other_folder: &str,
    ) -> Result<Option<DuplicateRecord>> {
        let (folder_a, folder_b) = sorted_pair(folder, other_folder);
        let mut tx = self.db.begin_write().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM duplicates
            WHERE title_slug = ?1 AND folder_a = ?2 AND folder_b = ?3 AND dismissed = 0
            LIMIT 1
            "#,
        )
        .bind(title_slug)
        .bind(folder_a)
        .bind(folder_b)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Ok(None);
        }

        let record = sqlx::query_as::<_, DuplicateRecord>(&format!(
            r#"
            INSERT INTO duplicates (title_slug, library_slug, folder_a, folder_b, dismissed, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            RETURNING {DUPLICATE_COLUMNS}
            "#
        ))
        .bind(title_slug)
        .bind(library_slug)
        .bind(folder_a)
        .bind(folder_b)
        .bind(now_iso8601())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Records awaiting review
    pub async fn list_open(&self) -> Result<Vec<DuplicateRecord>> {
        let records = sqlx::query_as::<_, DuplicateRecord>(&format!(
            "SELECT {DUPLICATE_COLUMNS} FROM duplicates WHERE dismissed = 0 ORDER BY id"
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// All records (open and dismissed) owned by a library
    pub async fn list_by_library(&self, library_slug: &str) -> Result<Vec<DuplicateRecord>> {
        let records = sqlx::query_as::<_, DuplicateRecord>(&format!(
            "SELECT {DUPLICATE_COLUMNS} FROM duplicates WHERE library_slug = ?1 ORDER BY id"
        ))
        .bind(library_slug)
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    pub async fn dismiss(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE duplicates SET dismissed = 1 WHERE id = ?1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM duplicates WHERE id = ?1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
