//! Title database repository

use anyhow::Result;
use serde::Serialize;
use sqlx::SqliteConnection;

use super::Database;
use super::sqlite_helpers::{json_to_vec, now_iso8601, vec_to_json};

/// Title record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TitleRecord {
    pub slug: String,
    pub library_slug: String,
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: String,
    pub cover: Option<String>,
    pub chapter_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TitleRecord {
    pub fn tags(&self) -> Vec<String> {
        json_to_vec(&self.tags)
    }
}

/// Input for creating a title
#[derive(Debug, Clone, Default)]
pub struct CreateTitle {
    pub slug: String,
    pub library_slug: String,
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub cover: Option<String>,
}

const TITLE_COLUMNS: &str = "slug, library_slug, path, name, description, tags, cover, \
                             chapter_count, created_at, updated_at";

pub struct TitleRepository {
    db: Database,
}

impl TitleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a title by slug
    pub async fn get(&self, slug: &str) -> Result<Option<TitleRecord>> {
        let record = sqlx::query_as::<_, TitleRecord>(&format!(
            "SELECT {TITLE_COLUMNS} FROM titles WHERE slug = ?1"
        ))
        .bind(slug)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(record)
    }

    /// Get all titles belonging to a library
    pub async fn list_by_library(&self, library_slug: &str) -> Result<Vec<TitleRecord>> {
        let records = sqlx::query_as::<_, TitleRecord>(&format!(
            "SELECT {TITLE_COLUMNS} FROM titles WHERE library_slug = ?1 ORDER BY slug"
        ))
        .bind(library_slug)
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Number of titles cataloged for a library
    pub async fn count_by_library(&self, library_slug: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM titles WHERE library_slug = ?1")
            .bind(library_slug)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count)
    }

    /// Create a title unless one already holds the slug.
    ///
    /// Returns `None` when another worker won the race for the slug; the
    /// caller should re-read and treat the folder as a collision.
    pub async fn create_if_absent(&self, input: CreateTitle) -> Result<Option<TitleRecord>> {
        let now = now_iso8601();
        let record = sqlx::query_as::<_, TitleRecord>(&format!(
            r#"
            INSERT INTO titles (slug, library_slug, path, name, description, tags, cover,
                                chapter_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)
            ON CONFLICT (slug) DO NOTHING
            RETURNING {TITLE_COLUMNS}
            "#
        ))
        .bind(&input.slug)
        .bind(&input.library_slug)
        .bind(&input.path)
        .bind(&input.name)
        .bind(&input.description)
        .bind(vec_to_json(&input.tags))
        .bind(&input.cover)
        .bind(&now)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(record)
    }

    /// Store the cover reference produced by the metadata provider
    pub async fn update_cover(&self, slug: &str, cover: &str) -> Result<()> {
        sqlx::query("UPDATE titles SET cover = ?2, updated_at = ?3 WHERE slug = ?1")
            .bind(slug)
            .bind(cover)
            .bind(now_iso8601())
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Point a title at a new canonical folder.
    ///
    /// Stored chapters are wiped and the cached count reset to zero in the same
    /// transaction; the next reconciliation repopulates them.
    pub async fn promote(&self, slug: &str, path: &str, library_slug: &str) -> Result<u64> {
        let mut tx = self.db.begin_write().await?;

        let removed = sqlx::query("DELETE FROM chapters WHERE title_slug = ?1")
            .bind(slug)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            UPDATE titles SET path = ?2, library_slug = ?3, chapter_count = 0, updated_at = ?4
            WHERE slug = ?1
            "#,
        )
        .bind(slug)
        .bind(path)
        .bind(library_slug)
        .bind(now_iso8601())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(removed)
    }

    /// Delete a title and its chapters
    pub async fn delete(&self, slug: &str) -> Result<bool> {
        let mut tx = self.db.begin_write().await?;

        sqlx::query("DELETE FROM chapters WHERE title_slug = ?1")
            .bind(slug)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM titles WHERE slug = ?1")
            .bind(slug)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Current folder of a title, read on the given connection.
pub async fn title_path(
    conn: &mut SqliteConnection,
    slug: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT path FROM titles WHERE slug = ?1")
        .bind(slug)
        .fetch_optional(conn)
        .await
}

/// Set the cached chapter count inside an open transaction.
pub async fn set_chapter_count(
    conn: &mut SqliteConnection,
    slug: &str,
    count: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE titles SET chapter_count = ?2, updated_at = ?3 WHERE slug = ?1")
        .bind(slug)
        .bind(count)
        .bind(now_iso8601())
        .execute(conn)
        .await?;

    Ok(())
}
