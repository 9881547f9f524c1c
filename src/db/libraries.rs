//! Library database repository
//!
//! Libraries are owned by the admin surface; the indexer only reads them.
//! Every mutation here emits the matching [LibraryEvent] so running indexers
//! can be started, restarted or stopped.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::types::Json;
use tokio::sync::broadcast;

use super::sqlite_helpers::now_iso8601;
use crate::services::notifications::LibraryEvent;

/// Library record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LibraryRecord {
    pub slug: String,
    pub name: String,
    pub folders: Json<Vec<String>>,
    pub cron: String,
    pub enabled: bool,
    pub metadata_provider: Option<String>,
    pub last_scanned_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LibraryRecord {
    /// Configured folders in their stored order.
    pub fn folder_paths(&self) -> Vec<PathBuf> {
        self.folders.0.iter().map(PathBuf::from).collect()
    }
}

/// Input for creating a library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLibrary {
    pub slug: String,
    pub name: String,
    pub folders: Vec<String>,
    pub cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata_provider: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Input for updating a library
#[derive(Debug, Default)]
pub struct UpdateLibrary {
    pub name: Option<String>,
    pub folders: Option<Vec<String>>,
    pub cron: Option<String>,
    pub metadata_provider: Option<String>,
}

const LIBRARY_COLUMNS: &str = "slug, name, folders, cron, enabled, metadata_provider, \
                               last_scanned_at, created_at, updated_at";

pub struct LibraryRepository {
    pool: SqlitePool,
    events: broadcast::Sender<LibraryEvent>,
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool, events: broadcast::Sender<LibraryEvent>) -> Self {
        Self { pool, events }
    }

    fn notify(&self, event: LibraryEvent) {
        let _ = self.events.send(event);
    }

    /// Get all libraries
    pub async fn list(&self) -> Result<Vec<LibraryRecord>> {
        let records = sqlx::query_as::<_, LibraryRecord>(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get all enabled libraries
    pub async fn list_enabled(&self) -> Result<Vec<LibraryRecord>> {
        let records = sqlx::query_as::<_, LibraryRecord>(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries WHERE enabled = 1 ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get a library by slug
    pub async fn get(&self, slug: &str) -> Result<Option<LibraryRecord>> {
        let record = sqlx::query_as::<_, LibraryRecord>(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries WHERE slug = ?1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Create a new library
    pub async fn create(&self, input: CreateLibrary) -> Result<LibraryRecord> {
        let now = now_iso8601();
        let record = sqlx::query_as::<_, LibraryRecord>(&format!(
            r#"
            INSERT INTO libraries (slug, name, folders, cron, enabled, metadata_provider, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {LIBRARY_COLUMNS}
            "#
        ))
        .bind(&input.slug)
        .bind(&input.name)
        .bind(Json(&input.folders))
        .bind(&input.cron)
        .bind(input.enabled)
        .bind(&input.metadata_provider)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        self.notify(LibraryEvent::Created(record.slug.clone()));
        Ok(record)
    }

    /// Insert or replace a library definition (used by the seed file).
    /// Returns `true` when the library did not exist before.
    pub async fn upsert(&self, input: CreateLibrary) -> Result<bool> {
        let existed = self.get(&input.slug).await?.is_some();
        if !existed {
            self.create(input).await?;
            return Ok(true);
        }

        let slug = input.slug.clone();
        let enabled = input.enabled;
        self.update(
            &slug,
            UpdateLibrary {
                name: Some(input.name),
                folders: Some(input.folders),
                cron: Some(input.cron),
                metadata_provider: input.metadata_provider,
            },
        )
        .await?;
        self.set_enabled(&slug, enabled).await?;
        Ok(false)
    }

    /// Update a library
    pub async fn update(&self, slug: &str, input: UpdateLibrary) -> Result<Option<LibraryRecord>> {
        let record = sqlx::query_as::<_, LibraryRecord>(&format!(
            r#"
            UPDATE libraries SET
                name = COALESCE(?2, name),
                folders = COALESCE(?3, folders),
                cron = COALESCE(?4, cron),
                metadata_provider = COALESCE(?5, metadata_provider),
                updated_at = ?6
            WHERE slug = ?1
            RETURNING {LIBRARY_COLUMNS}
            "#
        ))
        .bind(slug)
        .bind(&input.name)
        .bind(input.folders.as_ref().map(Json))
        .bind(&input.cron)
        .bind(&input.metadata_provider)
        .bind(now_iso8601())
        .fetch_optional(&self.pool)
        .await?;

        if record.is_some() {
            self.notify(LibraryEvent::Updated(slug.to_string()));
        }
        Ok(record)
    }

    /// Enable or disable a library. No event is emitted when nothing changed.
    pub async fn set_enabled(&self, slug: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE libraries SET enabled = ?2, updated_at = ?3 WHERE slug = ?1 AND enabled != ?2",
        )
        .bind(slug)
        .bind(enabled)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.notify(if enabled {
                LibraryEvent::Enabled(slug.to_string())
            } else {
                LibraryEvent::Disabled(slug.to_string())
            });
        }
        Ok(changed)
    }

    /// Delete a library
    pub async fn delete(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM libraries WHERE slug = ?1")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(LibraryEvent::Deleted(slug.to_string()));
        }
        Ok(deleted)
    }

    /// Update last scanned timestamp
    pub async fn update_last_scanned(&self, slug: &str) -> Result<()> {
        sqlx::query("UPDATE libraries SET last_scanned_at = ?2 WHERE slug = ?1")
            .bind(slug)
            .bind(now_iso8601())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
