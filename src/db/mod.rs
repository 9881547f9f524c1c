//! Database connection and catalog repositories
//!
//! The catalog (libraries, titles, chapters, duplicates) lives in SQLite.
//! Repositories are cheap handles created per call from [Database].

pub mod chapters;
pub mod duplicates;
pub mod libraries;
pub mod seed;
pub mod sqlite_helpers;
pub mod titles;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::broadcast;

use crate::services::notifications::LibraryEvent;

pub use chapters::{ChapterRecord, ChapterRepository, NewChapter};
pub use duplicates::{DuplicateRecord, DuplicateRepository};
pub use libraries::{CreateLibrary, LibraryRecord, LibraryRepository, UpdateLibrary};
pub use titles::{CreateTitle, TitleRecord, TitleRepository};

/// How long a connection waits on SQLite's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    library_events: broadcast::Sender<LibraryEvent>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.pool.size())
            .finish()
    }
}

impl Database {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        let (library_events, _) = broadcast::channel(64);
        Self {
            pool,
            library_events,
        }
    }

    /// Connect using a `sqlite:` URL or a plain file path.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid database URL: {url}"))?
        } else {
            let path = Path::new(url);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            SqliteConnectOptions::new().filename(path)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        Ok(Self::new(pool))
    }

    /// Open (creating if needed) a catalog file and bring its schema up to date.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        let db = Self::connect(&path.to_string_lossy(), max_connections).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction that takes the write lock with its first statement.
    ///
    /// A plain deferred transaction that reads before writing can fail with a
    /// stale snapshot when another worker commits in between. Bumping the
    /// catalog revision first makes concurrent writers queue on the busy
    /// timeout instead.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE catalog_meta SET revision = revision + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Current catalog revision (incremented by every write transaction).
    pub async fn revision(&self) -> Result<i64> {
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM catalog_meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(revision)
    }

    /// Subscribe to library lifecycle notifications emitted by [LibraryRepository].
    pub fn subscribe_library_events(&self) -> broadcast::Receiver<LibraryEvent> {
        self.library_events.subscribe()
    }

    /// Get a library repository
    pub fn libraries(&self) -> LibraryRepository {
        LibraryRepository::new(self.pool.clone(), self.library_events.clone())
    }

    /// Get a title repository
    pub fn titles(&self) -> TitleRepository {
        TitleRepository::new(self.clone())
    }

    /// Get a chapter repository
    pub fn chapters(&self) -> ChapterRepository {
        ChapterRepository::new(self.clone())
    }

    /// Get a duplicate record repository
    pub fn duplicates(&self) -> DuplicateRepository {
        DuplicateRepository::new(self.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::Database;

    /// Fresh file-backed catalog inside its own temp dir.
    pub async fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("catalog.db"), 4)
            .await
            .unwrap();
        (dir, db)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_db;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, db) = test_db().await;
        db.migrate().await.unwrap();
        assert_eq!(db.revision().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_begin_write_bumps_revision_on_commit() {
        let (_dir, db) = test_db().await;

        let tx = db.begin_write().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.revision().await.unwrap(), 1);

        let tx = db.begin_write().await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(db.revision().await.unwrap(), 1);
    }
}
