//! Library seed file.
//!
//! An optional JSON array of library definitions upserted at startup so a
//! fresh catalog can be brought up without the admin surface. Re-runs are
//! idempotent.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{CreateLibrary, Database};

/// Result of running the seed file.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub errors: Vec<String>,
}

/// Parse a seed document.
pub fn parse_seed(contents: &str) -> Result<Vec<CreateLibrary>> {
    serde_json::from_str(contents).context("Invalid library seed file")
}

/// Upsert every library listed in the seed file at `path`.
pub async fn seed_libraries(db: &Database, path: &Path) -> Result<SeedResult> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let libraries = parse_seed(&contents)?;

    let mut result = SeedResult::default();
    for library in libraries {
        let slug = library.slug.clone();
        match db.libraries().upsert(library).await {
            Ok(true) => result.created.push(slug),
            Ok(false) => result.updated.push(slug),
            Err(e) => {
                warn!(library = %slug, error = %e, "Failed to seed library");
                result.errors.push(format!("{slug}: {e}"));
            }
        }
    }

    info!(
        created = result.created.len(),
        updated = result.updated.len(),
        errors = result.errors.len(),
        "Library seed complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    const SEED: &str = r#"[
        {"slug": "manga", "name": "Manga", "folders": ["/lib/A"], "cron": "*/5 * * * *"},
        {"slug": "comics", "name": "Comics", "folders": ["/lib/C"], "cron": "0 * * * *",
         "enabled": false, "metadata_provider": "local"}
    ]"#;

    #[test]
    fn test_parse_seed_defaults() {
        let libraries = parse_seed(SEED).unwrap();
        assert_eq!(libraries.len(), 2);
        assert!(libraries[0].enabled);
        assert!(libraries[0].metadata_provider.is_none());
        assert!(!libraries[1].enabled);
        assert_eq!(libraries[1].metadata_provider.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (dir, db) = test_db().await;
        let path = dir.path().join("libraries.json");
        std::fs::write(&path, SEED).unwrap();

        let first = seed_libraries(&db, &path).await.unwrap();
        assert_eq!(first.created, vec!["manga".to_string(), "comics".to_string()]);

        let second = seed_libraries(&db, &path).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.updated.len(), 2);
        assert_eq!(db.libraries().list().await.unwrap().len(), 2);
        assert_eq!(db.libraries().list_enabled().await.unwrap().len(), 1);
    }
}
