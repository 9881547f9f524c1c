//! Integration tests for the indexing pipeline
//!
//! These tests drive the public API end to end:
//! - A library pass picking up added and deleted chapters
//! - Cross-library title collisions and duplicate review
//! - The daemon following library lifecycle events

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use shelfkeeper::App;
use shelfkeeper::config::Config;
use shelfkeeper::db::{CreateLibrary, Database};
use shelfkeeper::indexer::{IndexerContext, LibraryIndexer, PassReport};
use shelfkeeper::services::logging::LiveLog;

async fn open_catalog(dir: &TempDir) -> Database {
    Database::open(&dir.path().join("catalog.db"), 4).await.unwrap()
}

async fn create_library(db: &Database, slug: &str, folders: &[&Path]) {
    db.libraries()
        .create(CreateLibrary {
            slug: slug.into(),
            name: slug.into(),
            folders: folders
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            cron: "*/5 * * * *".into(),
            enabled: true,
            metadata_provider: None,
        })
        .await
        .unwrap();
}

fn touch(path: PathBuf) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

async fn pass(indexer: &LibraryIndexer) -> PassReport {
    let report = indexer.run_now().await.unwrap().unwrap();
    indexer.wait_for_sweep().await;
    report
}

// ============================================================================
// Chapter lifecycle
// ============================================================================

#[tokio::test]
async fn test_chapters_follow_disk() {
    let catalog = TempDir::new().unwrap();
    let disk = TempDir::new().unwrap();
    let lib_a = disk.path().join("lib").join("A");
    let title_dir = lib_a.join("One-Punch-Man");
    touch(title_dir.join("chapter-001.cbz"));

    let db = open_catalog(&catalog).await;
    create_library(&db, "manga", &[&lib_a]).await;
    let indexer = LibraryIndexer::new("manga", IndexerContext::new(db.clone()), CancellationToken::new());

    // First pass: one title, one chapter
    let first = pass(&indexer).await;
    assert_eq!(first.counters.titles_created, 1);
    assert_eq!(first.counters.chapters_added, 1);
    let title = db.titles().get("one-punch-man").await.unwrap().unwrap();
    assert_eq!(title.chapter_count, 1);
    assert_eq!(title.library_slug, "manga");
    let chapters: Vec<String> = db
        .chapters()
        .list("one-punch-man")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.slug)
        .collect();
    assert_eq!(chapters, vec!["chapter-001"]);

    // New chapter on disk
    touch(title_dir.join("chapter-002.cbz"));
    let second = pass(&indexer).await;
    assert_eq!(
        (second.counters.chapters_added, second.counters.chapters_removed),
        (1, 0)
    );
    let title = db.titles().get("one-punch-man").await.unwrap().unwrap();
    assert_eq!(title.chapter_count, 2);

    // Chapter deleted from disk
    fs::remove_file(title_dir.join("chapter-001.cbz")).unwrap();
    let third = pass(&indexer).await;
    assert_eq!(
        (third.counters.chapters_added, third.counters.chapters_removed),
        (0, 1)
    );
    let title = db.titles().get("one-punch-man").await.unwrap().unwrap();
    assert_eq!(title.chapter_count, 1);
    let chapters: Vec<String> = db
        .chapters()
        .list("one-punch-man")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.slug)
        .collect();
    assert_eq!(chapters, vec!["chapter-002"]);

    // Nothing changed: fast path
    let fourth = pass(&indexer).await;
    assert_eq!(fourth.counters.unchanged, 1);
    assert_eq!(fourth.counters.chapters_added + fourth.counters.chapters_removed, 0);

    // Title folder removed: the sweep drops it
    fs::remove_dir_all(&title_dir).unwrap();
    pass(&indexer).await;
    assert!(db.titles().get("one-punch-man").await.unwrap().is_none());
}

// ============================================================================
// Collisions across libraries
// ============================================================================

#[tokio::test]
async fn test_collision_across_libraries() {
    let catalog = TempDir::new().unwrap();
    let disk = TempDir::new().unwrap();
    let manga_root = disk.path().join("manga");
    let comics_root = disk.path().join("comics");
    for n in 1..=5 {
        touch(manga_root.join("Berserk").join(format!("ch-{n:03}.cbz")));
        touch(comics_root.join("Berserk").join(format!("ch-{n:03}.cbz")));
    }

    let db = open_catalog(&catalog).await;
    create_library(&db, "manga", &[&manga_root]).await;
    create_library(&db, "comics", &[&comics_root]).await;
    let ctx = IndexerContext::new(db.clone());
    let manga = LibraryIndexer::new("manga", ctx.clone(), CancellationToken::new());
    let comics = LibraryIndexer::new("comics", ctx, CancellationToken::new());

    pass(&manga).await;

    // Equal count: incumbent kept, one record no matter how often it is seen
    let report = pass(&comics).await;
    assert_eq!(report.counters.duplicates_recorded, 1);
    pass(&comics).await;
    let open = db.duplicates().list_open().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title_slug, "berserk");
    assert!(open[0].folder_a < open[0].folder_b);

    // A dismissed pair that still collides is raised again, once
    assert!(db.duplicates().dismiss(open[0].id).await.unwrap());
    assert!(db.duplicates().list_open().await.unwrap().is_empty());
    let report = pass(&comics).await;
    assert_eq!(report.counters.duplicates_recorded, 1);
    let reopened = db.duplicates().list_open().await.unwrap();
    assert_eq!(reopened.len(), 1);
    assert_ne!(reopened[0].id, open[0].id);
    assert_eq!(
        (&reopened[0].folder_a, &reopened[0].folder_b),
        (&open[0].folder_a, &open[0].folder_b)
    );
    let report = pass(&comics).await;
    assert_eq!(report.counters.duplicates_recorded, 0);

    // One more chapter: the comics folder takes over the title
    touch(comics_root.join("Berserk").join("ch-006.cbz"));
    let report = pass(&comics).await;
    assert_eq!(report.counters.promotions, 1);
    assert_eq!(report.counters.chapters_added, 6);
    let title = db.titles().get("berserk").await.unwrap().unwrap();
    assert_eq!(title.library_slug, "comics");
    assert_eq!(title.path, comics_root.join("Berserk").to_string_lossy());
    assert_eq!(title.chapter_count, 6);
}

// ============================================================================
// Daemon
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_follows_library_events() {
    let catalog = TempDir::new().unwrap();
    let disk = TempDir::new().unwrap();
    let seed = catalog.path().join("libraries.json");
    fs::write(
        &seed,
        serde_json::json!([
            {"slug": "manga", "name": "Manga", "folders": [disk.path()], "cron": "0 3 * * *"}
        ])
        .to_string(),
    )
    .unwrap();

    let config = Config {
        database_url: catalog.path().join("catalog.db").to_string_lossy().into_owned(),
        libraries_seed_path: Some(seed),
        shutdown_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let app = App::build(config, LiveLog::new(16)).await.unwrap();
    assert!(app.db.libraries().get("manga").await.unwrap().is_some());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let manager = app.manager.clone();
    let db = app.db.clone();
    let driver = tokio::spawn(async move {
        let mut waited = 0;
        while !manager.is_active("manga") && waited < 100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += 1;
        }
        let started = manager.is_active("manga");

        db.libraries().set_enabled("manga", false).await.unwrap();
        let mut waited = 0;
        while manager.is_active("manga") && waited < 100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += 1;
        }
        let stopped = !manager.is_active("manga");

        let _ = stop_tx.send(());
        (started, stopped)
    });

    app.run_until(async {
        let _ = stop_rx.await;
    })
    .await
    .unwrap();

    assert_eq!(driver.await.unwrap(), (true, true));
    assert!(app.manager.status().is_empty());
    app.close().await;
}
