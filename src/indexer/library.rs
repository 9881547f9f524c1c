//! Per-library indexer
//!
//! One [LibraryIndexer] owns the scan lifecycle of one library. A pass walks
//! the top level of every configured folder, classifies each entry and hands
//! the indexable ones to either a sequential loop or a bounded worker pool.
//! Each unit is created, refreshed (with the fast-path count check) or
//! resolved against a colliding title. When the pass ends an orphan sweep is
//! spawned in the background.
//!
//! At most one pass per library runs at a time. The guard lives in a
//! [PassRegistry] shared by every indexer, so it survives indexer restarts.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::classify::{ContentKind, classify};
use super::duplicates::{DuplicateResolver, Resolution};
use super::error::IndexerError;
use super::reconcile::ChapterReconciler;
use crate::config::Config;
use crate::db::{CreateTitle, Database, LibraryRecord, TitleRecord};
use crate::jobs::{JobRegistry, ScheduledJob};
use crate::services::metadata::{MetadataProvider, MetadataRegistry, TitleMetadata};
use crate::services::notifications::{EventBus, IndexerEvent, ScanCounters};
use crate::services::text_utils::{display_name, entry_base_name, slugify};

/// Tuning for indexing passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerSettings {
    /// Worker tasks in a parallel pass
    pub workers: usize,
    /// Cataloged title count above which a pass runs in parallel
    pub parallel_threshold: usize,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            parallel_threshold: 50,
        }
    }
}

impl From<&Config> for IndexerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.indexer_workers.max(1),
            parallel_threshold: config.parallel_threshold,
        }
    }
}

/// Libraries that currently have a pass in progress
#[derive(Debug, Clone, Default)]
pub struct PassRegistry {
    running: Arc<Mutex<HashSet<String>>>,
}

impl PassRegistry {
    /// Claim the pass slot for `library`, or `None` if a pass already holds it
    pub fn try_acquire(&self, library: &str) -> Option<PassPermit> {
        if !self.running.lock().insert(library.to_string()) {
            return None;
        }
        Some(PassPermit {
            registry: self.clone(),
            library: library.to_string(),
        })
    }

    pub fn is_running(&self, library: &str) -> bool {
        self.running.lock().contains(library)
    }
}

/// Held for the duration of a pass; releases the slot on drop
#[derive(Debug)]
pub struct PassPermit {
    registry: PassRegistry,
    library: String,
}

impl Drop for PassPermit {
    fn drop(&mut self) {
        self.registry.running.lock().remove(&self.library);
    }
}

/// Everything an indexer needs from the rest of the application
#[derive(Debug, Clone)]
pub struct IndexerContext {
    pub db: Database,
    pub metadata: Arc<MetadataRegistry>,
    pub events: EventBus,
    pub settings: IndexerSettings,
    pub passes: PassRegistry,
}

impl IndexerContext {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            metadata: Arc::new(MetadataRegistry::default()),
            events: EventBus::default(),
            settings: IndexerSettings::default(),
            passes: PassRegistry::default(),
        }
    }

    pub fn with_settings(mut self, settings: IndexerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataRegistry) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerState {
    /// Waiting for the next firing or a run-now trigger
    Idle,
    /// A firing was accepted; the library is being loaded
    Scheduled,
    Scanning,
    /// Cancelled; the indexer will not run again
    Stopped,
}

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub library: String,
    pub counters: ScanCounters,
    /// Configured folders that were relative or unreadable
    pub folders_skipped: usize,
    pub parallel: bool,
    pub interrupted: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub titles_removed: usize,
    pub duplicates_removed: usize,
}

/// Scheduler job name for a library
pub fn job_name(library: &str) -> String {
    format!("library:{library}")
}

pub struct LibraryIndexer {
    slug: String,
    ctx: IndexerContext,
    cancel: CancellationToken,
    state: watch::Sender<IndexerState>,
    scanned: Arc<AtomicUsize>,
    sweep: Mutex<Option<JoinHandle<()>>>,
    jobs: Mutex<Option<JobRegistry>>,
}

impl std::fmt::Debug for LibraryIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryIndexer")
            .field("slug", &self.slug)
            .field("state", &self.state())
            .field("scanned", &self.scanned_count())
            .finish()
    }
}

impl LibraryIndexer {
    pub fn new(slug: impl Into<String>, ctx: IndexerContext, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);
        Self {
            slug: slug.into(),
            ctx,
            cancel,
            state,
            scanned: Arc::new(AtomicUsize::new(0)),
            sweep: Mutex::new(None),
            jobs: Mutex::new(None),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Units processed so far in the running pass; zero when idle
    pub fn scanned_count(&self) -> usize {
        self.scanned.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register this indexer with the scheduler on the library's cron expression
    pub async fn start(self: &Arc<Self>, jobs: &JobRegistry, cron: &str) -> Result<(), IndexerError> {
        let job: Arc<dyn ScheduledJob> = self.clone();
        jobs.add_job(&job_name(&self.slug), cron, job).await?;
        *self.jobs.lock() = Some(jobs.clone());

        info!(library = %self.slug, cron = %cron, "Library indexer scheduled");
        Ok(())
    }

    /// Cancel any running pass and unregister from the scheduler.
    ///
    /// A running pass stops dispatching new units; units already in flight
    /// finish their transactions.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if *state == IndexerState::Idle {
                *state = IndexerState::Stopped;
                true
            } else {
                false
            }
        });

        let jobs = self.jobs.lock().take();
        if let Some(jobs) = jobs {
            if let Err(e) = jobs.remove_job(&job_name(&self.slug)).await {
                warn!(library = %self.slug, error = %e, "Failed to unregister library job");
            }
        }

        info!(library = %self.slug, "Library indexer stopped");
    }

    /// Wait until no pass is running
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, IndexerState::Idle | IndexerState::Stopped))
            .await;
    }

    /// Wait for the most recently spawned orphan sweep
    pub async fn wait_for_sweep(&self) {
        let handle = self.sweep.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(library = %self.slug, error = %e, "Orphan sweep task failed");
            }
        }
    }

    /// Run a pass immediately.
    ///
    /// Returns `Ok(None)` without touching the catalog when a pass for this
    /// library is already running or the indexer has been stopped.
    pub async fn run_now(&self) -> Result<Option<PassReport>, IndexerError> {
        if self.cancel.is_cancelled() {
            debug!(library = %self.slug, "Indexer stopped, ignoring trigger");
            return Ok(None);
        }

        let Some(permit) = self.ctx.passes.try_acquire(&self.slug) else {
            info!(library = %self.slug, "Pass already running, skipping");
            return Ok(None);
        };
        let _guard = PassGuard {
            indexer: self,
            permit: Some(permit),
        };
        self.state.send_replace(IndexerState::Scheduled);

        let library = self
            .ctx
            .db
            .libraries()
            .get(&self.slug)
            .await?
            .ok_or_else(|| IndexerError::LibraryNotFound(self.slug.clone()))?;

        self.state.send_replace(IndexerState::Scanning);
        self.ctx.events.publish(IndexerEvent::Started {
            library: self.slug.clone(),
        });
        info!(
            library = %self.slug,
            folders = library.folders.len(),
            "Library pass started"
        );

        let report = match self.run_pass(library).await {
            Ok(report) => report,
            Err(e) => {
                error!(library = %self.slug, error = %e, "Library pass aborted");
                let mut report = PassReport {
                    library: self.slug.clone(),
                    ..Default::default()
                };
                report.counters.failed = 1;
                self.finish(report);
                return Err(e);
            }
        };

        if !report.interrupted {
            if let Err(e) = self.ctx.db.libraries().update_last_scanned(&self.slug).await {
                warn!(library = %self.slug, error = %e, "Failed to record scan time");
            }
        }

        info!(
            library = %self.slug,
            scanned = report.counters.scanned,
            titles_created = report.counters.titles_created,
            chapters_added = report.counters.chapters_added,
            chapters_removed = report.counters.chapters_removed,
            unchanged = report.counters.unchanged,
            promotions = report.counters.promotions,
            duplicates = report.counters.duplicates_recorded,
            failed = report.counters.failed,
            interrupted = report.interrupted,
            elapsed_ms = report.elapsed_ms,
            "Library pass finished"
        );

        self.finish(report.clone());
        Ok(Some(report))
    }

    /// Announce the end of a pass and start its orphan sweep.
    fn finish(&self, report: PassReport) {
        self.ctx.events.publish(IndexerEvent::Finished {
            library: self.slug.clone(),
            report,
        });
        self.spawn_sweep();
    }

    /// Remove catalog entries for this library whose folders are gone or out of scope
    pub async fn sweep_orphans(&self) -> Result<SweepReport, IndexerError> {
        sweep_library(&self.ctx.db, &self.slug).await
    }

    fn spawn_sweep(&self) {
        let db = self.ctx.db.clone();
        let slug = self.slug.clone();
        let handle = tokio::spawn(async move {
            match sweep_library(&db, &slug).await {
                Ok(report) if report.titles_removed + report.duplicates_removed > 0 => {
                    info!(
                        library = %slug,
                        titles_removed = report.titles_removed,
                        duplicates_removed = report.duplicates_removed,
                        "Orphan sweep finished"
                    );
                }
                Ok(_) => debug!(library = %slug, "Orphan sweep found nothing"),
                Err(e) => warn!(library = %slug, error = %e, "Orphan sweep failed"),
            }
        });
        let _previous = self.sweep.lock().replace(handle);
    }

    async fn run_pass(&self, library: LibraryRecord) -> Result<PassReport, IndexerError> {
        let started = Instant::now();
        let mut report = PassReport {
            library: self.slug.clone(),
            ..Default::default()
        };

        let mut units = Vec::new();
        for root in library.folder_paths() {
            if !root.is_absolute() {
                let err = IndexerError::PathResolution { path: root };
                warn!(library = %self.slug, error = %err, "Skipping library folder");
                report.folders_skipped += 1;
                continue;
            }

            let slug = self.slug.clone();
            let scan_root = root.clone();
            match tokio::task::spawn_blocking(move || discover_folder(&slug, &scan_root)).await {
                Ok(Ok(found)) => {
                    debug!(library = %self.slug, path = %root.display(), units = found.len(), "Discovered entries");
                    units.extend(found);
                }
                Ok(Err(e)) => {
                    error!(library = %self.slug, path = %root.display(), error = %e, "Failed to read library folder");
                    report.folders_skipped += 1;
                }
                Err(e) => {
                    error!(library = %self.slug, path = %root.display(), error = %e, "Folder discovery task failed");
                    report.folders_skipped += 1;
                }
            }
        }

        let title_count = self.ctx.db.titles().count_by_library(&self.slug).await?;
        let settings = self.ctx.settings;
        let parallel = settings.workers > 1 && title_count > settings.parallel_threshold as i64;

        let run = PassRun {
            provider: self
                .ctx
                .metadata
                .for_library(library.metadata_provider.as_deref()),
            library: Arc::new(library),
            ctx: self.ctx.clone(),
            reconciler: ChapterReconciler::new(self.ctx.db.clone()),
            resolver: DuplicateResolver::new(self.ctx.db.clone()),
            counters: Arc::new(Mutex::new(ScanCounters::default())),
            scanned: self.scanned.clone(),
            skipped: Arc::new(AtomicUsize::new(0)),
            cancel: self.cancel.clone(),
        };

        let stopped_early = if parallel {
            run.dispatch_parallel(units, settings.workers).await
        } else {
            run.dispatch_sequential(units).await
        };

        report.counters = *run.counters.lock();
        report.interrupted = stopped_early || run.skipped.load(Ordering::SeqCst) > 0;
        report.parallel = parallel;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[async_trait]
impl ScheduledJob for LibraryIndexer {
    async fn execute(&self) {
        if let Err(e) = self.run_now().await {
            error!(library = %self.slug, error = %e, "Library pass failed");
        }
    }
}

/// Returns the indexer to idle when a pass ends, however it ends
struct PassGuard<'a> {
    indexer: &'a LibraryIndexer,
    permit: Option<PassPermit>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        self.indexer.scanned.store(0, Ordering::SeqCst);
        let next = if self.indexer.cancel.is_cancelled() {
            IndexerState::Stopped
        } else {
            IndexerState::Idle
        };
        self.indexer.state.send_replace(next);
    }
}

/// A top-level library entry to index
#[derive(Debug, Clone)]
struct DiscoveryUnit {
    path: PathBuf,
    kind: ContentKind,
}

/// Classify the top-level entries of one library folder, in name order
fn discover_folder(library: &str, root: &Path) -> Result<Vec<DiscoveryUnit>, IndexerError> {
    let mut units = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(IndexerError::io(root, io::Error::from(e))),
            Err(e) => {
                warn!(library = %library, path = ?e.path(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let kind = classify(entry.path(), entry.file_type().is_dir());
        if kind.is_indexable() {
            units.push(DiscoveryUnit {
                path: entry.into_path(),
                kind,
            });
        }
    }

    Ok(units)
}

/// What indexing one unit did to the catalog
#[derive(Debug, Default)]
struct UnitOutcome {
    created: bool,
    added: usize,
    removed: usize,
    unchanged: bool,
    promoted: bool,
    duplicate: bool,
}

impl UnitOutcome {
    fn unchanged() -> Self {
        Self {
            unchanged: true,
            ..Default::default()
        }
    }

    fn apply(&self, counters: &mut ScanCounters) {
        counters.titles_created += usize::from(self.created);
        counters.chapters_added += self.added;
        counters.chapters_removed += self.removed;
        counters.unchanged += usize::from(self.unchanged);
        counters.promotions += usize::from(self.promoted);
        counters.duplicates_recorded += usize::from(self.duplicate);
    }
}

/// State shared by the workers of one pass
#[derive(Clone)]
struct PassRun {
    library: Arc<LibraryRecord>,
    ctx: IndexerContext,
    provider: Arc<dyn MetadataProvider>,
    reconciler: ChapterReconciler,
    resolver: DuplicateResolver,
    counters: Arc<Mutex<ScanCounters>>,
    scanned: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl PassRun {
    fn slug(&self) -> &str {
        &self.library.slug
    }

    /// Returns true when cancellation stopped dispatch early
    async fn dispatch_sequential(&self, units: Vec<DiscoveryUnit>) -> bool {
        for unit in units {
            if self.cancel.is_cancelled() {
                return true;
            }
            self.process(unit).await;
        }
        false
    }

    /// Feed units to `workers` tasks through a bounded queue.
    ///
    /// Returns true when cancellation stopped dispatch early. Units already
    /// handed to a worker always run to completion.
    async fn dispatch_parallel(&self, units: Vec<DiscoveryUnit>, workers: usize) -> bool {
        let (tx, rx) = mpsc::channel::<DiscoveryUnit>(workers);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                let run = self.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(unit) = next else { break };
                        run.process(unit).await;
                    }
                    debug!(library = %run.slug(), worker, "Indexer worker finished");
                })
            })
            .collect();

        let mut stopped_early = false;
        for unit in units {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stopped_early = true;
                    break;
                }
                sent = tx.send(unit) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!(library = %self.slug(), error = %e, "Indexer worker panicked");
            }
        }

        stopped_early
    }

    /// Index one unit and account for it. Failures are contained here.
    async fn process(&self, unit: DiscoveryUnit) {
        let current = unit.path.display().to_string();
        let result = self.index_unit(&unit).await;

        if matches!(&result, Err(e) if e.is_interrupted()) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let scanned = self.scanned.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = {
            let mut counters = self.counters.lock();
            match &result {
                Ok(outcome) => outcome.apply(&mut counters),
                Err(_) => counters.failed += 1,
            }
            counters.scanned += 1;
            *counters
        };

        if let Err(e) = &result {
            warn!(library = %self.slug(), path = %current, error = %e, "Failed to index entry");
        } else {
            debug!(library = %self.slug(), path = %current, scanned, "Indexed entry");
        }

        self.ctx.events.publish(IndexerEvent::Progress {
            library: self.slug().to_string(),
            current,
            counters: snapshot,
        });
    }

    async fn index_unit(&self, unit: &DiscoveryUnit) -> Result<UnitOutcome, IndexerError> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Interrupted);
        }

        let is_dir = unit.kind == ContentKind::TitleFolder;
        let Some(base) = entry_base_name(&unit.path, is_dir) else {
            return Ok(UnitOutcome::unchanged());
        };
        let slug = slugify(&base);
        if slug.is_empty() {
            debug!(library = %self.slug(), path = %unit.path.display(), "Name has no usable characters, skipping");
            return Ok(UnitOutcome::unchanged());
        }

        match self.index_title(&slug, &base, &unit.path).await {
            Err(IndexerError::TitleMoved { current, .. }) => {
                // Another worker repointed the title; decide again against it.
                debug!(
                    library = %self.slug(),
                    title = %slug,
                    path = %unit.path.display(),
                    now = ?current,
                    "Title moved during reconciliation, resolving again"
                );
                self.index_title(&slug, &base, &unit.path).await
            }
            result => result,
        }
    }

    async fn index_title(
        &self,
        slug: &str,
        base: &str,
        path: &Path,
    ) -> Result<UnitOutcome, IndexerError> {
        match self.ctx.db.titles().get(slug).await? {
            None => self.create_title(slug, base, path).await,
            Some(title) if title.path == path.to_string_lossy() => {
                self.refresh_title(&title, path).await
            }
            Some(title) => self.resolve_collision(&title, path).await,
        }
    }

    async fn create_title(
        &self,
        slug: &str,
        base: &str,
        path: &Path,
    ) -> Result<UnitOutcome, IndexerError> {
        let cleaned = display_name(base);
        let metadata = match self.provider.find_best_match(&cleaned).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(library = %self.slug(), title = %slug, error = %e, "Metadata lookup failed");
                None
            }
        };

        let input = CreateTitle {
            slug: slug.to_string(),
            library_slug: self.slug().to_string(),
            path: path.to_string_lossy().into_owned(),
            name: metadata
                .as_ref()
                .map(|m| m.name.clone())
                .unwrap_or_else(|| cleaned.clone()),
            description: metadata.as_ref().and_then(|m| m.description.clone()),
            tags: metadata.as_ref().map(|m| m.tags.clone()).unwrap_or_default(),
            cover: None,
        };

        let titles = self.ctx.db.titles();
        let Some(title) = titles.create_if_absent(input).await? else {
            // Another worker claimed the slug first
            let title = titles
                .get(slug)
                .await?
                .ok_or(IndexerError::Persistence(sqlx::Error::RowNotFound))?;
            return if title.path == path.to_string_lossy() {
                self.refresh_title(&title, path).await
            } else {
                self.resolve_collision(&title, path).await
            };
        };

        info!(library = %self.slug(), title = %title.slug, path = %title.path, "Created title");
        if let Some(metadata) = metadata {
            self.spawn_cover_fetch(title.slug.clone(), metadata);
        }

        let result = self.reconciler.reconcile(&title.slug, path, false).await?;
        Ok(UnitOutcome {
            created: true,
            added: result.added,
            removed: result.removed,
            ..Default::default()
        })
    }

    async fn refresh_title(
        &self,
        title: &TitleRecord,
        path: &Path,
    ) -> Result<UnitOutcome, IndexerError> {
        let counted = self.reconciler.reconcile(&title.slug, path, true).await?;
        if counted.present as i64 == title.chapter_count {
            debug!(library = %self.slug(), title = %title.slug, "Chapter count unchanged");
            return Ok(UnitOutcome::unchanged());
        }

        let result = self.reconciler.reconcile(&title.slug, path, false).await?;
        Ok(UnitOutcome {
            added: result.added,
            removed: result.removed,
            unchanged: result.is_noop(),
            ..Default::default()
        })
    }

    async fn resolve_collision(
        &self,
        title: &TitleRecord,
        path: &Path,
    ) -> Result<UnitOutcome, IndexerError> {
        match self.resolver.resolve(self.slug(), title, path).await? {
            resolution if resolution.takes_over() => {
                let result = self.reconciler.reconcile(&title.slug, path, false).await?;
                Ok(UnitOutcome {
                    added: result.added,
                    removed: result.removed,
                    promoted: true,
                    ..Default::default()
                })
            }
            Resolution::Recorded(_) => Ok(UnitOutcome {
                duplicate: true,
                ..Default::default()
            }),
            _ => Ok(UnitOutcome::default()),
        }
    }

    /// Fetch the cover off the indexing path; failure only logs.
    fn spawn_cover_fetch(&self, title_slug: String, metadata: TitleMetadata) {
        let provider = self.provider.clone();
        let db = self.ctx.db.clone();
        let library = self.slug().to_string();

        tokio::spawn(async move {
            match provider.fetch_cover(&metadata).await {
                Ok(Some(cover)) => match db.titles().update_cover(&title_slug, &cover).await {
                    Ok(()) => debug!(library = %library, title = %title_slug, "Stored cover"),
                    Err(e) => warn!(library = %library, title = %title_slug, error = %e, "Failed to store cover"),
                },
                Ok(None) => {}
                Err(e) => warn!(library = %library, title = %title_slug, error = %e, "Cover fetch failed"),
            }
        });
    }
}

/// Delete titles of `library` whose folder is missing or no longer under a
/// configured folder, and duplicate records referencing a missing folder.
pub async fn sweep_library(db: &Database, library: &str) -> Result<SweepReport, IndexerError> {
    let mut report = SweepReport::default();
    let Some(record) = db.libraries().get(library).await? else {
        return Ok(report);
    };
    let roots: Vec<PathBuf> = record
        .folder_paths()
        .into_iter()
        .filter(|root| root.is_absolute())
        .collect();

    let titles = db.titles();
    for title in titles.list_by_library(library).await? {
        let path = Path::new(&title.path);
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        let in_scope = roots.iter().any(|root| path.starts_with(root));
        if exists && in_scope {
            continue;
        }

        if titles.delete(&title.slug).await? {
            report.titles_removed += 1;
            info!(
                library = %library,
                title = %title.slug,
                path = %title.path,
                missing = !exists,
                "Removed orphaned title"
            );
        }
    }

    let duplicates = db.duplicates();
    for record in duplicates.list_by_library(library).await? {
        let a = tokio::fs::try_exists(&record.folder_a).await.unwrap_or(false);
        let b = tokio::fs::try_exists(&record.folder_b).await.unwrap_or(false);
        if a && b {
            continue;
        }
        if duplicates.delete(record.id).await? {
            report.duplicates_removed += 1;
            debug!(library = %library, title = %record.title_slug, "Removed stale duplicate record");
        }
    }

    Ok(report)
}
