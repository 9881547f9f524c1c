//! Indexer Manager
//!
//! The IndexerManager is responsible for:
//! - Keeping one scheduled [LibraryIndexer] per enabled library
//! - Starting, restarting and stopping indexers on library lifecycle events
//! - Run-now triggers and status for administrative callers
//! - Bounded graceful shutdown of every running pass

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::IndexerError;
use super::library::{IndexerContext, IndexerState, LibraryIndexer, PassReport};
use crate::jobs::JobRegistry;
use crate::services::notifications::LibraryEvent;

/// Snapshot of one active indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerStatus {
    pub library: String,
    pub state: IndexerState,
    pub scanned: usize,
}

/// Registry of active library indexers
pub struct IndexerManager {
    ctx: IndexerContext,
    jobs: JobRegistry,
    /// Active indexers by library slug
    indexers: RwLock<HashMap<String, Arc<LibraryIndexer>>>,
    /// Parent of every indexer's cancellation token
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl IndexerManager {
    pub fn new(ctx: IndexerContext, jobs: JobRegistry, shutdown_timeout: Duration) -> Self {
        Self {
            ctx,
            jobs,
            indexers: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    pub fn context(&self) -> &IndexerContext {
        &self.ctx
    }

    /// Start the scheduler and an indexer for every enabled library.
    ///
    /// Returns how many indexers are active afterwards.
    pub async fn start(&self) -> Result<usize, IndexerError> {
        self.jobs.start().await?;
        self.resync().await
    }

    /// Bring the active set in line with the catalog: stop indexers for
    /// libraries that are gone or disabled, (re)start every enabled one.
    pub async fn resync(&self) -> Result<usize, IndexerError> {
        let enabled = self.ctx.db.libraries().list_enabled().await?;
        let wanted: HashSet<&str> = enabled.iter().map(|l| l.slug.as_str()).collect();

        let stale: Vec<String> = self
            .indexers
            .read()
            .keys()
            .filter(|slug| !wanted.contains(slug.as_str()))
            .cloned()
            .collect();
        for slug in stale {
            self.stop_library(&slug).await;
        }

        for library in &enabled {
            if let Err(e) = self.start_library(&library.slug).await {
                warn!(library = %library.slug, error = %e, "Failed to start library indexer");
            }
        }

        Ok(self.indexers.read().len())
    }

    /// Start (or replace) the indexer for a library.
    ///
    /// Returns false when the library is missing or disabled, in which case
    /// any running indexer for it is stopped.
    pub async fn start_library(&self, slug: &str) -> Result<bool, IndexerError> {
        let library = self.ctx.db.libraries().get(slug).await?;
        self.stop_library(slug).await;

        let Some(library) = library.filter(|l| l.enabled) else {
            debug!(library = %slug, "Library missing or disabled, not starting");
            return Ok(false);
        };

        let indexer = Arc::new(LibraryIndexer::new(
            library.slug.clone(),
            self.ctx.clone(),
            self.shutdown.child_token(),
        ));
        indexer.start(&self.jobs, &library.cron).await?;
        self.indexers.write().insert(library.slug.clone(), indexer);

        info!(library = %library.slug, cron = %library.cron, "Library indexer started");
        Ok(true)
    }

    /// Stop and forget a library's indexer. Returns whether one was active.
    pub async fn stop_library(&self, slug: &str) -> bool {
        let removed = self.indexers.write().remove(slug);
        match removed {
            Some(indexer) => {
                indexer.stop().await;
                true
            }
            None => false,
        }
    }

    /// React to one library lifecycle notification
    pub async fn handle_event(&self, event: &LibraryEvent) -> Result<(), IndexerError> {
        debug!(library = %event.library_slug(), event = ?event, "Library event");
        match event {
            LibraryEvent::Created(slug) | LibraryEvent::Enabled(slug) | LibraryEvent::Updated(slug) => {
                self.start_library(slug).await?;
            }
            LibraryEvent::Deleted(slug) | LibraryEvent::Disabled(slug) => {
                self.stop_library(slug).await;
            }
        }
        Ok(())
    }

    /// Consume library events until shutdown or until the channel closes.
    ///
    /// A lagged receiver has missed events, so the active set is rebuilt from
    /// the catalog.
    pub async fn run(&self, mut events: broadcast::Receiver<LibraryEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            warn!(library = %event.library_slug(), error = %e, "Failed to apply library event");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Library events lagged, resyncing indexers");
                        if let Err(e) = self.resync().await {
                            warn!(error = %e, "Failed to resync indexers");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Library event loop finished");
    }

    /// Run a pass for one library now and wait for its orphan sweep.
    ///
    /// Uses the active indexer when there is one, so the usual overlap guard
    /// applies; otherwise a one-off indexer runs the pass.
    pub async fn run_now(&self, slug: &str) -> Result<Option<PassReport>, IndexerError> {
        let active = self.indexers.read().get(slug).cloned();
        let indexer = match active {
            Some(indexer) => indexer,
            None => Arc::new(LibraryIndexer::new(
                slug,
                self.ctx.clone(),
                self.shutdown.child_token(),
            )),
        };

        let report = indexer.run_now().await?;
        indexer.wait_for_sweep().await;
        Ok(report)
    }

    pub fn is_active(&self, slug: &str) -> bool {
        self.indexers.read().contains_key(slug)
    }

    /// Active indexers ordered by library slug
    pub fn status(&self) -> Vec<IndexerStatus> {
        let mut status: Vec<IndexerStatus> = self
            .indexers
            .read()
            .values()
            .map(|indexer| IndexerStatus {
                library: indexer.slug().to_string(),
                state: indexer.state(),
                scanned: indexer.scanned_count(),
            })
            .collect();
        status.sort_by(|a, b| a.library.cmp(&b.library));
        status
    }

    /// Cancel every indexer and wait, up to the shutdown timeout, for
    /// running passes and sweeps to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down library indexers");
        self.shutdown.cancel();
        self.jobs.stop();

        let indexers: Vec<Arc<LibraryIndexer>> =
            self.indexers.write().drain().map(|(_, indexer)| indexer).collect();
        for indexer in &indexers {
            indexer.stop().await;
        }

        let drained = futures::future::join_all(indexers.iter().map(|indexer| async move {
            indexer.wait_idle().await;
            indexer.wait_for_sweep().await;
        }));
        if tokio::time::timeout(self.shutdown_timeout, drained).await.is_err() {
            warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Timed out waiting for library passes to stop"
            );
        }

        if let Err(e) = self.jobs.shutdown().await {
            warn!(error = %e, "Failed to shut down job scheduler");
        }
        info!("Library indexers stopped");
    }
}
