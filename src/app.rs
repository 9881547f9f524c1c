//! Application wiring.
//!
//! Used by [main] and by integration tests to build the catalog, the event
//! bus and the indexer manager from one [Config].

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::db::seed::seed_libraries;
use crate::indexer::{IndexerContext, IndexerManager, IndexerSettings};
use crate::jobs::JobRegistry;
use crate::services::logging::LiveLog;
use crate::services::metadata::MetadataRegistry;
use crate::services::notifications::EventBus;

/// Shared application state
pub struct App {
    pub config: Arc<Config>,
    pub db: Database,
    pub events: EventBus,
    pub live_log: LiveLog,
    pub manager: Arc<IndexerManager>,
}

impl App {
    /// Open the catalog, apply the seed file and build the indexer manager
    pub async fn build(config: Config, live_log: LiveLog) -> Result<Self> {
        Self::build_with_metadata(config, live_log, MetadataRegistry::default()).await
    }

    pub async fn build_with_metadata(
        config: Config,
        live_log: LiveLog,
        metadata: MetadataRegistry,
    ) -> Result<Self> {
        let db = Database::connect(&config.database_url, config.database_max_connections).await?;
        db.migrate().await?;
        info!(database = %config.database_url, "Catalog ready");

        if let Some(path) = &config.libraries_seed_path {
            let result = seed_libraries(&db, path).await?;
            for error in &result.errors {
                warn!(error = %error, "Library seed entry rejected");
            }
        }

        let events = EventBus::default();
        let ctx = IndexerContext::new(db.clone())
            .with_settings(IndexerSettings::from(&config))
            .with_metadata(metadata)
            .with_events(events.clone());
        let jobs = JobRegistry::new().await?;
        let manager = Arc::new(IndexerManager::new(ctx, jobs, config.shutdown_timeout));

        Ok(Self {
            config: Arc::new(config),
            db,
            events,
            live_log,
            manager,
        })
    }

    /// Schedule every enabled library and follow library events until
    /// `signal` resolves, then shut the indexers down.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let library_events = self.db.subscribe_library_events();
        let active = self.manager.start().await?;
        info!(active, "Indexing daemon running");

        let manager = self.manager.clone();
        let event_loop = tokio::spawn(async move { manager.run(library_events).await });

        signal.await;
        info!("Shutdown requested");

        self.manager.shutdown().await;
        if let Err(e) = event_loop.await {
            warn!(error = %e, "Library event loop failed");
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
