//! Cron-driven job registry
//!
//! Maps a job name to a recurring invocation of a [ScheduledJob]. The timer is
//! `tokio-cron-scheduler`; every firing runs on its own task, so a slow or
//! failing job never delays the next tick.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A unit of recurring work.
///
/// Implementations report their own failures; the registry never retries.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    async fn execute(&self);
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("job '{0}' is not registered")]
    UnknownJob(String),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Normalize a cron expression to the seconds-first form the timer expects.
///
/// Five-field expressions get a leading `0` seconds field; six and seven field
/// expressions pass through.
pub fn normalize_cron(expr: &str) -> Result<String, SchedulerError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        0 => Err(SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason: "expression is empty".to_string(),
        }),
        n => Err(SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason: format!("expected 5 to 7 fields, got {n}"),
        }),
    }
}

struct RegisteredJob {
    id: Uuid,
    cron: String,
    job: Arc<dyn ScheduledJob>,
}

/// Named registry of recurring jobs over a single cron timer
#[derive(Clone)]
pub struct JobRegistry {
    scheduler: JobScheduler,
    jobs: Arc<Mutex<HashMap<String, RegisteredJob>>>,
    active: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    pub async fn new() -> Result<Self, SchedulerError> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicBool::new(false)),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register `job` under `name`, replacing any job already registered there
    pub async fn add_job(
        &self,
        name: &str,
        cron: &str,
        job: Arc<dyn ScheduledJob>,
    ) -> Result<(), SchedulerError> {
        let expr = normalize_cron(cron)?;

        let firing = job.clone();
        let active = self.active.clone();
        let job_name = name.to_string();
        let cron_job = Job::new_async(expr.as_str(), move |_uuid, _l| {
            let job = firing.clone();
            let active = active.clone();
            let job_name = job_name.clone();
            Box::pin(async move {
                if !active.load(Ordering::SeqCst) {
                    debug!(job = %job_name, "Scheduler paused, skipping firing");
                    return;
                }
                debug!(job = %job_name, "Running scheduled job");
                job.execute().await;
            })
        })
        .map_err(|e| SchedulerError::InvalidSchedule {
            expr: cron.to_string(),
            reason: e.to_string(),
        })?;

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.remove(name) {
            if let Err(e) = self.scheduler.remove(&previous.id).await {
                warn!(job = %name, error = %e, "Failed to remove replaced job");
            }
        }

        let id = self.scheduler.add(cron_job).await?;
        jobs.insert(
            name.to_string(),
            RegisteredJob {
                id,
                cron: expr.clone(),
                job,
            },
        );

        info!(job = %name, cron = %expr, "Registered scheduled job");
        Ok(())
    }

    /// Remove a job; unknown names are ignored
    pub async fn remove_job(&self, name: &str) -> Result<(), SchedulerError> {
        let removed = self.jobs.lock().await.remove(name);
        if let Some(job) = removed {
            self.scheduler.remove(&job.id).await?;
            info!(job = %name, "Removed scheduled job");
        }
        Ok(())
    }

    /// Re-register an existing job with a new cron expression
    pub async fn reload(&self, name: &str, cron: &str) -> Result<(), SchedulerError> {
        let job = {
            let jobs = self.jobs.lock().await;
            jobs.get(name)
                .map(|registered| registered.job.clone())
                .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?
        };
        self.add_job(name, cron, job).await
    }

    /// Start (or resume) firing registered jobs
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.scheduler.start().await?;
            info!("Job scheduler started");
        }
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!("Job scheduler active");
        }
        Ok(())
    }

    /// Pause firings. Registrations are kept and resume on [`JobRegistry::start`].
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Job scheduler paused");
        }
    }

    /// Tear down the timer. The registry cannot be restarted afterwards.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.stop();
        if self.started.swap(false, Ordering::SeqCst) {
            let mut scheduler = self.scheduler.clone();
            scheduler.shutdown().await?;
            info!("Job scheduler shut down");
        }
        Ok(())
    }

    pub async fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Normalized cron expression of a registered job
    pub async fn cron_for(&self, name: &str) -> Option<String> {
        self.jobs.lock().await.get(name).map(|job| job.cron.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        async fn execute(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingJob {
        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/5 * * * *").unwrap(), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 0 3 * * *").unwrap(), "0 0 3 * * *");
        assert_eq!(normalize_cron("  0  12 * * *  ").unwrap(), "0 0 12 * * *");
        assert_matches!(
            normalize_cron(""),
            Err(SchedulerError::InvalidSchedule { .. })
        );
        assert_matches!(
            normalize_cron("* *"),
            Err(SchedulerError::InvalidSchedule { .. })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_cron_rejected() {
        let registry = JobRegistry::new().await.unwrap();
        let job = Arc::new(CountingJob::default());

        let result = registry.add_job("bad", "not a cron at all", job).await;
        assert_matches!(result, Err(SchedulerError::InvalidSchedule { .. }));
        assert!(registry.job_names().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_replaces_and_remove_is_idempotent() {
        let registry = JobRegistry::new().await.unwrap();
        let job = Arc::new(CountingJob::default());

        registry.add_job("library:manga", "*/5 * * * *", job.clone()).await.unwrap();
        registry.add_job("library:manga", "0 3 * * *", job.clone()).await.unwrap();

        assert_eq!(registry.job_names().await, vec!["library:manga".to_string()]);
        assert_eq!(
            registry.cron_for("library:manga").await.as_deref(),
            Some("0 0 3 * * *")
        );

        registry.reload("library:manga", "*/10 * * * *").await.unwrap();
        assert_eq!(
            registry.cron_for("library:manga").await.as_deref(),
            Some("0 */10 * * * *")
        );
        assert_matches!(
            registry.reload("library:none", "* * * * *").await,
            Err(SchedulerError::UnknownJob(_))
        );

        registry.remove_job("library:manga").await.unwrap();
        registry.remove_job("library:manga").await.unwrap();
        assert!(registry.job_names().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_job_fires_and_pauses() {
        let registry = JobRegistry::new().await.unwrap();
        let job = Arc::new(CountingJob::default());
        registry.add_job("tick", "* * * * * *", job.clone()).await.unwrap();
        registry.start().await.unwrap();
        registry.start().await.unwrap();

        let mut waited = 0;
        while job.runs() == 0 && waited < 50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            waited += 1;
        }
        assert!(job.runs() >= 1);

        registry.stop();
        registry.stop();
        assert!(!registry.is_active());
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let paused_at = job.runs();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(job.runs(), paused_at);

        registry.shutdown().await.unwrap();
    }
}
