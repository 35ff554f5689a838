use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use form_engine::{CaptchaSolver, DriverFactory, FormFillOrchestrator, SubmissionOutcome};

use crate::discovery::ContactPageDiscovery;
use crate::lease::LeaseManager;
use crate::models::ContactJob;
use crate::queue::{JobQueue, JobRef, QueueMessage};
use crate::schedule;
use crate::store::JobStore;

/// How often the loop sweeps for expired leases.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// Pause after a queue error before polling again.
const ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Sets a flag on SIGINT/SIGTERM. The flag is consulted between jobs only;
/// the in-flight job runs to completion inside the queue's visibility window.
pub fn spawn_shutdown_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = signal(SignalKind::terminate()).expect("signal handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received, finishing current job");
        handle.store(true, Ordering::Relaxed);
    });
    flag
}

/// One worker process: a strictly sequential receive → claim → gate →
/// fill/submit → record loop. Nothing that happens to a single job can
/// crash the loop.
pub struct Worker<S, Q> {
    store: Arc<S>,
    queue: Q,
    lease: LeaseManager<S>,
    orchestrator: FormFillOrchestrator,
    discovery: ContactPageDiscovery,
    drivers: Box<dyn DriverFactory>,
    solver: Option<Box<dyn CaptchaSolver>>,
    shutdown: Arc<AtomicBool>,
}

impl<S: JobStore, Q: JobQueue> Worker<S, Q> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        queue: Q,
        lease: LeaseManager<S>,
        orchestrator: FormFillOrchestrator,
        discovery: ContactPageDiscovery,
        drivers: Box<dyn DriverFactory>,
        solver: Option<Box<dyn CaptchaSolver>>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            queue,
            lease,
            orchestrator,
            discovery,
            drivers,
            solver,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!(worker_id = %self.lease.worker_id(), "worker started");
        let mut next_recovery = Instant::now();

        while !self.shutdown.load(Ordering::Relaxed) {
            if Instant::now() >= next_recovery {
                if let Err(err) = self.lease.recover_expired().await {
                    tracing::error!(error = %err, "lease recovery failed");
                }
                next_recovery = Instant::now() + RECOVERY_INTERVAL;
            }

            // Bounded long poll; an empty answer just loops around.
            let messages = match self.queue.receive().await {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::error!(error = %err, "queue receive failed");
                    tokio::time::sleep(ERROR_PAUSE).await;
                    continue;
                }
            };
            let Some(message) = messages.into_iter().next() else {
                tracing::debug!("no messages; polling again");
                continue;
            };

            if let Err(err) = self.handle_message(&message).await {
                tracing::error!(error = %err, "message handling failed");
            }
        }

        tracing::info!("worker exiting cleanly");
        Ok(())
    }

    pub(crate) async fn handle_message(&self, message: &QueueMessage) -> Result<()> {
        let job_ref = match JobRef::parse(&message.body) {
            Ok(job_ref) => job_ref,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed queue message");
                self.queue.delete(&message.receipt_handle).await?;
                return Ok(());
            }
        };

        // Already taken or already finished: redelivery is harmless, drop it.
        let Some(job) = self.lease.claim(job_ref.job_id, message).await? else {
            self.queue.delete(&message.receipt_handle).await?;
            return Ok(());
        };

        if !schedule::job_is_due(&job, Utc::now()) {
            // Release the claim untouched; the undeleted message comes back
            // after the visibility window and the job is re-checked then.
            self.lease.release(&job).await?;
            return Ok(());
        }

        let disposition = match self.process_job(&job).await {
            Ok(outcome) => self.lease.record_outcome(&job, &outcome).await?,
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "job processing failed");
                self.lease.fail(job.id, &err.to_string()).await?
            }
        };

        if disposition.delete_message() {
            self.queue.delete(&message.receipt_handle).await?;
        }
        Ok(())
    }

    async fn process_job(&self, job: &ContactJob) -> Result<SubmissionOutcome> {
        let form_url = self.resolve_form_url(job).await?;
        tracing::info!(job_id = %job.id, url = %form_url, "processing job");

        let driver = self
            .drivers
            .create_session()
            .await
            .map_err(|e| anyhow!("browser session: {e}"))?;
        let payload = job.payload();
        Ok(self
            .orchestrator
            .submit(driver, &form_url, &payload, self.solver.as_deref())
            .await)
    }

    /// Stored contact URL first, then discovery against the website, then
    /// the raw form/website fields.
    async fn resolve_form_url(&self, job: &ContactJob) -> Result<String> {
        if let Some(existing) = job.contact_us_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(existing.to_string());
        }

        if let Some(website) = job.website_url.as_deref().filter(|u| !u.is_empty()) {
            match self.discovery.discover(website).await {
                Ok(Some(found)) => {
                    self.store
                        .record_contact_url(job.id, Some(found.as_str()))
                        .await?;
                    return Ok(found.to_string());
                }
                Ok(None) => self.store.record_contact_url(job.id, None).await?,
                Err(err) => {
                    tracing::debug!(job_id = %job.id, error = %err, "contact page discovery failed");
                }
            }
        }

        job.form_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| job.website_url.clone().filter(|u| !u.is_empty()))
            .context("job has no target url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::{WorkerContext, LOCK_TIMEOUT_MINUTES, MAX_RETRIES};
    use crate::models::JobStatus;
    use crate::store::testing::{pending_job, InMemoryJobStore};
    use async_trait::async_trait;
    use form_engine::driver::{BrowserDriver, DriverError};
    use form_engine::OrchestratorConfig;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryQueue {
        deleted: Mutex<Vec<String>>,
    }

    impl InMemoryQueue {
        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobQueue for InMemoryQueue {
        async fn receive(&self) -> Result<Vec<QueueMessage>> {
            Ok(vec![])
        }

        async fn delete(&self, receipt_handle: &str) -> Result<()> {
            self.deleted.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }
    }

    /// No browser in unit tests; any attempt to open a session fails, which
    /// exercises the failure bookkeeping.
    struct NoBrowserFactory;

    #[async_trait]
    impl DriverFactory for NoBrowserFactory {
        async fn create_session(&self) -> Result<Box<dyn BrowserDriver>, DriverError> {
            Err(DriverError::Session("no browser available".to_string()))
        }
    }

    fn worker(store: Arc<InMemoryJobStore>) -> Worker<InMemoryJobStore, InMemoryQueue> {
        let lease = LeaseManager::new(Arc::clone(&store), WorkerContext::generate("test"));
        Worker::new(
            store,
            InMemoryQueue::default(),
            lease,
            FormFillOrchestrator::new(OrchestratorConfig::default()),
            ContactPageDiscovery::new().unwrap(),
            Box::new(NoBrowserFactory),
            None,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn message_for(id: Uuid) -> QueueMessage {
        QueueMessage {
            message_id: Some("m-1".to_string()),
            receipt_handle: "r-1".to_string(),
            body: format!(r#"{{"job_id":"{id}"}}"#),
        }
    }

    fn job_with_contact_url(id: Uuid) -> ContactJob {
        let mut job = pending_job(id);
        job.contact_us_url = Some("https://example.com/contact".to_string());
        job
    }

    #[tokio::test]
    async fn test_malformed_body_is_deleted_without_claiming() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = job_with_contact_url(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        let message = QueueMessage {
            message_id: None,
            receipt_handle: "bad-1".to_string(),
            body: "not json".to_string(),
        };
        worker.handle_message(&message).await.unwrap();

        assert_eq!(worker.queue.deleted(), vec!["bad-1".to_string()]);
        assert_eq!(store.get(id).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_redelivery_of_finished_job_is_dropped() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = job_with_contact_url(Uuid::new_v4());
        job.status = JobStatus::Done;
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        worker.handle_message(&message_for(id)).await.unwrap();

        assert_eq!(worker.queue.deleted(), vec!["r-1".to_string()]);
        assert_eq!(store.get(id).unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_not_due_job_is_released_and_message_kept() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = job_with_contact_url(Uuid::new_v4());
        job.scheduled_time = Some("2099-01-01T00:00:00".to_string());
        job.time_zone = Some("America/New_York".to_string());
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        worker.handle_message(&message_for(id)).await.unwrap();

        // Claim released untouched, message left for redelivery.
        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert!(worker.queue.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_processing_failure_requeues_and_keeps_message() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = job_with_contact_url(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        worker.handle_message(&message_for(id)).await.unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.last_error.is_some());
        // Retry scheduled: the message must stay for redelivery.
        assert!(worker.queue.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_failure_at_ceiling_is_terminal_and_deletes_message() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = job_with_contact_url(Uuid::new_v4());
        job.retry_count = MAX_RETRIES - 1;
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        worker.handle_message(&message_for(id)).await.unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, MAX_RETRIES);
        assert_eq!(worker.queue.deleted(), vec!["r-1".to_string()]);
    }

    #[tokio::test]
    async fn test_job_without_any_target_url_fails_cleanly() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = pending_job(Uuid::new_v4());
        job.form_url = None;
        job.website_url = None;
        job.contact_us_url = None;
        let id = job.id;
        store.insert(job);

        let worker = worker(Arc::clone(&store));
        worker.handle_message(&message_for(id)).await.unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.retry_count, 1);
        assert!(stored.last_error.unwrap().contains("no target url"));
    }
}
