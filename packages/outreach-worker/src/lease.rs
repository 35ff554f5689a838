use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use form_engine::SubmissionOutcome;
use uuid::Uuid;

use crate::models::{ContactJob, JobStatus};
use crate::queue::QueueMessage;
use crate::store::{ClaimReceipt, Completion, JobStore};

/// Total attempts before a job is terminally failed.
pub const MAX_RETRIES: i32 = 3;

/// Lease duration; expired leases are reclaimable by any worker.
pub const LOCK_TIMEOUT_MINUTES: i64 = 15;

/// Explicit worker identity, passed in at construction rather than living in
/// process-global state, so several simulated workers can coexist in tests.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: String,
    pub instance: String,
}

impl WorkerContext {
    pub fn generate(instance: impl Into<String>) -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            instance: instance.into(),
        }
    }
}

/// What recording an outcome did to the job, which decides the fate of the
/// queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Done,
    FormNotFound,
    /// Requeued for another attempt; the queue message must be left to
    /// redeliver.
    RetryScheduled,
    FailedTerminal,
}

impl Disposition {
    /// Terminal dispositions delete their queue message; a scheduled retry
    /// keeps it so the visibility window redelivers.
    pub fn delete_message(&self) -> bool {
        !matches!(self, Disposition::RetryScheduled)
    }
}

/// The job lease state machine: claims, releases, completions and recovery,
/// all through a [`JobStore`].
pub struct LeaseManager<S> {
    store: Arc<S>,
    ctx: WorkerContext,
}

impl<S: JobStore> LeaseManager<S> {
    pub fn new(store: Arc<S>, ctx: WorkerContext) -> Self {
        Self { store, ctx }
    }

    pub fn worker_id(&self) -> &str {
        &self.ctx.worker_id
    }

    /// Claim the job referenced by a queue message. `None` means the row was
    /// already taken or is no longer eligible; redelivery of an
    /// already-finished job lands here and is silently skipped.
    pub async fn claim(&self, job_id: Uuid, message: &QueueMessage) -> Result<Option<ContactJob>> {
        let Some(job) = self.store.claim_by_id(job_id, &self.ctx.worker_id).await? else {
            tracing::debug!(job_id = %job_id, "claim skipped: not eligible or already taken");
            return Ok(None);
        };

        self.store
            .record_claim(
                job.id,
                &ClaimReceipt {
                    message_id: message.message_id.clone(),
                    receipt_handle: message.receipt_handle.clone(),
                    worker_instance: self.ctx.instance.clone(),
                },
            )
            .await?;

        tracing::info!(job_id = %job.id, worker_id = %self.ctx.worker_id, "job claimed");
        Ok(Some(job))
    }

    /// Claim the oldest eligible job from the backlog directly.
    pub async fn claim_next(&self) -> Result<Option<ContactJob>> {
        self.store.claim_next(&self.ctx.worker_id).await
    }

    /// Return a claimed-but-not-due job to the backlog untouched.
    pub async fn release(&self, job: &ContactJob) -> Result<()> {
        self.store.release(job.id).await?;
        tracing::info!(job_id = %job.id, "claim released");
        Ok(())
    }

    /// Fold a structured attempt outcome into the state machine.
    pub async fn record_outcome(
        &self,
        job: &ContactJob,
        outcome: &SubmissionOutcome,
    ) -> Result<Disposition> {
        if outcome.success {
            let completion = self.completion_for(job);
            self.store.mark_done(job.id, &completion).await?;
            tracing::info!(job_id = %job.id, "job done");
            return Ok(Disposition::Done);
        }

        if outcome.form_not_found() {
            let completion = self.completion_for(job);
            self.store.mark_form_not_found(job.id, &completion).await?;
            tracing::info!(job_id = %job.id, "no form on target; job closed");
            return Ok(Disposition::FormNotFound);
        }

        let error = outcome.error.as_deref().unwrap_or("submission failed");
        self.fail(job.id, error).await
    }

    /// Record an explicit failure; returns whether the job is terminally
    /// failed or requeued.
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<Disposition> {
        let updated = self.store.mark_failed(job_id, error).await?;
        if updated.status == JobStatus::Failed {
            tracing::warn!(
                job_id = %job_id,
                retry_count = updated.retry_count,
                error = %error,
                "job terminally failed"
            );
            Ok(Disposition::FailedTerminal)
        } else {
            tracing::info!(
                job_id = %job_id,
                retry_count = updated.retry_count,
                error = %error,
                "job requeued for retry"
            );
            Ok(Disposition::RetryScheduled)
        }
    }

    /// Reset expired leases back to the backlog.
    pub async fn recover_expired(&self) -> Result<u64> {
        let recovered = self.store.recover_expired().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "expired leases recovered");
        }
        Ok(recovered)
    }

    /// Completion bookkeeping, including the completion instant localised to
    /// the job's own time zone.
    fn completion_for(&self, job: &ContactJob) -> Completion {
        let user_completed_time = job
            .time_zone
            .as_deref()
            .and_then(|name| match name.parse::<Tz>() {
                Ok(tz) => Some(Utc::now().with_timezone(&tz).to_rfc3339()),
                Err(_) => {
                    tracing::info!(job_id = %job.id, time_zone = %name, "cannot localise completion time");
                    None
                }
            });
        Completion {
            user_completed_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{pending_job, InMemoryJobStore};
    use chrono::Duration;
    use form_engine::{FillReport, OutcomeKind};

    fn manager(store: Arc<InMemoryJobStore>) -> LeaseManager<InMemoryJobStore> {
        LeaseManager::new(store, WorkerContext::generate("test-instance"))
    }

    fn message() -> QueueMessage {
        QueueMessage {
            message_id: Some("m-1".to_string()),
            receipt_handle: "r-1".to_string(),
            body: String::new(),
        }
    }

    fn outcome(success: bool, kind: OutcomeKind) -> SubmissionOutcome {
        SubmissionOutcome {
            success,
            kind,
            error: (!success).then(|| "boom".to_string()),
            evidence: String::new(),
            filled: FillReport::default(),
            submission_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = pending_job(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let a = manager(Arc::clone(&store));
        let b = manager(Arc::clone(&store));
        let msg_a = message();
        let msg_b = message();
        let (first, second) = tokio::join!(a.claim(id, &msg_a), b.claim(id, &msg_b));
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(
            first.is_some() ^ second.is_some(),
            "exactly one claim must win"
        );
        let claimed = store.get(id).unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.worker_id.is_some());
        assert!(claimed.locked_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_is_idempotent_against_redelivery() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = pending_job(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        let claimed = lease.claim(id, &message()).await.unwrap().unwrap();
        lease
            .record_outcome(&claimed, &outcome(true, OutcomeKind::Attempted))
            .await
            .unwrap();

        // Redelivered message for a DONE job: silent skip.
        assert!(lease.claim(id, &message()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retries_are_monotonic_to_terminal_failure() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = pending_job(Uuid::new_v4());
        let id = job.id;
        store.insert(job);
        let lease = manager(Arc::clone(&store));

        for attempt in 1..=MAX_RETRIES {
            let claimed = lease.claim(id, &message()).await.unwrap().unwrap();
            let disposition = lease
                .record_outcome(&claimed, &outcome(false, OutcomeKind::Attempted))
                .await
                .unwrap();
            let stored = store.get(id).unwrap();
            assert_eq!(stored.retry_count, attempt);
            if attempt < MAX_RETRIES {
                assert_eq!(disposition, Disposition::RetryScheduled);
                assert!(!disposition.delete_message());
                assert_eq!(stored.status, JobStatus::Pending);
            } else {
                assert_eq!(disposition, Disposition::FailedTerminal);
                assert!(disposition.delete_message());
                assert_eq!(stored.status, JobStatus::Failed);
            }
        }

        // A further claim attempt never succeeds.
        assert!(lease.claim(id, &message()).await.unwrap().is_none());
        assert!(lease.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_recovered_exactly_once() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = pending_job(Uuid::new_v4());
        let id = job.id;
        job.status = JobStatus::Processing;
        job.worker_id = Some("crashed-worker".to_string());
        job.locked_at = Some(Utc::now() - Duration::minutes(LOCK_TIMEOUT_MINUTES + 1));
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        assert_eq!(lease.recover_expired().await.unwrap(), 1);

        let recovered = store.get(id).unwrap();
        assert_eq!(recovered.status, JobStatus::Pending);
        assert_eq!(recovered.retry_count, 1);
        assert!(recovered.worker_id.is_none());
        assert!(recovered.locked_at.is_none());

        // Nothing left to recover.
        assert_eq!(lease.recover_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_lease_is_not_recovered() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = pending_job(Uuid::new_v4());
        job.status = JobStatus::Processing;
        job.worker_id = Some("busy-worker".to_string());
        job.locked_at = Some(Utc::now());
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        assert_eq!(lease.recover_expired().await.unwrap(), 0);
        assert_eq!(store.get(id).unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_job_at_ceiling_is_left_untouched_by_recovery() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = pending_job(Uuid::new_v4());
        job.status = JobStatus::Processing;
        job.retry_count = MAX_RETRIES;
        job.locked_at = Some(Utc::now() - Duration::minutes(LOCK_TIMEOUT_MINUTES * 2));
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        assert_eq!(lease.recover_expired().await.unwrap(), 0);
        let untouched = store.get(id).unwrap();
        assert_eq!(untouched.status, JobStatus::Processing);
        assert_eq!(untouched.retry_count, MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_form_not_found_is_a_distinct_terminal_state() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = pending_job(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        let claimed = lease.claim(id, &message()).await.unwrap().unwrap();
        let disposition = lease
            .record_outcome(&claimed, &outcome(false, OutcomeKind::FormNotFound))
            .await
            .unwrap();

        assert_eq!(disposition, Disposition::FormNotFound);
        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::FormNotFound);
        // Not a generic failure: the retry counter is untouched.
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn test_done_records_localised_completion_time() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let mut job = pending_job(Uuid::new_v4());
        job.time_zone = Some("America/New_York".to_string());
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        let claimed = lease.claim(id, &message()).await.unwrap().unwrap();
        lease
            .record_outcome(&claimed, &outcome(true, OutcomeKind::Attempted))
            .await
            .unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::Done);
        let localised = stored.user_completed_time.expect("localised time recorded");
        assert!(localised.contains("-04:00") || localised.contains("-05:00"));
        assert!(stored.worker_id.is_none());
        assert!(stored.locked_at.is_none());
    }

    #[tokio::test]
    async fn test_release_returns_job_untouched() {
        let store = Arc::new(InMemoryJobStore::new(MAX_RETRIES, LOCK_TIMEOUT_MINUTES));
        let job = pending_job(Uuid::new_v4());
        let id = job.id;
        store.insert(job);

        let lease = manager(Arc::clone(&store));
        let claimed = lease.claim(id, &message()).await.unwrap().unwrap();
        lease.release(&claimed).await.unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert!(stored.worker_id.is_none());
        assert!(stored.locked_at.is_none());
    }
}
