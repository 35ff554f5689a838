use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ContactJob, JobStatus};

/// Queue receipt recorded on a freshly claimed job.
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub worker_instance: String,
}

/// Completion bookkeeping recorded on terminal transitions.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Completion instant localised to the job's own time zone, RFC 3339.
    pub user_completed_time: Option<String>,
}

/// Trait for claiming and transitioning jobs in persistent storage.
///
/// Claiming must be atomic with row-level exclusion: given two concurrent
/// claim attempts against the same eligible row, exactly one succeeds and
/// the other observes "no eligible row".
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the oldest claimable job, or `None` when the backlog is empty.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<ContactJob>>;

    /// Claim a specific job. `None` means already taken or not eligible;
    /// callers treat that as a silent skip, not an error.
    async fn claim_by_id(&self, id: Uuid, worker_id: &str) -> Result<Option<ContactJob>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactJob>>;

    async fn record_claim(&self, id: Uuid, receipt: &ClaimReceipt) -> Result<()>;

    /// Return a claimed job to the backlog untouched (lease cleared, retry
    /// count unchanged).
    async fn release(&self, id: Uuid) -> Result<()>;

    async fn mark_done(&self, id: Uuid, completion: &Completion) -> Result<ContactJob>;

    /// Distinct terminal state for targets without a reachable form.
    async fn mark_form_not_found(&self, id: Uuid, completion: &Completion) -> Result<ContactJob>;

    /// Record a failed attempt; returns the updated row so callers can see
    /// whether the retry ceiling was hit.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<ContactJob>;

    /// Reset expired leases below the retry ceiling; returns how many rows
    /// were recovered.
    async fn recover_expired(&self) -> Result<u64>;

    async fn record_contact_url(&self, id: Uuid, found_url: Option<&str>) -> Result<()>;
}

/// Postgres-backed job store. The SQL lives with the model; this type binds
/// the pool and the state-machine constants.
pub struct PgJobStore {
    pool: PgPool,
    max_retries: i32,
    lock_timeout_minutes: i64,
}

impl PgJobStore {
    pub fn new(pool: PgPool, max_retries: i32, lock_timeout_minutes: i64) -> Self {
        Self {
            pool,
            max_retries,
            lock_timeout_minutes,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next(&self, worker_id: &str) -> Result<Option<ContactJob>> {
        ContactJob::claim_next(worker_id, &self.pool).await
    }

    async fn claim_by_id(&self, id: Uuid, worker_id: &str) -> Result<Option<ContactJob>> {
        ContactJob::claim_by_id(id, worker_id, &self.pool).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactJob>> {
        ContactJob::find_by_id(id, &self.pool).await
    }

    async fn record_claim(&self, id: Uuid, receipt: &ClaimReceipt) -> Result<()> {
        ContactJob::record_claim(
            id,
            receipt.message_id.as_deref(),
            &receipt.receipt_handle,
            &receipt.worker_instance,
            &self.pool,
        )
        .await
    }

    async fn release(&self, id: Uuid) -> Result<()> {
        ContactJob::release(id, &self.pool).await
    }

    async fn mark_done(&self, id: Uuid, completion: &Completion) -> Result<ContactJob> {
        ContactJob::mark_completed(
            id,
            JobStatus::Done,
            completion.user_completed_time.as_deref(),
            &self.pool,
        )
        .await
    }

    async fn mark_form_not_found(&self, id: Uuid, completion: &Completion) -> Result<ContactJob> {
        ContactJob::mark_completed(
            id,
            JobStatus::FormNotFound,
            completion.user_completed_time.as_deref(),
            &self.pool,
        )
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<ContactJob> {
        ContactJob::mark_failed(id, error, self.max_retries, &self.pool).await
    }

    async fn recover_expired(&self) -> Result<u64> {
        ContactJob::recover_expired(self.lock_timeout_minutes, self.max_retries, &self.pool).await
    }

    async fn record_contact_url(&self, id: Uuid, found_url: Option<&str>) -> Result<()> {
        ContactJob::record_contact_url(id, found_url, &self.pool).await
    }
}
