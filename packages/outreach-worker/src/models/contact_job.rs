use anyhow::Result;
use chrono::{DateTime, Utc};
use form_engine::FormPayload;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Job status along the lease state machine.
///
/// `Queued` is a legacy alias of `Pending` kept for rows written by older
/// pipelines; it reads and claims identically and is never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contact_job_status")]
pub enum JobStatus {
    #[sqlx(rename = "PENDING")]
    Pending,
    #[sqlx(rename = "QUEUED")]
    Queued,
    #[sqlx(rename = "PROCESSING")]
    Processing,
    #[sqlx(rename = "DONE")]
    Done,
    #[sqlx(rename = "FAILED")]
    Failed,
    #[sqlx(rename = "FORM_NOT_FOUND")]
    FormNotFound,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::FormNotFound)
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Queued)
    }
}

/// One outreach-target record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub scheduled_time: Option<String>,
    pub time_zone: Option<String>,
    pub form_url: Option<String>,
    pub website_url: Option<String>,
    pub contact_us_url: Option<String>,
    pub scraping_status: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub personalized_message: Option<String>,
    pub campaign_name: Option<String>,
    pub sqs_message_id: Option<String>,
    pub sqs_receipt_handle: Option<String>,
    pub worker_instance: Option<String>,
    pub worker_started_at: Option<DateTime<Utc>>,
    pub worker_completed_at: Option<DateTime<Utc>>,
    pub submission_time: Option<DateTime<Utc>>,
    pub user_completed_time: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactJob {
    /// Form payload assembled from this record's composition fields.
    pub fn payload(&self) -> FormPayload {
        FormPayload::from_contact_fields(
            self.full_name.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.company_name.as_deref(),
            self.email_address.as_deref(),
            self.phone_number.as_deref(),
            self.website_url.as_deref(),
            self.personalized_message.as_deref(),
            self.campaign_name.as_deref(),
        )
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl ContactJob {
    /// Find job by ID.
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, ContactJob>("SELECT * FROM contact_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }

    /// Atomically claim the oldest claimable job.
    ///
    /// Row-level exclusion, not advisory locking: two workers racing for the
    /// same row must never both succeed.
    pub async fn claim_next(worker_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, ContactJob>(
            r#"
            UPDATE contact_jobs
            SET status = 'PROCESSING',
                worker_id = $1,
                locked_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM contact_jobs
                WHERE status IN ('PENDING', 'QUEUED')
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    /// Atomically claim one specific job if it is still claimable.
    ///
    /// Returns `None` when the row is already taken or not eligible; callers
    /// treat that as a silent skip.
    pub async fn claim_by_id(id: Uuid, worker_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, ContactJob>(
            r#"
            UPDATE contact_jobs
            SET status = 'PROCESSING',
                worker_id = $2,
                locked_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM contact_jobs
                WHERE id = $1 AND status IN ('PENDING', 'QUEUED')
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    /// Release a claim untouched: back to PENDING, lease cleared, retries
    /// unchanged. Used for claimed jobs that turn out not to be due yet.
    pub async fn release(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contact_jobs
            SET status = 'PENDING',
                worker_id = NULL,
                locked_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record queue receipt and worker identity on a freshly claimed job.
    pub async fn record_claim(
        id: Uuid,
        message_id: Option<&str>,
        receipt_handle: &str,
        worker_instance: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contact_jobs
            SET sqs_message_id = $2,
                sqs_receipt_handle = $3,
                worker_instance = $4,
                worker_started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(message_id)
        .bind(receipt_handle)
        .bind(worker_instance)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal transition with completion bookkeeping and lease release.
    pub async fn mark_completed(
        id: Uuid,
        status: JobStatus,
        user_completed_time: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let job = sqlx::query_as::<_, ContactJob>(
            r#"
            UPDATE contact_jobs
            SET status = $2,
                worker_id = NULL,
                locked_at = NULL,
                worker_completed_at = NOW(),
                submission_time = NOW(),
                user_completed_time = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(user_completed_time)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Record a failed attempt: bump the retry counter, store the error,
    /// clear the lease, and land on FAILED once the ceiling is met.
    pub async fn mark_failed(id: Uuid, error: &str, max_retries: i32, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, ContactJob>(
            r#"
            UPDATE contact_jobs
            SET retry_count = retry_count + 1,
                last_error = $2,
                status = CASE
                    WHEN retry_count + 1 >= $3 THEN 'FAILED'::contact_job_status
                    ELSE 'PENDING'::contact_job_status
                END,
                worker_id = NULL,
                locked_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(max_retries)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Return expired leases to the backlog. Jobs at the retry ceiling are
    /// left untouched.
    pub async fn recover_expired(
        lock_timeout_minutes: i64,
        max_retries: i32,
        pool: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE contact_jobs
            SET status = 'PENDING',
                worker_id = NULL,
                locked_at = NULL,
                retry_count = retry_count + 1,
                updated_at = NOW()
            WHERE status = 'PROCESSING'
              AND locked_at < NOW() - ($1 * INTERVAL '1 minute')
              AND retry_count < $2
            "#,
        )
        .bind(lock_timeout_minutes)
        .bind(max_retries)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Persist the result of contact-page discovery.
    pub async fn record_contact_url(id: Uuid, found_url: Option<&str>, pool: &PgPool) -> Result<()> {
        match found_url {
            Some(url) => {
                sqlx::query(
                    r#"
                    UPDATE contact_jobs
                    SET contact_us_url = $2,
                        scraping_status = 'DONE',
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(url)
                .execute(pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE contact_jobs
                    SET scraping_status = 'NOT_FOUND',
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }
}
