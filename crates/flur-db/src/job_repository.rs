use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use flur_core::error::AppError;
use flur_core::job::{DEFAULT_MAX_RETRIES, Job, JobStatus, JobType, NewJob};
use flur_core::job_queue::JobQueue;

/// Leases older than this are treated as abandoned by a dead worker.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// PostgreSQL-backed job queue on the `crawler_jobs` table.
///
/// Claiming goes through the `fetch_next_job` function, which enforces the
/// one-processing-job-per-domain rule across every worker process and fails
/// leases that outlived `lease_timeout`.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: Pool<Postgres>,
    lease_timeout: Duration,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }

    /// Must exceed the longest expected job, or live jobs get re-leased.
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    job_type: String,
    payload: serde_json::Value,
    status: String,
    domain: Option<String>,
    worker_id: Option<String>,
    retries: i32,
    max_retries: i32,
    error_log: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            job_type: JobType::from(row.job_type.as_str()),
            payload: row.payload,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            domain: row.domain,
            worker_id: row.worker_id,
            retries: row.retries.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            error_log: row.error_log,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

impl JobQueue for PgJobQueue {
    async fn push(&self, request: NewJob) -> Result<Job, AppError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO crawler_jobs (type, payload, domain, max_retries)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.job_type.as_str())
        .bind(&request.payload)
        .bind(&request.domain)
        .bind(request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES) as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    async fn fetch_next(&self, worker_id: &str) -> Result<Option<Job>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"SELECT * FROM fetch_next_job($1, make_interval(secs => $2))"#,
        )
        .bind(worker_id)
        .bind(self.lease_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE crawler_jobs
            SET status = 'completed', completed_at = COALESCE(completed_at, NOW())
            WHERE id = $1 AND status <> 'dead'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> Result<Option<JobStatus>, AppError> {
        // Right-hand sides see the pre-update row, so `retries + 1` is the new count.
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE crawler_jobs
            SET
                retries = retries + 1,
                status = CASE WHEN retries + 1 >= max_retries THEN 'dead' ELSE 'pending' END,
                worker_id = CASE WHEN retries + 1 >= max_retries THEN worker_id ELSE NULL END,
                started_at = CASE WHEN retries + 1 >= max_retries THEN started_at ELSE NULL END,
                completed_at = CASE WHEN retries + 1 >= max_retries THEN NOW() ELSE completed_at END,
                error_log = concat_ws(
                    E'\n',
                    NULLIF(error_log, ''),
                    format(
                        '[%s] [Retry %s] %s',
                        to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"'),
                        retries + 1,
                        $2::text
                    )
                )
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING status
            "#,
        )
        .bind(job_id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(status.map(|s| s.parse().unwrap_or(JobStatus::Pending)))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(r#"SELECT * FROM crawler_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM crawler_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }

    async fn has_open_job_for_profile(&self, profile_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM crawler_jobs
                WHERE type = 'crawl_profile'
                  AND status IN ('pending', 'processing')
                  AND payload @> jsonb_build_object('id', $1::text)
            )
            "#,
        )
        .bind(profile_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawler_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL
            WHERE worker_id = $1 AND status = 'processing'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
