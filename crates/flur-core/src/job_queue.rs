use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::job::{Job, JobStatus, NewJob};

/// Persistent, lease-based queue shared by every worker process.
///
/// Implementations must claim atomically (`SELECT ... FOR UPDATE SKIP LOCKED`
/// or equivalent) so that no two workers receive the same job and no two
/// jobs for the same domain are processing at once.
pub trait JobQueue: Send + Sync + Clone {
    /// Insert a pending job. Callers log and swallow the error.
    fn push(&self, job: NewJob) -> impl Future<Output = Result<Job, AppError>> + Send;

    /// Atomically lease the oldest claimable job for `worker_id`.
    ///
    /// Returns `None` if nothing is claimable right now.
    fn fetch_next(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    /// Mark a job completed. Idempotent.
    fn complete(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Record a failure and apply the retry law.
    ///
    /// Returns the status the job ended up in (`pending` or `dead`), or
    /// `None` if the job is unknown or already terminal.
    fn fail(
        &self,
        job_id: Uuid,
        message: &str,
    ) -> impl Future<Output = Result<Option<JobStatus>, AppError>> + Send;

    fn get_job(&self, job_id: Uuid) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Whether a pending or processing `crawl_profile` job exists for the profile.
    fn has_open_job_for_profile(
        &self,
        profile_id: Uuid,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Return all processing jobs held by a worker to pending (graceful
    /// shutdown). Does not consume a retry.
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
