use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crawl::ProfileCrawler;
use crate::error::AppError;
use crate::job::{Job, JobStatus, JobType, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::models::Profile;
use crate::producer::Producer;
use crate::traits::{ParcelEngine, ProfileStore};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    ProducerRan {
        queued: usize,
    },
    Polling,
    JobClaimed {
        job: &'a Job,
    },
    JobCompleted {
        job_id: Uuid,
        duration: Duration,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::ProducerRan { queued } => {
                tracing::debug!(%queued, "Producer scan finished");
            }
            WorkerEvent::Polling => {
                tracing::trace!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    domain = ?job.domain,
                    retries = job.retries,
                    "Job claimed"
                );
            }
            WorkerEvent::JobCompleted { job_id, duration } => {
                tracing::info!(%job_id, duration_ms = duration.as_millis() as u64, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Executes one leased job. Any `Err` is routed to `JobQueue::fail`.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &Job) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Routes jobs to the crawler or the parcel engine by type.
#[derive(Clone)]
pub struct JobDispatcher<C, PE> {
    crawler: C,
    parcels: PE,
    actor_id: String,
}

impl<C: ProfileCrawler, PE: ParcelEngine> JobDispatcher<C, PE> {
    pub fn new(crawler: C, parcels: PE, actor_id: impl Into<String>) -> Self {
        Self {
            crawler,
            parcels,
            actor_id: actor_id.into(),
        }
    }
}

impl<C: ProfileCrawler, PE: ParcelEngine> JobHandler for JobDispatcher<C, PE> {
    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        match &job.job_type {
            JobType::CrawlProfile => {
                let profile: Profile = serde_json::from_value(job.payload.clone())
                    .map_err(|e| AppError::InvalidPayload(format!("crawl_profile: {e}")))?;
                let summary = self.crawler.crawl(&profile, &self.actor_id).await?;
                tracing::info!(
                    job_id = %job.id,
                    profile = %profile.name,
                    connector = ?summary.connector,
                    relevant = summary.relevant,
                    stored = summary.stored,
                    duplicates = summary.duplicates,
                    "Profile crawled"
                );
                Ok(())
            }
            JobType::CalculateParcel => {
                let payload = job.parcel_payload()?;
                let parcel = self
                    .parcels
                    .compute_virtual_parcel(payload.lat, payload.lon)
                    .await?;
                tracing::info!(
                    job_id = %job.id,
                    lat = payload.lat,
                    lon = payload.lon,
                    ?parcel,
                    "Virtual parcel computed"
                );
                Ok(())
            }
            JobType::Other(kind) => Err(AppError::InvalidPayload(format!(
                "unknown job type: {kind}"
            ))),
        }
    }
}

/// Worker loop: a producer tick plus a consumer that leases one job at a time.
pub struct WorkerService<Q, H, P> {
    queue: Q,
    handler: H,
    producer: Producer<Q, P>,
    config: WorkerConfig,
}

impl<Q, H, P> WorkerService<Q, H, P>
where
    Q: JobQueue,
    H: JobHandler,
    P: ProfileStore,
{
    pub fn new(queue: Q, handler: H, profiles: P, config: WorkerConfig) -> Self {
        Self {
            producer: Producer::new(queue.clone(), profiles),
            queue,
            handler,
            config,
        }
    }

    pub fn with_producer(mut self, producer: Producer<Q, P>) -> Self {
        self.producer = producer;
        self
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        self.run_producer(reporter).await;
        let mut last_producer_run = Instant::now();

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            if last_producer_run.elapsed() >= self.config.producer_interval {
                self.run_producer(reporter).await;
                last_producer_run = Instant::now();
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.fetch_next(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch next job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: hand leased jobs back without consuming a retry
        let released = match self.queue.release_worker_jobs(&self.config.worker_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Failed to release jobs on shutdown");
                0
            }
        };

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn run_producer<WR: WorkerReporter>(&self, reporter: &WR) {
        match self.producer.run_once().await {
            Ok(queued) => reporter.report(WorkerEvent::ProducerRan { queued }),
            Err(e) => tracing::error!(error = %e, "Producer scan failed"),
        }
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &Job, reporter: &WR) {
        let started = Instant::now();

        // A panicking job is failed like any other error instead of taking
        // the loop down with its lease still held.
        let result = match AssertUnwindSafe(self.handler.handle(job))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(job_id = %job.id, panic = %message, "Job handler panicked");
                Err(AppError::Generic(format!("job panicked: {message}")))
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.queue.complete(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                    return;
                }
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    duration: started.elapsed(),
                });
            }
            Err(err) => {
                let error_msg = err.to_string();
                let outcome = self.queue.fail(job.id, &error_msg).await;
                let will_retry = match outcome {
                    Ok(status) => status == Some(JobStatus::Pending),
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                        false
                    }
                };
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry,
                });
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
