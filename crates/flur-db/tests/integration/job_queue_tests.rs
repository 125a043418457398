use flur_core::job::{JobStatus, JobType, NewJob};
use flur_core::job_queue::JobQueue;
use flur_db::PgJobQueue;
use uuid::Uuid;

use crate::integration::common::setup_test_db;

fn crawl_job(domain: &str) -> NewJob {
    NewJob::new(
        JobType::CrawlProfile,
        serde_json::json!({"id": Uuid::new_v4().to_string(), "name": "Musterstadt"}),
    )
    .with_domain(domain)
}

#[tokio::test]
async fn push_sets_defaults() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let job = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();

    assert_eq!(job.job_type, JobType::CrawlProfile);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.domain.as_deref(), Some("ris.musterstadt.de"));
    assert_eq!(job.retries, 0);
    assert_eq!(job.max_retries, 3);
    assert!(job.worker_id.is_none());
    assert!(job.error_log.is_none());

    let custom = queue
        .push(crawl_job("ris.beispielheim.de").with_max_retries(5))
        .await
        .unwrap();
    assert_eq!(custom.max_retries, 5);
}

#[tokio::test]
async fn fetch_next_leases_job() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    assert!(queue.fetch_next("worker-1").await.unwrap().is_none());

    let pushed = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    let claimed = queue
        .fetch_next("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.id, pushed.id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());

    // Leased jobs are not handed out twice.
    assert!(queue.fetch_next("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn one_processing_job_per_domain() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.push(crawl_job("ris.beispielheim.de")).await.unwrap();

    let first = queue.fetch_next("worker-1").await.unwrap().unwrap();
    let second = queue.fetch_next("worker-2").await.unwrap().unwrap();
    assert_ne!(first.domain, second.domain);

    // The remaining job shares a domain with a processing one.
    assert!(queue.fetch_next("worker-3").await.unwrap().is_none());

    let busy_domain = if first.domain.as_deref() == Some("ris.musterstadt.de") {
        first.id
    } else {
        second.id
    };
    queue.complete(busy_domain).await.unwrap();

    let third = queue.fetch_next("worker-3").await.unwrap().unwrap();
    assert_eq!(third.domain.as_deref(), Some("ris.musterstadt.de"));
}

#[tokio::test]
async fn concurrent_fetch_respects_domain_exclusion() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    for _ in 0..5 {
        queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    }

    let claims = futures::future::join_all((0..8).map(|i| {
        let queue = queue.clone();
        async move { queue.fetch_next(&format!("worker-{i}")).await.unwrap() }
    }))
    .await;

    let claimed = claims.iter().filter(|c| c.is_some()).count();
    assert_eq!(claimed, 1);
    assert_eq!(queue.count_by_status(JobStatus::Processing).await.unwrap(), 1);
    assert_eq!(queue.count_by_status(JobStatus::Pending).await.unwrap(), 4);
}

#[tokio::test]
async fn jobs_without_domain_are_not_serialized() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let parcel = || {
        NewJob::new(
            JobType::CalculateParcel,
            serde_json::json!({"lat": 50.1, "lon": 8.6}),
        )
    };
    queue.push(parcel()).await.unwrap();
    queue.push(parcel()).await.unwrap();

    assert!(queue.fetch_next("worker-1").await.unwrap().is_some());
    assert!(queue.fetch_next("worker-2").await.unwrap().is_some());
}

#[tokio::test]
async fn retry_law_ends_in_dead_letter() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let job = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();

    for attempt in 1..=3u32 {
        let claimed = queue.fetch_next("worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);

        let status = queue.fail(job.id, "connection reset").await.unwrap();
        let stored = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.retries, attempt);

        if attempt < 3 {
            assert_eq!(status, Some(JobStatus::Pending));
            assert_eq!(stored.status, JobStatus::Pending);
            assert!(stored.worker_id.is_none());
            assert!(stored.started_at.is_none());
        } else {
            assert_eq!(status, Some(JobStatus::Dead));
            assert_eq!(stored.status, JobStatus::Dead);
            assert!(stored.completed_at.is_some());
        }
        // The domain survives retries.
        assert_eq!(stored.domain.as_deref(), Some("ris.musterstadt.de"));
    }

    let dead = queue.get_job(job.id).await.unwrap().unwrap();
    let log = dead.error_log.unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("[Retry 1] connection reset"));
    assert!(lines[2].contains("[Retry 3] connection reset"));

    // Dead jobs are never claimed, failed again or completed.
    assert!(queue.fetch_next("worker-1").await.unwrap().is_none());
    assert_eq!(queue.fail(job.id, "again").await.unwrap(), None);
    queue.complete(job.id).await.unwrap();
    assert_eq!(
        queue.get_job(job.id).await.unwrap().unwrap().status,
        JobStatus::Dead
    );
    assert_eq!(queue.count_by_status(JobStatus::Dead).await.unwrap(), 1);
}

#[tokio::test]
async fn complete_is_terminal_and_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let job = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.fetch_next("worker-1").await.unwrap().unwrap();
    queue.fail(job.id, "timeout").await.unwrap();
    queue.fetch_next("worker-1").await.unwrap().unwrap();

    queue.complete(job.id).await.unwrap();
    let first = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.retries, 1);

    queue.complete(job.id).await.unwrap();
    let second = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.completed_at, first.completed_at);

    assert_eq!(queue.fail(job.id, "late failure").await.unwrap(), None);
    assert!(queue.fetch_next("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn release_returns_jobs_without_consuming_retries() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.push(crawl_job("ris.beispielheim.de")).await.unwrap();
    queue.push(crawl_job("ris.anderswo.de")).await.unwrap();

    let a = queue.fetch_next("worker-1").await.unwrap().unwrap();
    let b = queue.fetch_next("worker-1").await.unwrap().unwrap();
    let other = queue.fetch_next("worker-2").await.unwrap().unwrap();

    let released = queue.release_worker_jobs("worker-1").await.unwrap();
    assert_eq!(released, 2);

    for id in [a.id, b.id] {
        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 0);
        assert!(job.worker_id.is_none());
    }
    let untouched = queue.get_job(other.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, JobStatus::Processing);

    assert_eq!(queue.release_worker_jobs("worker-1").await.unwrap(), 0);
}

#[tokio::test]
async fn open_job_lookup_by_profile() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let profile_id = Uuid::new_v4();
    assert!(!queue.has_open_job_for_profile(profile_id).await.unwrap());

    let job = queue
        .push(
            NewJob::new(
                JobType::CrawlProfile,
                serde_json::json!({"id": profile_id.to_string(), "name": "Musterstadt"}),
            )
            .with_domain("ris.musterstadt.de"),
        )
        .await
        .unwrap();
    assert!(queue.has_open_job_for_profile(profile_id).await.unwrap());

    queue.fetch_next("worker-1").await.unwrap().unwrap();
    assert!(queue.has_open_job_for_profile(profile_id).await.unwrap());

    queue.complete(job.id).await.unwrap();
    assert!(!queue.has_open_job_for_profile(profile_id).await.unwrap());
}

#[tokio::test]
async fn unknown_job_type_round_trips() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool);

    let job = queue
        .push(NewJob::new(
            JobType::Other("send_digest".into()),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    let stored = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.job_type, JobType::Other("send_digest".into()));
}

async fn backdate_lease(pool: &sqlx::PgPool, job_id: Uuid) {
    sqlx::query(
        "UPDATE crawler_jobs SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn expired_lease_is_reclaimed_with_a_retry() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool.clone());

    let job = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.fetch_next("worker-1").await.unwrap().unwrap();

    // A live lease holds the domain.
    assert!(queue.fetch_next("worker-2").await.unwrap().is_none());

    // worker-1 died without releasing its lease.
    backdate_lease(&pool, job.id).await;

    let reclaimed = queue.fetch_next("worker-2").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.worker_id.as_deref(), Some("worker-2"));
    assert_eq!(reclaimed.status, JobStatus::Processing);
    assert_eq!(reclaimed.retries, 1);
    let log = reclaimed.error_log.unwrap();
    assert!(log.contains("[Retry 1] lease expired (worker worker-1)"));

    assert_eq!(queue.count_by_status(JobStatus::Processing).await.unwrap(), 1);
}

#[tokio::test]
async fn expired_lease_on_last_attempt_goes_dead() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool.clone());

    let doomed = queue
        .push(crawl_job("ris.musterstadt.de").with_max_retries(1))
        .await
        .unwrap();
    let next = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.fetch_next("worker-1").await.unwrap().unwrap();
    backdate_lease(&pool, doomed.id).await;

    // The dead job frees its domain for the next one.
    let claimed = queue.fetch_next("worker-2").await.unwrap().unwrap();
    assert_eq!(claimed.id, next.id);

    let dead = queue.get_job(doomed.id).await.unwrap().unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
    assert_eq!(dead.retries, 1);
    assert!(dead.completed_at.is_some());
}

#[tokio::test]
async fn lease_timeout_is_configurable() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgJobQueue::new(pool).with_lease_timeout(std::time::Duration::from_millis(1));

    let job = queue.push(crawl_job("ris.musterstadt.de")).await.unwrap();
    queue.fetch_next("worker-1").await.unwrap().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let reclaimed = queue.fetch_next("worker-2").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.retries, 1);
}
