//! Turns stale profiles into `crawl_profile` jobs.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AppError;
use crate::job::{JobType, NewJob};
use crate::job_queue::JobQueue;
use crate::models::Profile;
use crate::traits::ProfileStore;
use crate::util::origin_key;

/// Profiles scouted more recently than this are left alone.
pub const DEFAULT_STALENESS: TimeDelta = TimeDelta::hours(24);

#[derive(Clone)]
pub struct Producer<Q, P> {
    queue: Q,
    profiles: P,
    staleness: TimeDelta,
}

impl<Q: JobQueue, P: ProfileStore> Producer<Q, P> {
    pub fn new(queue: Q, profiles: P) -> Self {
        Self {
            queue,
            profiles,
            staleness: DEFAULT_STALENESS,
        }
    }

    pub fn with_staleness(mut self, staleness: TimeDelta) -> Self {
        self.staleness = staleness;
        self
    }

    /// Queue every active profile that is due and not already queued.
    ///
    /// Returns the number of jobs pushed. Push failures are logged and the
    /// scan continues with the next profile.
    pub async fn run_once(&self) -> Result<usize, AppError> {
        let profiles = self.profiles.active_profiles().await?;
        let now = Utc::now();
        let mut queued = 0;

        for profile in profiles {
            if !self.is_due(&profile, now) {
                continue;
            }
            if self.queue.has_open_job_for_profile(profile.id).await? {
                continue;
            }

            let mut job = NewJob::new(JobType::CrawlProfile, serde_json::to_value(&profile)?);
            if let Some(domain) = profile.target_url().and_then(origin_key) {
                job = job.with_domain(domain);
            }

            match self.queue.push(job).await {
                Ok(pushed) => {
                    tracing::debug!(job_id = %pushed.id, profile = %profile.name, "Queued profile");
                    queued += 1;
                }
                Err(e) => {
                    tracing::error!(profile = %profile.name, error = %e, "Failed to queue profile");
                }
            }
        }

        if queued > 0 {
            tracing::info!(queued, "Producer queued new profiles");
        }
        Ok(queued)
    }

    fn is_due(&self, profile: &Profile, now: DateTime<Utc>) -> bool {
        match profile.last_scout_at {
            None => true,
            Some(last) => now - last >= self.staleness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::testutil::{MockJobQueue, MockProfileStore, make_test_profile};

    #[tokio::test]
    async fn queues_never_scouted_profiles_with_domain() {
        let mut profile = make_test_profile();
        profile.url = Some("https://Buergerinfo.Musterstadt.de/bi/".into());
        let queue = MockJobQueue::empty();
        let producer = Producer::new(queue.clone(), MockProfileStore::new(vec![profile.clone()]));

        assert_eq!(producer.run_once().await.unwrap(), 1);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::CrawlProfile);
        assert_eq!(jobs[0].status, JobStatus::Pending);
        assert_eq!(jobs[0].domain.as_deref(), Some("buergerinfo.musterstadt.de"));
        assert_eq!(jobs[0].payload["id"], profile.id.to_string());
        assert_eq!(jobs[0].max_retries, 3);
    }

    #[tokio::test]
    async fn skips_recently_scouted_profiles() {
        let mut fresh = make_test_profile();
        fresh.last_scout_at = Some(Utc::now() - TimeDelta::hours(2));
        let mut stale = make_test_profile();
        stale.last_scout_at = Some(Utc::now() - TimeDelta::hours(30));

        let queue = MockJobQueue::empty();
        let producer = Producer::new(
            queue.clone(),
            MockProfileStore::new(vec![fresh, stale.clone()]),
        );

        assert_eq!(producer.run_once().await.unwrap(), 1);
        assert_eq!(queue.jobs()[0].payload["id"], stale.id.to_string());
    }

    #[tokio::test]
    async fn does_not_duplicate_open_jobs() {
        let profile = make_test_profile();
        let queue = MockJobQueue::empty();
        let producer = Producer::new(queue.clone(), MockProfileStore::new(vec![profile]));

        assert_eq!(producer.run_once().await.unwrap(), 1);
        assert_eq!(producer.run_once().await.unwrap(), 0);
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn push_failure_is_swallowed() {
        let queue = MockJobQueue::empty();
        queue.fail_pushes(AppError::DatabaseError("connection reset".into()));
        let producer = Producer::new(
            queue.clone(),
            MockProfileStore::new(vec![make_test_profile(), make_test_profile()]),
        );

        assert_eq!(producer.run_once().await.unwrap(), 0);
        assert!(queue.jobs().is_empty());
    }
}
