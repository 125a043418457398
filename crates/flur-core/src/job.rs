use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Status of a crawler job in the queue.
///
/// `pending → processing → {completed | pending | dead}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Dead-lettered after exhausting retries. Never picked up again.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "dead" => Ok(JobStatus::Dead),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Kind of work a job carries. Unknown kinds are kept verbatim so the
/// dispatcher can fail them instead of dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobType {
    CrawlProfile,
    CalculateParcel,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::CrawlProfile => "crawl_profile",
            JobType::CalculateParcel => "calculate_parcel",
            JobType::Other(s) => s,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        match s {
            "crawl_profile" => JobType::CrawlProfile,
            "calculate_parcel" => JobType::CalculateParcel,
            other => JobType::Other(other.to_string()),
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(JobType::from(s.as_str()))
    }
}

/// Default retry budget for new jobs.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A crawler job in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Origin the job will hit; at most one processing job per domain.
    pub domain: Option<String>,
    pub worker_id: Option<String>,
    pub retries: u32,
    pub max_retries: u32,
    /// Newline separated, append-only failure history.
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether the next failure dead-letters this job.
    pub fn is_last_attempt(&self) -> bool {
        self.retries + 1 >= self.max_retries
    }

    pub fn parcel_payload(&self) -> Result<ParcelPayload, AppError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| AppError::InvalidPayload(format!("calculate_parcel: {e}")))
    }
}

/// Request to enqueue a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub domain: Option<String>,
    pub max_retries: Option<u32>,
}

impl NewJob {
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            job_type,
            payload,
            domain: None,
            max_retries: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }
}

/// Payload of a `calculate_parcel` job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParcelPayload {
    pub lat: f64,
    pub lon: f64,
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// How often the producer scans profiles.
    pub producer_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(2),
            producer_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_producer_interval(mut self, interval: Duration) -> Self {
        self.producer_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_parse() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Dead,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Dead.is_terminal());
    }

    #[test]
    fn test_job_type_keeps_unknown_kinds() {
        assert_eq!(JobType::from("crawl_profile"), JobType::CrawlProfile);
        assert_eq!(JobType::from("calculate_parcel"), JobType::CalculateParcel);
        assert_eq!(
            JobType::from("send_newsletter"),
            JobType::Other("send_newsletter".into())
        );
        assert_eq!(JobType::Other("x".into()).as_str(), "x");

        let json = serde_json::to_string(&JobType::CrawlProfile).unwrap();
        assert_eq!(json, "\"crawl_profile\"");
    }

    #[test]
    fn test_last_attempt() {
        let mut job = crate::testutil::make_test_job(JobType::CrawlProfile);
        assert!(!job.is_last_attempt());
        job.retries = 2;
        assert!(job.is_last_attempt());
    }

    #[test]
    fn test_parcel_payload() {
        let mut job = crate::testutil::make_test_job(JobType::CalculateParcel);
        job.payload = serde_json::json!({"lat": 50.1, "lon": 8.6});
        assert_eq!(
            job.parcel_payload().unwrap(),
            ParcelPayload { lat: 50.1, lon: 8.6 }
        );

        job.payload = serde_json::json!({"lat": 50.1});
        assert!(matches!(
            job.parcel_payload(),
            Err(AppError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_new_job_builder() {
        let job = NewJob::new(JobType::CrawlProfile, serde_json::json!({"id": "x"}))
            .with_domain("rat.example.de")
            .with_max_retries(5);

        assert_eq!(job.domain.as_deref(), Some("rat.example.de"));
        assert_eq!(job.max_retries, Some(5));
    }
}
