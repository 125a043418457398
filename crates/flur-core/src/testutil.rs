//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::StreamExt;
use uuid::Uuid;

use crate::crawl::{CrawlSummary, ProfileCrawler};
use crate::document::{DocumentPipeline, ProcessedDocument};
use crate::error::AppError;
use crate::job::{DEFAULT_MAX_RETRIES, Job, JobStatus, JobType, NewJob};
use crate::job_queue::JobQueue;
use crate::models::{AuditEvent, Document, NewEvidence, Profile};
use crate::privacy::{EntityType, RedactedEntity, RedactionResult};
use crate::traits::{
    AuditLog, Connector, ConnectorSelector, EntityRecognizer, EntityToken, EvidenceStore,
    ExtractedText, FetchResponse, FetchStream, Fetcher, HttpMethod, OcrEngine, ParcelEngine,
    ProfileStore, RecognizedEntity, RequestOptions, TextExtractor,
};

/// `AppError` is not `Clone`; mocks that fail repeatedly rebuild it.
fn clone_error(e: &AppError) -> AppError {
    match e {
        AppError::HttpError(m) => AppError::HttpError(m.clone()),
        AppError::Timeout(s) => AppError::Timeout(*s),
        AppError::RateLimitExceeded => AppError::RateLimitExceeded,
        AppError::NetworkError(m) => AppError::NetworkError(m.clone()),
        AppError::DatabaseError(m) => AppError::DatabaseError(m.clone()),
        AppError::ConfigError(m) => AppError::ConfigError(m.clone()),
        AppError::PrivacyError(m) => AppError::PrivacyError(m.clone()),
        AppError::ExtractionError(m) => AppError::ExtractionError(m.clone()),
        AppError::AuditError(m) => AppError::AuditError(m.clone()),
        AppError::InvalidPayload(m) => AppError::InvalidPayload(m.clone()),
        AppError::SerializationError(e) => AppError::Generic(e.to_string()),
        AppError::Generic(m) => AppError::Generic(m.clone()),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MockRoute {
    status: u16,
    chunks: Vec<Vec<u8>>,
}

/// A request seen by [`MockFetcher`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub options: RequestOptions,
}

/// Mock fetcher serving canned bodies by exact URL.
///
/// Unknown URLs return `None`, like a refused or failed request.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, MockRoute>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.with_status(url, 200, body.into())
    }

    pub fn with_json(self, url: &str, body: serde_json::Value) -> Self {
        self.with_body(url, body.to_string())
    }

    pub fn with_chunks(self, url: &str, chunks: Vec<Vec<u8>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), MockRoute { status: 200, chunks });
        self
    }

    pub fn with_status(self, url: &str, status: u16, body: Vec<u8>) -> Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            MockRoute {
                status,
                chunks: vec![body],
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn route(&self, method: HttpMethod, url: &str, options: &RequestOptions) -> Option<MockRoute> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            options: options.clone(),
        });
        self.routes.lock().unwrap().get(url).cloned()
    }
}

impl Fetcher for MockFetcher {
    async fn get(&self, url: &str, options: &RequestOptions) -> Option<FetchResponse> {
        let route = self.route(HttpMethod::Get, url, options)?;
        Some(FetchResponse {
            status: route.status,
            url: url.to_string(),
            body: route.chunks.concat(),
        })
    }

    async fn stream(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> Option<FetchStream> {
        let route = self.route(method, url, options)?;
        Some(FetchStream {
            status: route.status,
            url: url.to_string(),
            body: futures::stream::iter(route.chunks.into_iter().map(Ok)).boxed(),
        })
    }
}

// ---------------------------------------------------------------------------
// Recognizers, extractors, OCR
// ---------------------------------------------------------------------------

/// Recognizer that returns a fixed entity list for any input.
#[derive(Clone)]
pub struct StaticRecognizer {
    entities: Arc<Vec<RecognizedEntity>>,
}

impl StaticRecognizer {
    pub fn new(entities: Vec<RecognizedEntity>) -> Self {
        Self {
            entities: Arc::new(entities),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl EntityRecognizer for StaticRecognizer {
    async fn recognize(&self, _text: &str) -> Result<Vec<RecognizedEntity>, AppError> {
        Ok(self.entities.as_ref().clone())
    }
}

/// Recognizer that always fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingRecognizer;

impl EntityRecognizer for FailingRecognizer {
    async fn recognize(&self, _text: &str) -> Result<Vec<RecognizedEntity>, AppError> {
        Err(AppError::PrivacyError("NER backend unavailable".into()))
    }
}

/// A `PER` entity covering the first occurrence of `needle` in `text`.
pub fn person_at(text: &str, needle: &str) -> RecognizedEntity {
    let byte_start = text.find(needle).expect("needle present in text");
    let start_char = text[..byte_start].chars().count();
    let end_char = start_char + needle.chars().count();
    let tokens = needle
        .split_whitespace()
        .enumerate()
        .map(|(i, _)| EntityToken {
            iob: if i == 0 { "B".into() } else { "I".into() },
            score: None,
        })
        .collect();
    RecognizedEntity {
        label: "PER".into(),
        start_char,
        end_char,
        tokens,
    }
}

#[derive(Clone)]
pub struct MockTextExtractor {
    result: ExtractedText,
}

impl MockTextExtractor {
    pub fn new(result: ExtractedText) -> Self {
        Self { result }
    }
}

impl TextExtractor for MockTextExtractor {
    fn extract(&self, _bytes: &[u8]) -> Result<ExtractedText, AppError> {
        Ok(self.result.clone())
    }
}

#[derive(Clone)]
pub struct MockOcr {
    result: Arc<Result<String, AppError>>,
    calls: Arc<Mutex<usize>>,
}

impl MockOcr {
    pub fn new(result: Result<String, AppError>) -> Self {
        Self {
            result: Arc::new(result),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl OcrEngine for MockOcr {
    async fn ocr(&self, _bytes: &[u8]) -> Result<String, AppError> {
        *self.calls.lock().unwrap() += 1;
        match self.result.as_ref() {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(clone_error(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// MockPipeline
// ---------------------------------------------------------------------------

/// Document pipeline with canned downloads and substring redaction.
#[derive(Clone, Default)]
pub struct MockPipeline {
    documents: Arc<Mutex<HashMap<String, (String, String)>>>,
    redactions: Arc<Mutex<Vec<(String, String)>>>,
    failing: bool,
}

impl MockPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, content_hash: &str, text: &str) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), (content_hash.to_string(), text.to_string()));
        self
    }

    /// Replace every occurrence of `needle` with `tag`, counted as a `PER`.
    pub fn redacting(self, needle: &str, tag: &str) -> Self {
        self.redactions
            .lock()
            .unwrap()
            .push((needle.to_string(), tag.to_string()));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl DocumentPipeline for MockPipeline {
    async fn process_url(&self, url: &str) -> Option<ProcessedDocument> {
        let (content_hash, text) = self.documents.lock().unwrap().get(url).cloned()?;
        Some(ProcessedDocument {
            content_hash,
            byte_len: text.len(),
            page_count: 1,
            used_ocr: false,
            redaction: RedactionResult {
                sanitized_text: text,
                redaction_count: 0,
                redacted_entities: Vec::new(),
            },
        })
    }

    async fn clean_text(&self, text: &str) -> Result<RedactionResult, AppError> {
        if self.failing {
            return Err(AppError::PrivacyError("NER backend unavailable".into()));
        }
        let mut sanitized = text.to_string();
        let mut entities = Vec::new();
        for (needle, tag) in self.redactions.lock().unwrap().iter() {
            while let Some(pos) = sanitized.find(needle.as_str()) {
                let start_char = sanitized[..pos].chars().count();
                entities.push(RedactedEntity {
                    entity_type: EntityType::Person,
                    start_char,
                    end_char: start_char + needle.chars().count(),
                    confidence: 0.85,
                });
                sanitized.replace_range(pos..pos + needle.len(), tag);
            }
        }
        Ok(RedactionResult {
            sanitized_text: sanitized,
            redaction_count: entities.len(),
            redacted_entities: entities,
        })
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockConnector {
    documents: Arc<Vec<Document>>,
    fetch_error: Option<Arc<AppError>>,
    enrich_error: Option<Arc<AppError>>,
}

impl MockConnector {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: Arc::new(documents),
            fetch_error: None,
            enrich_error: None,
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            documents: Arc::new(Vec::new()),
            fetch_error: Some(Arc::new(error)),
            enrich_error: None,
        }
    }

    pub fn with_enrich_error(mut self, error: AppError) -> Self {
        self.enrich_error = Some(Arc::new(error));
        self
    }
}

impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_documents(&self, _profile: &Profile) -> Result<Vec<Document>, AppError> {
        match &self.fetch_error {
            Some(e) => Err(clone_error(e)),
            None => Ok(self.documents.as_ref().clone()),
        }
    }

    async fn enrich(&self, document: Document) -> Result<Document, AppError> {
        match &self.enrich_error {
            Some(e) => Err(clone_error(e)),
            None => Ok(document),
        }
    }
}

#[derive(Clone)]
pub struct MockSelector {
    connector: Option<MockConnector>,
}

impl MockSelector {
    pub fn new(connector: Option<MockConnector>) -> Self {
        Self { connector }
    }
}

impl ConnectorSelector for MockSelector {
    type Connector = MockConnector;

    fn select(&self, _profile: &Profile) -> Option<MockConnector> {
        self.connector.clone()
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockAuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next write.
    pub fn fail_with(&self, error: AppError) {
        *self.error.lock().unwrap() = Some(error);
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditLog for MockAuditLog {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockEvidenceStore {
    stored: Arc<Mutex<Vec<NewEvidence>>>,
    hashes: Arc<Mutex<HashSet<String>>>,
    upsert_error: Arc<Mutex<Option<AppError>>>,
}

impl MockEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_hash(&self, hash: &str) {
        self.hashes.lock().unwrap().insert(hash.to_string());
    }

    pub fn fail_next_upsert(&self, error: AppError) {
        *self.upsert_error.lock().unwrap() = Some(error);
    }

    pub fn stored(&self) -> Vec<NewEvidence> {
        self.stored.lock().unwrap().clone()
    }
}

impl EvidenceStore for MockEvidenceStore {
    async fn content_hash_exists(&self, content_hash: &str) -> Result<bool, AppError> {
        Ok(self.hashes.lock().unwrap().contains(content_hash))
    }

    async fn upsert(&self, evidence: &NewEvidence) -> Result<(), AppError> {
        if let Some(e) = self.upsert_error.lock().unwrap().take() {
            return Err(e);
        }
        if let Some(hash) = &evidence.content_hash {
            self.hashes.lock().unwrap().insert(hash.clone());
        }
        let mut stored = self.stored.lock().unwrap();
        stored.retain(|e| e.external_id != evidence.external_id);
        stored.push(evidence.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockProfileStore {
    profiles: Arc<Vec<Profile>>,
    scouted: Arc<Mutex<Vec<Uuid>>>,
}

impl MockProfileStore {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles: Arc::new(profiles),
            scouted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scouted(&self) -> Vec<Uuid> {
        self.scouted.lock().unwrap().clone()
    }
}

impl ProfileStore for MockProfileStore {
    async fn active_profiles(&self) -> Result<Vec<Profile>, AppError> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }

    async fn mark_scouted(&self, profile_id: Uuid) -> Result<(), AppError> {
        self.scouted.lock().unwrap().push(profile_id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockParcelEngine {
    available: bool,
    calls: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl MockParcelEngine {
    pub fn available() -> Self {
        Self {
            available: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(f64, f64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ParcelEngine for MockParcelEngine {
    async fn compute_virtual_parcel(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<serde_json::Value, AppError> {
        if !self.available {
            return Err(AppError::ConfigError("parcel engine not available".into()));
        }
        self.calls.lock().unwrap().push((lat, lon));
        Ok(serde_json::json!({"lat": lat, "lon": lon}))
    }
}

// ---------------------------------------------------------------------------
// MockCrawler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockCrawler {
    result: Arc<Result<CrawlSummary, AppError>>,
    crawled: Arc<Mutex<Vec<Profile>>>,
}

impl MockCrawler {
    pub fn new(result: Result<CrawlSummary, AppError>) -> Self {
        Self {
            result: Arc::new(result),
            crawled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn crawled(&self) -> Vec<Profile> {
        self.crawled.lock().unwrap().clone()
    }
}

impl ProfileCrawler for MockCrawler {
    async fn crawl(&self, profile: &Profile, _actor_id: &str) -> Result<CrawlSummary, AppError> {
        self.crawled.lock().unwrap().push(profile.clone());
        match self.result.as_ref() {
            Ok(summary) => Ok(summary.clone()),
            Err(e) => Err(clone_error(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (job_id, error_message).
pub type FailedJobRecord = (Uuid, String);

/// Mock job queue backed by an in-memory Vec, following the same retry law
/// and domain exclusion as the database queue.
#[derive(Clone, Default)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<Job>>>,
    fetch_error: Arc<Mutex<Option<AppError>>>,
    push_error: Arc<Mutex<Option<AppError>>>,
    failed_jobs: Arc<Mutex<Vec<FailedJobRecord>>>,
    completed_jobs: Arc<Mutex<Vec<Uuid>>>,
    released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queue with one job ready to be claimed.
    pub fn with_job(job: Job) -> Self {
        let queue = Self::default();
        queue.jobs.lock().unwrap().push(job);
        queue
    }

    /// Every push fails with `error` from now on.
    pub fn fail_pushes(&self, error: AppError) {
        *self.push_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_fetch(&self, error: AppError) {
        *self.fetch_error.lock().unwrap() = Some(error);
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
    }

    pub fn completed(&self) -> Vec<Uuid> {
        self.completed_jobs.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<FailedJobRecord> {
        self.failed_jobs.lock().unwrap().clone()
    }

    pub fn released_workers(&self) -> Vec<String> {
        self.released_workers.lock().unwrap().clone()
    }
}

impl JobQueue for MockJobQueue {
    async fn push(&self, request: NewJob) -> Result<Job, AppError> {
        if let Some(e) = self.push_error.lock().unwrap().as_ref() {
            return Err(clone_error(e));
        }
        let job = Job {
            id: Uuid::new_v4(),
            job_type: request.job_type,
            payload: request.payload,
            status: JobStatus::Pending,
            domain: request.domain,
            worker_id: None,
            retries: 0,
            max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            error_log: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn fetch_next(&self, worker_id: &str) -> Result<Option<Job>, AppError> {
        if let Some(e) = self.fetch_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut jobs = self.jobs.lock().unwrap();
        let busy: HashSet<String> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .filter_map(|j| j.domain.clone())
            .collect();
        let next = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Pending)
            .filter(|(_, j)| j.domain.as_ref().is_none_or(|d| !busy.contains(d)))
            .min_by_key(|(_, j)| j.created_at)
            .map(|(i, _)| i);

        Ok(next.map(|i| {
            let job = &mut jobs[i];
            job.status = JobStatus::Processing;
            job.worker_id = Some(worker_id.to_string());
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), AppError> {
        self.completed_jobs.lock().unwrap().push(job_id);

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status != JobStatus::Dead)
        {
            job.status = JobStatus::Completed;
            job.completed_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> Result<Option<JobStatus>, AppError> {
        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id, message.to_string()));

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && !j.status.is_terminal())
        else {
            return Ok(None);
        };

        job.retries += 1;
        let entry = format!("[{}] [Retry {}] {}", Utc::now().to_rfc3339(), job.retries, message);
        job.error_log = Some(match job.error_log.take() {
            Some(log) => format!("{log}\n{entry}"),
            None => entry,
        });
        if job.retries >= job.max_retries {
            job.status = JobStatus::Dead;
            job.completed_at = Some(Utc::now());
        } else {
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.started_at = None;
        }
        Ok(Some(job.status))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        Ok(self.get(job_id))
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }

    async fn has_open_job_for_profile(&self, profile_id: Uuid) -> Result<bool, AppError> {
        let id = profile_id.to_string();
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().any(|j| {
            j.job_type == JobType::CrawlProfile
                && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                && j.payload.get("id").and_then(|v| v.as_str()) == Some(id.as_str())
        }))
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.started_at = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        let label = match &event {
            crate::worker::WorkerEvent::Started { .. } => "Started",
            crate::worker::WorkerEvent::ProducerRan { .. } => "ProducerRan",
            crate::worker::WorkerEvent::Polling => "Polling",
            crate::worker::WorkerEvent::JobClaimed { .. } => "JobClaimed",
            crate::worker::WorkerEvent::JobCompleted { .. } => "JobCompleted",
            crate::worker::WorkerEvent::JobFailed { .. } => "JobFailed",
            crate::worker::WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            crate::worker::WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a pending job of the given type with an empty payload.
pub fn make_test_job(job_type: JobType) -> Job {
    Job {
        id: Uuid::new_v4(),
        job_type,
        payload: serde_json::json!({}),
        status: JobStatus::Pending,
        domain: None,
        worker_id: None,
        retries: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        error_log: None,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

/// Create an active, never scouted profile with a fresh id.
pub fn make_test_profile() -> Profile {
    Profile {
        id: Uuid::new_v4(),
        name: "Musterstadt".to_string(),
        url: Some("https://www.musterstadt.de/".to_string()),
        oparl_url: None,
        active: true,
        last_scout_at: None,
        extra: serde_json::Map::new(),
    }
}
