use std::future::Future;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuditEvent, Document, NewEvidence, Profile};

// ---------------------------------------------------------------------------
// Egress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Per-request options. Caller headers override the fetcher defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Url-encoded form body, only sent with [`HttpMethod::Post`].
    pub form: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A response whose body is consumed chunk by chunk.
pub struct FetchStream {
    pub status: u16,
    pub url: String,
    pub body: BoxStream<'static, Result<Vec<u8>, AppError>>,
}

impl FetchStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into memory.
    pub async fn collect(mut self) -> Result<FetchResponse, AppError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.body.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(FetchResponse {
            status: self.status,
            url: self.url,
            body,
        })
    }
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// The only way out to crawl targets.
///
/// `None` means the request was not made or did not complete: the origin's
/// circuit is open, robots.txt disallows the URL, or the transport failed.
/// Callers treat it as "source unreachable this cycle".
pub trait Fetcher: Send + Sync + Clone {
    fn get(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> impl Future<Output = Option<FetchResponse>> + Send;

    fn stream(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> impl Future<Output = Option<FetchStream>> + Send;
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// A way of listing council documents for a municipality.
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_documents(
        &self,
        profile: &Profile,
    ) -> impl Future<Output = Result<Vec<Document>, AppError>> + Send;

    /// Fill in details that need an extra round trip, such as the file link.
    fn enrich(
        &self,
        document: Document,
    ) -> impl Future<Output = Result<Document, AppError>> + Send {
        async move { Ok(document) }
    }
}

/// Picks the connector for a profile; `None` means skip the profile.
pub trait ConnectorSelector: Send + Sync + Clone {
    type Connector: Connector;

    fn select(&self, profile: &Profile) -> Option<Self::Connector>;
}

// ---------------------------------------------------------------------------
// Privacy and extraction
// ---------------------------------------------------------------------------

/// Token-level signal attached to a recognized entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityToken {
    /// IOB tag: `B`, `I` or `O`.
    pub iob: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// An entity reported by the NER model. Offsets are character offsets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognizedEntity {
    pub label: String,
    pub start_char: usize,
    pub end_char: usize,
    #[serde(default)]
    pub tokens: Vec<EntityToken>,
}

/// Named-entity recognition backend.
pub trait EntityRecognizer: Send + Sync + Clone {
    fn recognize(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<RecognizedEntity>, AppError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Reads the embedded text layer of a document.
pub trait TextExtractor: Send + Sync + Clone + 'static {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, AppError>;
}

/// Optical character recognition over a whole document.
pub trait OcrEngine: Send + Sync + Clone {
    fn ocr(&self, bytes: &[u8]) -> impl Future<Output = Result<String, AppError>> + Send;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Append-only audit trail. Failures must propagate.
pub trait AuditLog: Send + Sync + Clone {
    fn record(&self, event: &AuditEvent) -> impl Future<Output = Result<(), AppError>> + Send;
}

pub trait EvidenceStore: Send + Sync + Clone {
    fn content_hash_exists(
        &self,
        content_hash: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Insert or update on `external_id`.
    fn upsert(&self, evidence: &NewEvidence) -> impl Future<Output = Result<(), AppError>> + Send;
}

pub trait ProfileStore: Send + Sync + Clone {
    fn active_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, AppError>> + Send;

    fn mark_scouted(&self, profile_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Geometric virtual-parcel calculation, provided by the store when available.
pub trait ParcelEngine: Send + Sync + Clone {
    fn compute_virtual_parcel(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}
