use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A municipality being scouted (`scout_profiles` row).
///
/// This is also the payload of a `crawl_profile` job. Extra columns are kept
/// in `extra` so the payload round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    /// Council information system start page.
    #[serde(default)]
    pub url: Option<String>,
    /// OParl system endpoint, when the municipality runs one.
    #[serde(default)]
    pub oparl_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub last_scout_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_active() -> bool {
    true
}

impl Profile {
    /// URL whose origin the crawl will hit first.
    pub fn target_url(&self) -> Option<&str> {
        self.oparl_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(self.url.as_deref().filter(|u| !u.trim().is_empty()))
    }
}

/// A council document discovered by a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier at the source (OParl id, detail page URL, ...).
    pub external_id: String,
    pub title: String,
    /// Short document type, e.g. `Paper`, `Vorlage`, `search_result`.
    pub doc_type: Option<String>,
    pub published: Option<String>,
    /// Human-facing page for the document.
    pub url: Option<String>,
    /// Downloadable binary (usually a PDF).
    pub file_url: Option<String>,
    /// Teaser provided by the source, e.g. a search snippet.
    pub snippet: Option<String>,
    /// Redacted full text, filled in by document processing.
    pub full_text: Option<String>,
    /// SHA-256 hex of the downloaded binary.
    pub content_hash: Option<String>,
}

impl Document {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Row for `evidence_docs`, upserted on `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvidence {
    pub external_id: String,
    pub title: String,
    pub doc_type: String,
    pub published_date: Option<String>,
    pub url: Option<String>,
    pub region_id: Uuid,
    pub relevant: bool,
    pub risk_score: i32,
    pub summary: String,
    pub content_hash: Option<String>,
}

/// Entry for the hash-chained audit log. The store computes the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource: String,
    pub actor_id: Option<String>,
    pub details: serde_json::Value,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
