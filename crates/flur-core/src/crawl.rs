//! Crawling a single municipality profile end to end.

use std::collections::BTreeSet;
use std::future::Future;

use crate::document::DocumentPipeline;
use crate::error::AppError;
use crate::models::{AuditEvent, Document, NewEvidence, Profile};
use crate::traits::{AuditLog, Connector, ConnectorSelector, EvidenceStore, ProfileStore};
use crate::util::truncate_chars;

/// Title keywords that mark a document as relevant for ground-mounted PV.
pub const KEYWORDS: &[&str] = &[
    "Solar",
    "Photovoltaik",
    "Freiflächen",
    "Sondergebiet",
    "Aufstellungsbeschluss",
];

const TITLE_MATCH_SCORE: i32 = 80;
const FULL_TEXT_SCORE: i32 = 90;
const SUMMARY_CHARS: usize = 500;

pub fn is_relevant(title: &str) -> bool {
    let lower = title.to_lowercase();
    KEYWORDS.iter().any(|k| lower.contains(&k.to_lowercase()))
}

/// Counters for one profile crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub connector: Option<&'static str>,
    pub documents_seen: usize,
    pub relevant: usize,
    pub duplicates: usize,
    pub stored: usize,
    pub store_failures: usize,
}

/// Crawls one profile. Implemented by [`CrawlService`]; a seam for the worker.
pub trait ProfileCrawler: Send + Sync + Clone {
    fn crawl(
        &self,
        profile: &Profile,
        actor_id: &str,
    ) -> impl Future<Output = Result<CrawlSummary, AppError>> + Send;
}

#[derive(Clone)]
pub struct CrawlService<S, D, A, E, P> {
    selector: S,
    pipeline: D,
    audit: A,
    evidence: E,
    profiles: P,
}

impl<S, D, A, E, P> CrawlService<S, D, A, E, P>
where
    S: ConnectorSelector,
    D: DocumentPipeline,
    A: AuditLog,
    E: EvidenceStore,
    P: ProfileStore,
{
    pub fn new(selector: S, pipeline: D, audit: A, evidence: E, profiles: P) -> Self {
        Self {
            selector,
            pipeline,
            audit,
            evidence,
            profiles,
        }
    }

    /// Pull documents for `profile`, keep the relevant ones, redact and store them.
    ///
    /// Privacy and audit errors abort the crawl. Evidence write errors are
    /// logged and counted; the remaining documents are still processed.
    pub async fn crawl_profile(
        &self,
        profile: &Profile,
        actor_id: &str,
    ) -> Result<CrawlSummary, AppError> {
        let mut summary = CrawlSummary::default();

        let Some(connector) = self.selector.select(profile) else {
            tracing::warn!(profile = %profile.name, "No suitable source for profile, skipping");
            return Ok(summary);
        };
        summary.connector = Some(connector.name());
        tracing::info!(
            profile = %profile.name,
            connector = connector.name(),
            "Crawling profile"
        );

        let documents = connector.fetch_documents(profile).await?;
        summary.documents_seen = documents.len();
        tracing::info!(profile = %profile.name, count = documents.len(), "Found documents");

        for document in documents {
            if !is_relevant(&document.title) {
                continue;
            }
            summary.relevant += 1;

            let document = self.enrich(&connector, document).await;
            self.process_document(profile, document, actor_id, &mut summary)
                .await?;
        }

        self.profiles.mark_scouted(profile.id).await?;
        Ok(summary)
    }

    async fn enrich<C: Connector>(&self, connector: &C, document: Document) -> Document {
        let fallback = document.clone();
        match connector.enrich(document).await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!(
                    external_id = %fallback.external_id,
                    error = %e,
                    "Could not enrich document"
                );
                fallback
            }
        }
    }

    async fn process_document(
        &self,
        profile: &Profile,
        mut document: Document,
        actor_id: &str,
        summary: &mut CrawlSummary,
    ) -> Result<(), AppError> {
        if let Some(file_url) = document.file_url.clone() {
            tracing::info!(title = %truncate_chars(&document.title, 40), "Downloading document");
            if let Some(processed) = self.pipeline.process_url(&file_url).await {
                document.content_hash = Some(processed.content_hash.clone());
                document.full_text = Some(processed.redaction.sanitized_text);
            }
        }

        if let Some(hash) = document.content_hash.as_deref()
            && self.evidence.content_hash_exists(hash).await?
        {
            tracing::info!(
                title = %truncate_chars(&document.title, 40),
                "Skipping document with known content hash"
            );
            summary.duplicates += 1;
            return Ok(());
        }

        let (score, summary_text) = match document.full_text.as_deref().filter(|t| !t.is_empty()) {
            Some(text) => (
                FULL_TEXT_SCORE,
                format!("{}...", truncate_chars(text, SUMMARY_CHARS)),
            ),
            None => (
                TITLE_MATCH_SCORE,
                format!("Detected keywords in title: {}", document.title),
            ),
        };

        let title = self.pipeline.clean_text(&document.title).await?;
        let summary_redacted = self.pipeline.clean_text(&summary_text).await?;

        if title.redaction_count + summary_redacted.redaction_count > 0 {
            let entity_types: BTreeSet<&str> = title
                .redacted_entities
                .iter()
                .chain(summary_redacted.redacted_entities.iter())
                .map(|e| e.entity_type.as_str())
                .collect();
            let event = AuditEvent {
                action: "pii_redaction".to_string(),
                resource: document.external_id.clone(),
                actor_id: Some(actor_id.to_string()),
                details: serde_json::json!({
                    "title_redactions": title.redaction_count,
                    "summary_redactions": summary_redacted.redaction_count,
                    "entity_types": entity_types,
                }),
            };
            self.audit.record(&event).await?;
        }

        let evidence = NewEvidence {
            doc_type: short_doc_type(document.doc_type.as_deref()),
            url: document.url.clone().or_else(|| Some(document.external_id.clone())),
            external_id: document.external_id,
            title: title.sanitized_text,
            published_date: document.published,
            region_id: profile.id,
            relevant: true,
            risk_score: score,
            summary: summary_redacted.sanitized_text,
            content_hash: document.content_hash,
        };

        match self.evidence.upsert(&evidence).await {
            Ok(()) => {
                tracing::info!(title = %truncate_chars(&evidence.title, 50), "Indexed evidence");
                summary.stored += 1;
            }
            Err(e) => {
                tracing::error!(external_id = %evidence.external_id, error = %e, "Failed to store evidence");
                summary.store_failures += 1;
            }
        }
        Ok(())
    }
}

impl<S, D, A, E, P> ProfileCrawler for CrawlService<S, D, A, E, P>
where
    S: ConnectorSelector,
    D: DocumentPipeline,
    A: AuditLog,
    E: EvidenceStore,
    P: ProfileStore,
{
    async fn crawl(&self, profile: &Profile, actor_id: &str) -> Result<CrawlSummary, AppError> {
        self.crawl_profile(profile, actor_id).await
    }
}

/// Last path segment of a type URI, e.g. `https://schema.oparl.org/1.1/Paper` → `Paper`.
fn short_doc_type(doc_type: Option<&str>) -> String {
    doc_type
        .and_then(|t| t.rsplit('/').next())
        .filter(|t| !t.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
