//! Download, fingerprint and sanitize binary council documents.
//!
//! The body is hashed chunk by chunk while it streams in. Text comes from the
//! embedded text layer first; scans with too little text per page go through
//! OCR, and the longer of the two results wins. Nothing leaves this module
//! without passing the privacy engine.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::privacy::{PrivacyEngine, RedactionResult};
use crate::traits::{
    EntityRecognizer, Fetcher, HttpMethod, OcrEngine, RequestOptions, TextExtractor,
};

/// Below this many characters per page the text layer is considered missing.
pub const OCR_CHARS_PER_PAGE_THRESHOLD: usize = 50;

/// Downloads above this size are abandoned.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;

/// A document that was downloaded and sanitized.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// SHA-256 hex over the complete byte stream.
    pub content_hash: String,
    pub byte_len: usize,
    pub page_count: usize,
    pub used_ocr: bool,
    pub redaction: RedactionResult,
}

impl ProcessedDocument {
    pub fn text(&self) -> &str {
        &self.redaction.sanitized_text
    }
}

/// What the crawl needs from the redaction pipeline.
pub trait DocumentPipeline: Send + Sync + Clone {
    /// Download and sanitize a binary document. `None` means no usable content.
    fn process_url(&self, url: &str) -> impl Future<Output = Option<ProcessedDocument>> + Send;

    /// Sanitize a short text such as a title or summary.
    fn clean_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<RedactionResult, AppError>> + Send;
}

#[derive(Clone)]
pub struct DocumentProcessor<F, T, O, R> {
    fetcher: F,
    extractor: T,
    ocr: Option<O>,
    privacy: PrivacyEngine<R>,
}

impl<F, T, O, R> DocumentProcessor<F, T, O, R>
where
    F: Fetcher,
    T: TextExtractor,
    O: OcrEngine,
    R: EntityRecognizer,
{
    /// `ocr` is `None` when no OCR backend was found at startup.
    pub fn new(fetcher: F, extractor: T, ocr: Option<O>, privacy: PrivacyEngine<R>) -> Self {
        Self {
            fetcher,
            extractor,
            ocr,
            privacy,
        }
    }

    /// Download `url` and return its hash and redacted text.
    ///
    /// `None` means no usable content: the download was refused or failed,
    /// or the privacy engine could not guarantee redaction.
    pub async fn fetch_and_redact(&self, url: &str) -> Option<ProcessedDocument> {
        let mut stream = self
            .fetcher
            .stream(HttpMethod::Get, url, &RequestOptions::default())
            .await?;

        if stream.status != 200 {
            tracing::warn!(url = %url, status = stream.status, "Document download failed");
            return None;
        }

        let mut hasher = Sha256::new();
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Document download interrupted");
                    return None;
                }
            };
            if bytes.len() + chunk.len() > MAX_DOCUMENT_BYTES {
                tracing::warn!(url = %url, limit = MAX_DOCUMENT_BYTES, "Document too large, skipping");
                return None;
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let content_hash = format!("{:x}", hasher.finalize());
        tracing::info!(url = %url, hash = %content_hash, bytes = bytes.len(), "Download complete");

        let bytes: Arc<[u8]> = bytes.into();
        let (raw_text, page_count, used_ocr) = self.extract_text(&bytes).await;

        match self.privacy.clean_text(&raw_text).await {
            Ok(redaction) => {
                tracing::info!(
                    url = %url,
                    redactions = redaction.redaction_count,
                    "Redacted document text"
                );
                Some(ProcessedDocument {
                    content_hash,
                    byte_len: bytes.len(),
                    page_count,
                    used_ocr,
                    redaction,
                })
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Privacy pipeline failed, discarding document");
                None
            }
        }
    }

    /// Text layer first, OCR when it averages under the per-page threshold.
    ///
    /// Parsing runs on the blocking pool; a panicking parser counts as an
    /// empty text layer.
    async fn extract_text(&self, bytes: &Arc<[u8]>) -> (String, usize, bool) {
        let extractor = self.extractor.clone();
        let input = Arc::clone(bytes);
        let layer = tokio::task::spawn_blocking(move || extractor.extract(&input))
            .await
            .unwrap_or_else(|e| {
                Err(AppError::ExtractionError(format!(
                    "Text layer parser aborted: {e}"
                )))
            });

        let (text, page_count) = match layer {
            Ok(extracted) => (extracted.text, extracted.page_count),
            Err(e) => {
                tracing::warn!(error = %e, "Text layer extraction failed");
                (String::new(), 0)
            }
        };

        let pages = page_count.max(1);
        let chars = text.chars().count();
        if chars >= OCR_CHARS_PER_PAGE_THRESHOLD * pages {
            return (text, page_count, false);
        }

        let Some(ocr) = &self.ocr else {
            return (text, page_count, false);
        };

        tracing::info!(
            chars_per_page = chars / pages,
            "Low text yield, attempting OCR"
        );
        match ocr.ocr(&bytes[..]).await {
            Ok(ocr_text) if ocr_text.chars().count() > chars => (ocr_text, page_count, true),
            Ok(_) => (text, page_count, false),
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed");
                (text, page_count, false)
            }
        }
    }
}

impl<F, T, O, R> DocumentPipeline for DocumentProcessor<F, T, O, R>
where
    F: Fetcher,
    T: TextExtractor,
    O: OcrEngine,
    R: EntityRecognizer,
{
    async fn process_url(&self, url: &str) -> Option<ProcessedDocument> {
        self.fetch_and_redact(url).await
    }

    async fn clean_text(&self, text: &str) -> Result<RedactionResult, AppError> {
        self.privacy.clean_text(text).await
    }
}
