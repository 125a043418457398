//! SessionNet (Somacos) scraper for council portals without an API.
//!
//! Posts the generic search mask (`si0090.php`) and reads the result table.
//! Markup varies by installation, so parsing is deliberately loose.

use chrono::Utc;
use flur_core::error::AppError;
use flur_core::models::{Document, Profile};
use flur_core::traits::{Connector, Fetcher, HttpMethod, RequestOptions};
use scraper::{Html, Selector};
use url::Url;

const SEARCH_PAGE: &str = "si0090.php";
const PAPER_TYPE: &str = "https://oparl.org/schema/1.0/Paper";
/// "All document types" in the search mask.
const ALL_DOCTYPES: &str = "100";

pub const DEFAULT_KEYWORDS: &[&str] = &["Solar", "Photovoltaik"];

#[derive(Clone)]
pub struct SessionNetConnector<F> {
    base_url: String,
    keywords: Vec<String>,
    fetcher: F,
}

impl<F: Fetcher> SessionNetConnector<F> {
    pub fn new(base_url: impl Into<String>, fetcher: F) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            fetcher,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn search_url(&self) -> String {
        format!("{}/{SEARCH_PAGE}", self.base_url)
    }

    async fn fetch_html(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Option<String>, AppError> {
        let Some(stream) = self.fetcher.stream(method, url, options).await else {
            tracing::warn!(url = %url, "SessionNet page unreachable");
            return Ok(None);
        };
        if stream.status != 200 {
            tracing::warn!(url = %url, status = stream.status, "SessionNet request failed");
            return Ok(None);
        }
        Ok(Some(stream.collect().await?.text()))
    }

    pub async fn search(&self) -> Result<Vec<Document>, AppError> {
        let options = RequestOptions::new().form(vec![
            ("smc_query".to_string(), self.keywords.join(" ")),
            ("smc_doctype".to_string(), ALL_DOCTYPES.to_string()),
        ]);
        let url = self.search_url();
        let Some(html) = self.fetch_html(HttpMethod::Post, &url, &options).await? else {
            return Ok(Vec::new());
        };

        let documents = parse_results(&html, &self.base_url);
        tracing::info!(base_url = %self.base_url, documents = documents.len(), "SessionNet search done");
        Ok(documents)
    }
}

impl<F: Fetcher> Connector for SessionNetConnector<F> {
    fn name(&self) -> &'static str {
        "sessionnet"
    }

    async fn fetch_documents(&self, _profile: &Profile) -> Result<Vec<Document>, AppError> {
        self.search().await
    }

    /// Look up the first PDF linked from the document's detail page.
    async fn enrich(&self, mut document: Document) -> Result<Document, AppError> {
        if document.file_url.is_some() {
            return Ok(document);
        }
        let Some(page_url) = document.url.clone() else {
            return Ok(document);
        };
        if let Some(html) = self
            .fetch_html(HttpMethod::Get, &page_url, &RequestOptions::new())
            .await?
        {
            document.file_url = find_file_link(&html, &page_url);
        }
        Ok(document)
    }
}

/// Result rows from `table.smc_table`, falling back to `table.rismain`.
///
/// A row counts when it has at least three cells and a link with text.
pub fn parse_results(html: &str, base_url: &str) -> Vec<Document> {
    let Ok(base) = Url::parse(&format!("{base_url}/")) else {
        return Vec::new();
    };
    let (Ok(primary), Ok(fallback), Ok(cell), Ok(link)) = (
        Selector::parse("table.smc_table tr"),
        Selector::parse("table.rismain tr"),
        Selector::parse("td"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    let doc = Html::parse_document(html);
    let mut rows: Vec<_> = doc.select(&primary).collect();
    if rows.is_empty() {
        rows = doc.select(&fallback).collect();
    }

    let fetched_at = Utc::now().to_rfc3339();
    rows.into_iter()
        .filter(|row| row.select(&cell).count() >= 3)
        .filter_map(|row| {
            let anchor = row.select(&link).next()?;
            let title = anchor.text().collect::<String>().trim().to_string();
            let href = anchor.value().attr("href")?;
            if title.is_empty() {
                return None;
            }
            let full_url = base.join(href).ok()?.to_string();

            let mut document = Document::new(full_url.clone(), title);
            document.doc_type = Some(PAPER_TYPE.to_string());
            // The search view carries no reliable date.
            document.published = Some(fetched_at.clone());
            document.url = Some(full_url);
            Some(document)
        })
        .collect()
}

/// First download link on a detail page: a `.pdf` href or SessionNet's
/// `getfile.php` handler.
pub fn find_file_link(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let link = Selector::parse("a[href]").ok()?;
    let doc = Html::parse_document(html);
    doc.select(&link)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| {
            let lower = href.to_ascii_lowercase();
            lower.contains(".pdf") || lower.contains("getfile.php")
        })
        .and_then(|href| base.join(href).ok())
        .map(|url| url.to_string())
}
