//! Web-search fallback: find PDFs on a municipality's site through a
//! search API when it runs neither OParl nor a scrapable portal.
//!
//! Search APIs are not crawl targets, so these clients use their own HTTP
//! client instead of the robots-aware fetcher.

use std::time::Duration;

use flur_core::error::AppError;
use flur_core::models::{Document, Profile};
use flur_core::traits::Connector;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

pub const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
pub const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Brave caps `count` at 20.
const MAX_RESULTS: usize = 20;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_KEYWORDS: &[&str] = &["Aufstellungsbeschluss", "Photovoltaik"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// `site:<domain> filetype:<type> kw1 "multi word kw"`
pub fn build_query(site_domain: &str, keywords: &[String], filetype: Option<&str>) -> String {
    let mut parts = vec![format!("site:{site_domain}")];
    if let Some(filetype) = filetype {
        parts.push(format!("filetype:{filetype}"));
    }
    for keyword in keywords {
        if keyword.contains(' ') {
            parts.push(format!("\"{keyword}\""));
        } else {
            parts.push(keyword.clone());
        }
    }
    parts.join(" ")
}

/// Host of the profile's site without a leading `www.`.
pub fn site_domain(profile: &Profile) -> Option<String> {
    let url = Url::parse(profile.url.as_deref()?.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn api_status_error(provider: &str, status: StatusCode) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED => {
            AppError::ConfigError(format!("{provider} rejected the API key"))
        }
        StatusCode::FORBIDDEN => {
            AppError::ConfigError(format!("{provider} quota exceeded or access denied"))
        }
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimitExceeded,
        status => AppError::HttpError(format!("{provider} returned HTTP {}", status.as_u16())),
    }
}

fn transport_error(provider: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(SEARCH_TIMEOUT.as_secs())
    } else {
        AppError::NetworkError(format!("{provider} request failed: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Brave
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Brave Search API client (primary provider).
#[derive(Clone)]
pub struct BraveSearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl BraveSearch {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: BRAVE_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, AppError> {
        let count = count.min(MAX_RESULTS).to_string();
        let url = Url::parse_with_params(
            &self.endpoint,
            &[("q", query), ("count", count.as_str()), ("offset", "0")],
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid Brave endpoint: {e}")))?;

        tracing::info!(query = %query, "Searching Brave");
        let response = self
            .client
            .get(url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("Brave", e))?;

        if !response.status().is_success() {
            return Err(api_status_error("Brave", response.status()));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Unreadable Brave response: {e}")))?;
        Ok(body
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Google Custom Search JSON API client (secondary provider).
#[derive(Clone)]
pub struct GoogleSearch {
    client: Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl GoogleSearch {
    pub fn new(client: Client, api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            endpoint: GOOGLE_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, AppError> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
            ],
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid Google endpoint: {e}")))?;

        tracing::info!(query = %query, "Searching Google Custom Search");
        let response = self
            .client
            .get(url)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("Google", e))?;

        if !response.status().is_success() {
            return Err(api_status_error("Google", response.status()));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Unreadable Google response: {e}")))?;
        Ok(body
            .items
            .into_iter()
            .map(|item| SearchHit {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum SearchBackend {
    Brave(BraveSearch),
    Google(GoogleSearch),
}

#[derive(Clone)]
pub struct SearchConnector {
    backend: SearchBackend,
    keywords: Vec<String>,
}

impl SearchConnector {
    pub fn new(backend: SearchBackend) -> Self {
        Self {
            backend,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn backend(&self) -> &SearchBackend {
        &self.backend
    }
}

impl Connector for SearchConnector {
    fn name(&self) -> &'static str {
        match self.backend {
            SearchBackend::Brave(_) => "brave",
            SearchBackend::Google(_) => "google",
        }
    }

    async fn fetch_documents(&self, profile: &Profile) -> Result<Vec<Document>, AppError> {
        let Some(domain) = site_domain(profile) else {
            tracing::warn!(profile = %profile.name, "No site URL to search within");
            return Ok(Vec::new());
        };
        let query = build_query(&domain, &self.keywords, Some("pdf"));

        let hits = match &self.backend {
            SearchBackend::Brave(brave) => brave.search(&query, MAX_RESULTS).await?,
            SearchBackend::Google(google) => google.search(&query).await?,
        };

        Ok(hits
            .into_iter()
            .filter(|hit| !hit.url.is_empty())
            .map(|hit| {
                let mut document = Document::new(hit.url.clone(), hit.title);
                document.doc_type = Some("search_result".to_string());
                document.url = Some(hit.url.clone());
                document.file_url = Some(hit.url);
                document.snippet = Some(hit.snippet).filter(|s| !s.is_empty());
                document
            })
            .collect())
    }
}
