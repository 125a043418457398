use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flur_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry};
use flur_core::error::AppError;
use flur_core::pacing::CrawlPacer;
use flur_core::traits::{FetchResponse, FetchStream, Fetcher, HttpMethod, RequestOptions};
use flur_core::util::{origin_key, pseudo_random_index};
use futures::StreamExt;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::robots::{DEFAULT_ROBOTS_TIMEOUT, DEFAULT_ROBOTS_TTL, RobotsPolicy};

/// Browser user agents rotated per request.
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7";

/// Settings for [`ResilientFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
    pub robots_timeout: Duration,
    pub robots_ttl: Duration,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub breaker: CircuitBreakerConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(120),
            robots_timeout: DEFAULT_ROBOTS_TIMEOUT,
            robots_ttl: DEFAULT_ROBOTS_TTL,
            http_proxy: None,
            https_proxy: None,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl FetcherConfig {
    /// Defaults plus the process-wide `HTTP_PROXY` / `HTTPS_PROXY`
    /// (upper or lower case).
    pub fn from_env() -> Self {
        Self {
            http_proxy: proxy_var("HTTP_PROXY"),
            https_proxy: proxy_var("HTTPS_PROXY"),
            ..Self::default()
        }
    }
}

fn proxy_var(name: &str) -> Option<String> {
    std::env::var(name)
        .or_else(|_| std::env::var(name.to_ascii_lowercase()))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The crawler's single egress point.
///
/// Owns the per-origin circuit breakers, the robots.txt cache and the
/// crawl-delay pacing state. Clones share all of it.
#[derive(Clone)]
pub struct ResilientFetcher {
    client: Client,
    breakers: CircuitBreakerRegistry,
    robots: RobotsPolicy,
    pacer: CrawlPacer,
    request_timeout: Duration,
    stream_timeout: Duration,
}

/// A request that passed the breaker, robots.txt and pacing.
struct Admission {
    url: Url,
    slot: BreakerSlot,
}

/// Admission by a breaker that has not yet seen the outcome.
///
/// Dropped before an outcome is recorded (the caller abandoned the future),
/// it hands a HALF_OPEN trial slot back so the origin is not stuck.
struct BreakerSlot {
    breaker: CircuitBreaker,
    pending: AtomicBool,
}

impl BreakerSlot {
    fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            pending: AtomicBool::new(true),
        }
    }

    fn record_success(&self) {
        self.pending.store(false, Ordering::Release);
        self.breaker.record_success();
    }

    fn record_failure(&self, reason: &str) {
        self.pending.store(false, Ordering::Release);
        self.breaker.record_failure(reason);
    }

    fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Drop for BreakerSlot {
    fn drop(&mut self) {
        if self.pending.load(Ordering::Acquire) {
            self.breaker.release_trial();
        }
    }
}

impl ResilientFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if let Some(proxy) = &config.http_proxy {
            let proxy = reqwest::Proxy::http(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid HTTP_PROXY: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid HTTPS_PROXY: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            robots: RobotsPolicy::with_settings(
                client.clone(),
                config.robots_ttl,
                config.robots_timeout,
            ),
            client,
            breakers: CircuitBreakerRegistry::new(config.breaker),
            pacer: CrawlPacer::new(),
            request_timeout: config.request_timeout,
            stream_timeout: config.stream_timeout,
        })
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn robots(&self) -> &RobotsPolicy {
        &self.robots
    }

    async fn admit(&self, url: &str) -> Option<Admission> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Refusing to fetch invalid URL");
                return None;
            }
        };
        let origin = origin_key(url)?;

        let breaker = self.breakers.get(&origin);
        if !breaker.try_acquire() {
            tracing::warn!(domain = %origin, state = %breaker.state(), "Circuit open, skipping request");
            return None;
        }
        let slot = BreakerSlot::new(breaker);

        let rules = self.robots.rules_for(&parsed).await;
        if !rules.is_allowed(url) {
            tracing::warn!(url = %url, "Blocked by robots.txt");
            return None;
        }

        self.pacer.wait(&origin, rules.crawl_delay()).await;

        Some(Admission { url: parsed, slot })
    }

    fn build_request(
        &self,
        method: HttpMethod,
        mut url: Url,
        options: &RequestOptions,
        timeout: Duration,
    ) -> RequestBuilder {
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(USER_AGENTS[pseudo_random_index(USER_AGENTS.len())]),
        );
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));

        let body = match (method, &options.form) {
            (HttpMethod::Post, Some(form)) => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                Some(
                    url::form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(form)
                        .finish(),
                )
            }
            _ => None,
        };

        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid request header"),
            }
        }

        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = body {
            request = request.body(body);
        }
        request
    }

    /// Send and feed the breaker. Transport errors count as failures and
    /// yield `None`; 5xx and 429 count as failures but are still returned.
    async fn send(&self, admission: &Admission, request: RequestBuilder) -> Option<Response> {
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    admission
                        .slot
                        .record_failure(&format!("HTTP {}", status.as_u16()));
                } else {
                    admission.slot.record_success();
                }
                Some(response)
            }
            Err(e) => {
                tracing::warn!(url = %admission.url, error = %e, "Request failed");
                admission.slot.record_failure(&e.to_string());
                None
            }
        }
    }
}

impl Fetcher for ResilientFetcher {
    async fn get(&self, url: &str, options: &RequestOptions) -> Option<FetchResponse> {
        let admission = self.admit(url).await?;
        let request = self.build_request(
            HttpMethod::Get,
            admission.url.clone(),
            options,
            self.request_timeout,
        );
        let response = self.send(&admission, request).await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        match response.bytes().await {
            Ok(body) => Some(FetchResponse {
                status,
                url: final_url,
                body: body.to_vec(),
            }),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to read response body");
                admission.slot.breaker().record_failure(&e.to_string());
                None
            }
        }
    }

    async fn stream(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> Option<FetchStream> {
        let admission = self.admit(url).await?;
        let request =
            self.build_request(method, admission.url.clone(), options, self.stream_timeout);
        let response = self.send(&admission, request).await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let breaker = admission.slot.breaker().clone();

        // Ends after the first read error, which also counts against the origin.
        let body = futures::stream::unfold(Some((response, breaker)), |state| async move {
            let (mut response, breaker) = state?;
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk.to_vec()), Some((response, breaker)))),
                Ok(None) => None,
                Err(e) => {
                    breaker.record_failure(&e.to_string());
                    Some((
                        Err(AppError::NetworkError(format!("Body read failed: {e}"))),
                        None,
                    ))
                }
            }
        })
        .boxed();

        Some(FetchStream {
            status,
            url: final_url,
            body,
        })
    }
}
