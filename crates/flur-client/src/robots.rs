//! robots.txt policy with a per-origin cache.
//!
//! Rules are fetched at most once per origin per TTL. Concurrent lookups for
//! the same origin share a single in-flight request.

use std::sync::Arc;
use std::time::Duration;

use flur_core::util::{origin_key, pseudo_random_index};
use moka::future::Cache;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use robotstxt::DefaultMatcher;
use url::Url;

use crate::fetcher::USER_AGENTS;

/// Product token matched against robots.txt groups. Sites that do not name
/// it get their `*` group applied.
pub const ROBOTS_PRODUCT_TOKEN: &str = "flur";

pub const DEFAULT_ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Rules in effect for one origin.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotsRules {
    /// No usable robots.txt: missing, unreadable, or the fetch failed.
    AllowAll,
    /// robots.txt answered 401 or 403.
    DenyAll,
    Parsed {
        body: Arc<str>,
        crawl_delay: Option<Duration>,
    },
}

impl RobotsRules {
    pub fn parse(body: &str) -> Self {
        RobotsRules::Parsed {
            crawl_delay: parse_crawl_delay(body),
            body: Arc::from(body),
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        match self {
            RobotsRules::AllowAll => true,
            RobotsRules::DenyAll => false,
            RobotsRules::Parsed { body, .. } => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, ROBOTS_PRODUCT_TOKEN, url)
            }
        }
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        match self {
            RobotsRules::Parsed { crawl_delay, .. } => *crawl_delay,
            _ => None,
        }
    }
}

/// `Crawl-delay` of the `*` group, in (possibly fractional) seconds.
///
/// Consecutive `User-agent` lines form one group; the first rule line after
/// them closes the header.
fn parse_crawl_delay(body: &str) -> Option<Duration> {
    let mut group_is_star = false;
    let mut in_agent_header = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if !in_agent_header {
                    group_is_star = false;
                    in_agent_header = true;
                }
                if value == "*" {
                    group_is_star = true;
                }
            }
            "crawl-delay" => {
                in_agent_header = false;
                if group_is_star
                    && let Ok(secs) = value.parse::<f64>()
                    && secs.is_finite()
                    && secs >= 0.0
                {
                    return Some(Duration::from_secs_f64(secs));
                }
            }
            _ => in_agent_header = false,
        }
    }
    None
}

/// Cached robots.txt lookups, keyed by `host[:port]`.
#[derive(Clone)]
pub struct RobotsPolicy {
    client: Client,
    cache: Cache<String, RobotsRules>,
    timeout: Duration,
}

impl RobotsPolicy {
    pub fn new(client: Client) -> Self {
        Self::with_settings(client, DEFAULT_ROBOTS_TTL, DEFAULT_ROBOTS_TIMEOUT)
    }

    pub fn with_settings(client: Client, ttl: Duration, timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self {
            client,
            cache,
            timeout,
        }
    }

    /// Rules for the origin of `url`, fetching robots.txt on a cache miss.
    pub async fn rules_for(&self, url: &Url) -> RobotsRules {
        let Some(key) = origin_key(url.as_str()) else {
            return RobotsRules::AllowAll;
        };
        let robots_url = format!("{}/robots.txt", url.origin().ascii_serialization());
        self.cache
            .get_with(key.clone(), self.fetch_rules(key, robots_url))
            .await
    }

    pub async fn is_allowed(&self, url: &Url) -> bool {
        self.rules_for(url).await.is_allowed(url.as_str())
    }

    /// Forget cached rules, e.g. after a site announced new ones.
    pub async fn invalidate(&self, origin: &str) {
        self.cache.invalidate(origin).await;
    }

    async fn fetch_rules(&self, origin: String, robots_url: String) -> RobotsRules {
        tracing::info!(domain = %origin, "Checking robots.txt");

        // Same agent pool as page requests; some servers refuse requests without one.
        let response = match self
            .client
            .get(&robots_url)
            .header(USER_AGENT, USER_AGENTS[pseudo_random_index(USER_AGENTS.len())])
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    domain = %origin,
                    error = %e,
                    "Failed to fetch robots.txt, defaulting to allow"
                );
                return RobotsRules::AllowAll;
            }
        };

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(domain = %origin, "robots.txt forbidden, blocking origin");
                RobotsRules::DenyAll
            }
            status if status.is_success() => match response.text().await {
                Ok(body) => RobotsRules::parse(&body),
                Err(e) => {
                    tracing::warn!(domain = %origin, error = %e, "Unreadable robots.txt");
                    RobotsRules::AllowAll
                }
            },
            _ => RobotsRules::AllowAll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;

    const ROBOTS: &str = "\
User-agent: Googlebot
Crawl-delay: 9
Disallow: /

User-agent: *
Disallow: /private/
Crawl-delay: 2.5
";

    #[test]
    fn parsed_rules_apply_star_group() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.is_allowed("https://rat.example.de/bi/si0040.php"));
        assert!(!rules.is_allowed("https://rat.example.de/private/file.pdf"));
        assert_eq!(rules.crawl_delay(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn crawl_delay_ignores_other_groups() {
        let body = "User-agent: Bingbot\nCrawl-delay: 10\n\nUser-agent: *\nDisallow:\n";
        assert_eq!(parse_crawl_delay(body), None);

        let shared = "User-agent: Bingbot\nUser-agent: *\nCrawl-delay: 1\n";
        assert_eq!(parse_crawl_delay(shared), Some(Duration::from_secs(1)));
    }

    #[test]
    fn deny_and_allow_all() {
        assert!(!RobotsRules::DenyAll.is_allowed("https://x.de/"));
        assert!(RobotsRules::AllowAll.is_allowed("https://x.de/private/"));
        assert_eq!(RobotsRules::DenyAll.crawl_delay(), None);
    }

    async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn robots_fetched_once_per_origin() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/robots.txt",
            get({
                let hits = hits.clone();
                move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        ROBOTS
                    }
                }
            }),
        );
        let (base, handle) = serve(app).await;
        let policy = RobotsPolicy::new(Client::new());

        let public = Url::parse(&format!("{base}/bi/")).unwrap();
        let private = Url::parse(&format!("{base}/private/x")).unwrap();
        let (a, b) = tokio::join!(policy.is_allowed(&public), policy.is_allowed(&private));
        assert!(a);
        assert!(!b);
        assert!(policy.is_allowed(&public).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn forbidden_robots_blocks_everything() {
        let app = Router::new().route(
            "/robots.txt",
            get(|| async { (AxumStatus::FORBIDDEN, "no") }),
        );
        let (base, handle) = serve(app).await;
        let policy = RobotsPolicy::new(Client::new());

        let url = Url::parse(&format!("{base}/")).unwrap();
        assert_eq!(policy.rules_for(&url).await, RobotsRules::DenyAll);

        handle.abort();
    }

    #[tokio::test]
    async fn robots_request_carries_a_user_agent() {
        let seen = Arc::new(std::sync::Mutex::new(None::<String>));
        let app = Router::new().route(
            "/robots.txt",
            get({
                let seen = seen.clone();
                move |headers: axum::http::HeaderMap| {
                    let seen = seen.clone();
                    async move {
                        match headers.get("user-agent").and_then(|v| v.to_str().ok()) {
                            Some(ua) => {
                                *seen.lock().unwrap() = Some(ua.to_string());
                                (AxumStatus::OK, ROBOTS)
                            }
                            None => (AxumStatus::FORBIDDEN, "no agent"),
                        }
                    }
                }
            }),
        );
        let (base, handle) = serve(app).await;
        let policy = RobotsPolicy::new(Client::new());

        let url = Url::parse(&format!("{base}/bi/")).unwrap();
        assert!(matches!(policy.rules_for(&url).await, RobotsRules::Parsed { .. }));
        let ua = seen.lock().unwrap().clone().unwrap();
        assert!(USER_AGENTS.contains(&ua.as_str()));

        handle.abort();
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let (base, handle) = serve(Router::new()).await;
        let policy = RobotsPolicy::new(Client::new());

        let url = Url::parse(&format!("{base}/private/")).unwrap();
        assert_eq!(policy.rules_for(&url).await, RobotsRules::AllowAll);

        handle.abort();
    }

    #[tokio::test]
    async fn unreachable_origin_allows() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let policy = RobotsPolicy::with_settings(
            Client::new(),
            DEFAULT_ROBOTS_TTL,
            Duration::from_secs(2),
        );
        let url = Url::parse(&format!("http://{addr}/doc.pdf")).unwrap();
        assert!(policy.is_allowed(&url).await);
    }
}
