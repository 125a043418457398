//! Per-origin crawl pacing.
//!
//! Enforces the `Crawl-delay` an origin advertises in its robots.txt. Each
//! caller reserves the next free slot for the origin under the lock, then
//! sleeps outside of it, so concurrent requests to the same origin line up
//! one delay apart while other origins are never blocked.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct CrawlPacer {
    /// Scheduled (or past) time of the latest request per origin.
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl CrawlPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until at least `delay` has passed since the previous request to
    /// `origin`, then record this request.
    ///
    /// The timestamp is recorded even when `delay` is `None`, so a delay
    /// learned later still measures from the real previous request.
    pub async fn wait(&self, origin: &str, delay: Option<Duration>) {
        let now = Instant::now();
        let slot = {
            let mut map = self.last_request.lock().await;
            let slot = match (map.get(origin), delay) {
                (Some(&last), Some(delay)) => std::cmp::max(now, last + delay),
                _ => now,
            };
            map.insert(origin.to_string(), slot);
            slot
        };

        let sleep_for = slot.saturating_duration_since(now);
        if !sleep_for.is_zero() {
            tracing::debug!(
                origin = %origin,
                sleep_ms = %sleep_for.as_millis(),
                "Honoring crawl-delay"
            );
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Time of the latest recorded request to `origin`.
    pub async fn last_request(&self, origin: &str) -> Option<Instant> {
        self.last_request.lock().await.get(origin).copied()
    }
}
