//! Per-origin circuit breaker for crawl targets.
//!
//! Isolates failing council portals so one unhealthy origin cannot eat the
//! worker's request budget.
//!
//! # Circuit States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[timeout]--> HALF_OPEN (one trial)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------------[success]----------------------------+
//! ```
//!
//! State lives in process memory only. Every worker process keeps its own
//! breakers; nothing is persisted or shared across the fleet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally.
    Closed,
    /// Circuit is open - requests are rejected immediately.
    Open,
    /// Circuit is half-open - a single trial request may probe the origin.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,

    /// Time to wait after the last failure before admitting a trial request.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    last_error_message: Option<String>,
    trial_in_flight: bool,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_error_message: None,
            trial_in_flight: false,
        }
    }
}

/// Statistics about circuit breaker state for monitoring.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub time_until_half_open: Option<Duration>,
}

/// Thread-safe circuit breaker guarding a single origin.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(CircuitBreakerInner::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state, handling lazy Open → HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_error: inner.last_error_message.clone(),
            time_until_half_open: self.time_until_half_open(&inner),
        }
    }

    /// Decide whether a request to this origin may go out now.
    ///
    /// - Closed: always admitted.
    /// - Open: rejected until `recovery_timeout` has elapsed.
    /// - HalfOpen: exactly one caller is admitted as the trial; everyone else
    ///   is rejected until that trial reports back.
    ///
    /// An admitted trial must end in [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`release_trial`](Self::release_trial).
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    tracing::info!(circuit = %self.name, "Admitting trial request");
                    true
                }
            }
        }
    }

    /// Give back a trial slot that was admitted but never used.
    pub fn release_trial(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// The origin answered. Resets the failure count and forces Closed.
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();

        if inner.state != CircuitState::Closed {
            tracing::info!(
                circuit = %self.name,
                previous = %inner.state,
                "Circuit breaker closing after successful request"
            );
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_error_message = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self, reason: &str) {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Instant::now());
        inner.last_error_message = Some(reason.to_string());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        error = %reason,
                        "Circuit breaker opening after {} failures",
                        inner.failure_count
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    error = %reason,
                    "Circuit breaker trial failed, returning to open state"
                );
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Circuit breaker manually reset");
        *inner = CircuitBreakerInner::new();
    }

    fn time_until_half_open(&self, inner: &CircuitBreakerInner) -> Option<Duration> {
        if inner.state != CircuitState::Open {
            return None;
        }
        inner.last_failure_time.map(|t| {
            self.config
                .recovery_timeout
                .saturating_sub(t.elapsed())
        })
    }

    fn maybe_transition_to_half_open(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure_time
            && last_failure.elapsed() >= self.config.recovery_timeout
        {
            tracing::info!(
                circuit = %self.name,
                "Circuit breaker transitioning to half-open state"
            );
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = false;
        }
    }
}

/// Lazily created breakers, one per origin.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Breaker for `origin`, created Closed on first use.
    pub fn get(&self, origin: &str) -> CircuitBreaker {
        let mut map = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(origin.to_string())
            .or_insert_with(|| CircuitBreaker::new(origin, self.config.clone()))
            .clone()
    }

    /// Snapshot of every breaker that is not currently closed.
    pub fn unhealthy(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<CircuitBreaker> = {
            let map = self
                .breakers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.values().cloned().collect()
        };
        breakers
            .iter()
            .map(CircuitBreaker::stats)
            .filter(|s| s.state != CircuitState::Closed)
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
