//! Three-state circuit breaker guarding calls to a remote dependency.
//!
//! ```text
//! Closed ──(threshold consecutive failures)──► Open
//! Open ──(open_timeout elapsed)──► HalfOpen
//! HalfOpen ──(trial succeeds)──► Closed
//! HalfOpen ──(trial fails)──► Open
//! ```
//!
//! Transitions happen lazily under a single mutex whenever the breaker is
//! consulted, so there is no background timer. Every transition bumps a
//! generation; outcomes reported by calls admitted under an older generation
//! are discarded.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Label used in logs and metrics.
    pub name: String,
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Length of the closed-state counting window. Zero never resets the count.
    pub interval: Duration,
    /// How long the breaker stays open before letting trials through.
    pub open_timeout: Duration,
    /// Maximum trials in flight while half-open.
    pub half_open_max_requests: u32,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_half_open_max_requests(mut self, max: u32) -> Self {
        self.half_open_max_requests = max.max(1);
        self
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "inventory".to_string(),
            failure_threshold: 5,
            interval: Duration::from_secs(60),
            open_timeout: Duration::from_secs(5),
            half_open_max_requests: 5,
        }
    }
}

/// Errors produced by an operation run through [`CircuitBreaker::call`].
pub trait BreakerError {
    /// Whether the error should count against the breaker.
    fn counts_as_failure(&self) -> bool;

    /// The error returned when the breaker refuses the call.
    fn rejected(breaker: &str) -> Self;
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    window_started: Instant,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
}

/// A circuit breaker shared by every caller of one remote dependency.
#[derive(Debug)]
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    clock: C,
    inner: Mutex<Inner>,
}

impl CircuitBreaker<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                window_started: now,
                opened_at: None,
                trials_in_flight: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any time-driven transition first.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, self.clock.now());
        inner.state
    }

    /// Consecutive failures counted in the current closed window.
    pub fn consecutive_failures(&self) -> u32 {
        let mut inner = self.lock();
        self.refresh(&mut inner, self.clock.now());
        inner.consecutive_failures
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// A rejected call never invokes `operation`.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: BreakerError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(E::rejected(&self.config.name));
        };

        let result = operation().await;
        match &result {
            Err(err) if err.counts_as_failure() => permit.failure(),
            _ => permit.success(),
        }
        result
    }

    /// Admits one call, or returns `None` if the breaker refuses it.
    ///
    /// The returned permit must be resolved with [`Permit::success`] or
    /// [`Permit::failure`]; dropping it unresolved only frees its trial slot.
    pub fn try_acquire(&self) -> Option<Permit<'_, C>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, self.clock.now());

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen
                if inner.trials_in_flight < self.config.half_open_max_requests =>
            {
                inner.trials_in_flight += 1;
                true
            }
            state => {
                metrics::counter!(
                    "circuit_breaker_rejections_total",
                    "breaker" => self.config.name.clone()
                )
                .increment(1);
                tracing::debug!(breaker = %self.config.name, %state, "call rejected");
                return None;
            }
        };

        Some(Permit {
            breaker: self,
            generation: inner.generation,
            trial,
            resolved: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the transitions that depend only on elapsed time.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                if !self.config.interval.is_zero()
                    && now.duration_since(inner.window_started) >= self.config.interval
                {
                    inner.window_started = now;
                    inner.consecutive_failures = 0;
                }
            }
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .is_none_or(|at| now.duration_since(at) >= self.config.open_timeout);
                if expired {
                    self.transition(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn resolve(&self, generation: u64, trial: bool, outcome: Option<bool>) {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        // Stale outcome from before the last transition.
        if inner.generation != generation {
            return;
        }
        if trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }

        match (inner.state, outcome) {
            (_, None) => {}
            (CircuitState::Closed, Some(true)) => inner.consecutive_failures = 0,
            (CircuitState::Closed, Some(false)) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, Some(true)) => {
                self.transition(&mut inner, CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, Some(false)) => {
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::Open, Some(_)) => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.consecutive_failures = 0;
        inner.trials_in_flight = 0;
        inner.window_started = now;
        inner.opened_at = (to == CircuitState::Open).then_some(now);

        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.config.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);

        match to {
            CircuitState::Open => {
                tracing::warn!(breaker = %self.config.name, %from, %to, "circuit breaker opened")
            }
            _ => tracing::info!(breaker = %self.config.name, %from, %to, "circuit breaker state changed"),
        }
    }
}

/// Admission ticket for one call through a [`CircuitBreaker`].
#[derive(Debug)]
pub struct Permit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    generation: u64,
    trial: bool,
    resolved: bool,
}

impl<C: Clock> Permit<'_, C> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.resolve(self.generation, self.trial, Some(true));
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.resolve(self.generation, self.trial, Some(false));
    }
}

impl<C: Clock> Drop for Permit<'_, C> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.resolve(self.generation, self.trial, None);
        }
    }
}
