//! # Circuit Breaker
//!
//! Guards calls to an unreliable downstream operation class (one breaker per
//! class, e.g. per infrastructure type). State machine:
//!
//! ```text
//! Closed --(trippable failures >= threshold)--> Open
//! Open   --(wait interval elapsed)-----------> HalfOpen
//! HalfOpen --(successes >= threshold)--------> Closed
//! HalfOpen --(any probe failure)-------------> Open
//! ```
//!
//! While Open and inside the wait interval, [`CircuitBreaker::execute`]
//! fails fast with [`CircuitBreakerResult::Rejected`] — a sentinel, not an
//! error and not a genuine result. Only exceptions matching the injected
//! [`ErrorClassifier`] count toward the failure counter; everything else
//! propagates without touching circuit state.
//!
//! Half-open probes are bounded by a counting semaphore; the permit is
//! released on every exit path, including cancellation, by RAII.

use crate::recovery::classification::ErrorClassifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
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

/// Result of a guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerResult<T> {
    /// The operation ran and produced this value.
    Executed(T),
    /// The circuit rejected the call without running the operation. Callers
    /// must treat this as "not executed", never as an empty result.
    Rejected,
}

impl<T> CircuitBreakerResult<T> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitBreakerResult::Rejected)
    }

    pub fn executed(self) -> Option<T> {
        match self {
            CircuitBreakerResult::Executed(value) => Some(value),
            CircuitBreakerResult::Rejected => None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// How long the circuit stays Open before admitting probes.
    pub open_to_half_open_wait: Duration,
    /// Maximum concurrent half-open probes.
    pub concurrent_half_open_attempts: usize,
    /// Trippable failures before the circuit opens.
    pub failures_before_open: u32,
    /// Half-open successes required to close the circuit.
    pub half_open_successes_to_close: u32,
    /// Open duration after which the critical-failure watcher escalates.
    pub critical_failure_threshold: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            open_to_half_open_wait: Duration::from_secs(15),
            concurrent_half_open_attempts: 1,
            failures_before_open: 5,
            half_open_successes_to_close: 3,
            critical_failure_threshold: Duration::from_secs(1800),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_to_half_open_wait(mut self, wait: Duration) -> Self {
        self.open_to_half_open_wait = wait;
        self
    }

    pub fn with_concurrent_half_open_attempts(mut self, attempts: usize) -> Self {
        self.concurrent_half_open_attempts = attempts;
        self
    }

    pub fn with_failures_before_open(mut self, failures: u32) -> Self {
        self.failures_before_open = failures;
        self
    }

    pub fn with_half_open_successes_to_close(mut self, successes: u32) -> Self {
        self.half_open_successes_to_close = successes;
        self
    }

    pub fn with_critical_failure_threshold(mut self, threshold: Duration) -> Self {
        self.critical_failure_threshold = threshold;
        self
    }
}

/// Observable counters and state for a breaker instance.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_state_change: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_state_change: DateTime<Utc>,
    last_error: Option<String>,
}

enum Admission {
    Normal,
    Probe,
    Rejected,
}

/// Per-operation-class circuit breaker. Shared across concurrent callers;
/// state mutation is synchronized under a single lock.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    classifier: Arc<ErrorClassifier>,
    inner: Mutex<BreakerInner>,
    probes: Semaphore,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        let probes = Semaphore::new(config.concurrent_half_open_attempts);
        Self {
            name: name.into(),
            config,
            classifier,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_state_change: Utc::now(),
                last_error: None,
            }),
            probes,
        }
    }

    /// Name of the operation class this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of state and counters.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_state_change: inner.last_state_change,
            last_error: inner.last_error.clone(),
        }
    }

    /// Run `op` under the circuit's protection.
    ///
    /// Returns `Ok(Rejected)` when the circuit fails fast, `Ok(Executed(_))`
    /// on success, and the operation's own error otherwise.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<CircuitBreakerResult<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let admission = self.admit();
        match admission {
            Admission::Rejected => Ok(CircuitBreakerResult::Rejected),
            Admission::Normal => match op().await {
                Ok(value) => {
                    self.on_closed_success();
                    Ok(CircuitBreakerResult::Executed(value))
                }
                Err(error) => {
                    self.on_closed_failure(&error);
                    Err(error)
                }
            },
            Admission::Probe => {
                // Permit is released when `_permit` drops, on every exit
                // path including cancellation.
                let _permit = match self.probes.try_acquire() {
                    Ok(permit) => permit,
                    Err(_) => return Ok(CircuitBreakerResult::Rejected),
                };
                match op().await {
                    Ok(value) => {
                        self.on_probe_success();
                        Ok(CircuitBreakerResult::Executed(value))
                    }
                    Err(error) => {
                        self.on_probe_failure(&error);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Event emitted when the circuit has been open past the critical
    /// threshold, or `None` otherwise.
    pub fn critical_event(&self) -> Option<CriticalFailureEvent> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let open_for = (Utc::now() - inner.last_state_change)
            .to_std()
            .unwrap_or_default();
        if open_for < self.config.critical_failure_threshold {
            return None;
        }
        Some(CriticalFailureEvent {
            circuit: self.name.clone(),
            open_since: inner.last_state_change,
            open_for,
            last_error: inner.last_error.clone(),
        })
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::HalfOpen => Admission::Probe,
            CircuitState::Open => {
                let elapsed = (Utc::now() - inner.last_state_change)
                    .to_std()
                    .unwrap_or_default();
                if elapsed >= self.config.open_to_half_open_wait {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.last_state_change = Utc::now();
                    tracing::info!(circuit = %self.name, "circuit half-open, admitting probes");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn on_closed_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
    }

    fn on_closed_failure(&self, error: &(dyn std::error::Error + 'static)) {
        if !self.classifier.is_transient(error) {
            // Not a trippable failure; propagate without touching state.
            return;
        }
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_error = Some(error.to_string());
        if inner.state == CircuitState::Closed
            && inner.failure_count >= self.config.failures_before_open
        {
            inner.state = CircuitState::Open;
            inner.last_state_change = Utc::now();
            tracing::warn!(
                circuit = %self.name,
                failures = inner.failure_count,
                "circuit opened"
            );
        }
    }

    fn on_probe_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::HalfOpen {
            return;
        }
        inner.success_count += 1;
        if inner.success_count >= self.config.half_open_successes_to_close {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.last_state_change = Utc::now();
            tracing::info!(circuit = %self.name, "circuit closed");
        }
    }

    fn on_probe_failure(&self, error: &(dyn std::error::Error + 'static)) {
        // Any probe failure reopens immediately and restarts the open timer.
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_state_change = Utc::now();
        inner.last_error = Some(error.to_string());
        tracing::warn!(circuit = %self.name, "probe failed, circuit reopened");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Escalation event for a circuit stuck open.
#[derive(Debug, Clone)]
pub struct CriticalFailureEvent {
    pub circuit: String,
    pub open_since: DateTime<Utc>,
    pub open_for: Duration,
    pub last_error: Option<String>,
}

/// Port for escalating critical failures to operators.
#[async_trait]
pub trait CriticalFailureNotifier: Send + Sync {
    async fn notify(&self, event: CriticalFailureEvent);
}

/// Notifier that only logs. The default escalation path.
#[derive(Debug, Default, Clone)]
pub struct LoggingCriticalFailureNotifier;

#[async_trait]
impl CriticalFailureNotifier for LoggingCriticalFailureNotifier {
    async fn notify(&self, event: CriticalFailureEvent) {
        tracing::error!(
            circuit = %event.circuit,
            open_since = %event.open_since,
            open_for_secs = event.open_for.as_secs(),
            last_error = event.last_error.as_deref().unwrap_or("unknown"),
            "circuit has been open past the critical threshold"
        );
    }
}

/// Recurring watcher that escalates circuits stuck open past the critical
/// threshold. Escalation is logged and notified, never retried.
pub struct CriticalFailureWatcher {
    breaker: Arc<CircuitBreaker>,
    notifier: Arc<dyn CriticalFailureNotifier>,
    check_interval: Duration,
}

impl CriticalFailureWatcher {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        notifier: Arc<dyn CriticalFailureNotifier>,
        check_interval: Duration,
    ) -> Self {
        Self {
            breaker,
            notifier,
            check_interval,
        }
    }

    /// Run until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(self.check_interval) => {
                    if let Some(event) = self.breaker.critical_event() {
                        self.notifier.notify(event).await;
                    }
                }
            }
        }
    }
}
