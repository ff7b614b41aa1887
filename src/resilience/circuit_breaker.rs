//! # Circuit Breaker
//!
//! Fault isolation for a named resource group. Three states: Closed (normal
//! operation), Open (failing fast), HalfOpen (testing recovery with a single
//! probe call). Opens when the failure ratio over a sliding window of
//! recorded outcomes crosses the configured threshold.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls are allowed through.
    Closed = 0,
    /// Failure mode, calls fail fast without executing.
    Open = 1,
    /// Testing recovery, a single probe call is allowed.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Open is the safest interpretation of anything unexpected.
            _ => CircuitState::Open,
        }
    }
}

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of most-recent call outcomes considered.
    pub sliding_window_size: usize,
    /// Failure ratio (0.0..=1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Minimum outcomes in the window before the ratio is evaluated.
    pub min_calls: usize,
    /// Time the circuit stays open before admitting a probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            failure_rate_threshold: 0.5,
            min_calls: 10,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Error surfaced by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was not invoked.
    #[error("circuit breaker is open for {group}")]
    CircuitOpen { group: String },

    /// Operation ran and failed; the outcome was recorded.
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug, Default)]
struct WindowState {
    /// Outcomes of the most recent calls, `true` = failure.
    outcomes: VecDeque<bool>,
    /// When the circuit last opened.
    opened_at: Option<Instant>,
    /// Whether the half-open probe slot is taken.
    probe_in_flight: bool,
    total_calls: u64,
    failure_count: u64,
}

impl WindowState {
    fn record(&mut self, failed: bool, window: usize) {
        if self.outcomes.len() == window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
        self.total_calls += 1;
        if failed {
            self.failure_count += 1;
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|f| **f).count();
        failures as f64 / self.outcomes.len() as f64
    }
}

/// Point-in-time view of a breaker's counters, used by the health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub group: String,
    pub state: CircuitState,
    pub total_calls: u64,
    pub failure_count: u64,
    pub windowed_failure_ratio: f64,
}

/// Sliding-window circuit breaker for one resource group.
#[derive(Debug)]
pub struct CircuitBreaker {
    group: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    window: Mutex<WindowState>,
}

impl CircuitBreaker {
    pub fn new(group: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let group = group.into();
        info!(
            group = %group,
            window = config.sliding_window_size,
            failure_rate_threshold = config.failure_rate_threshold,
            cooldown_seconds = config.cooldown.as_secs(),
            "Circuit breaker initialized"
        );
        Self {
            group,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            window: Mutex::new(WindowState::default()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Ask permission to place a call. Transitions Open → HalfOpen once the
    /// cooldown has elapsed; in HalfOpen only a single probe is admitted
    /// until its outcome is recorded.
    pub async fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let mut window = self.window.lock().await;
                match window.opened_at {
                    Some(opened) if opened.elapsed() >= self.config.cooldown => {
                        self.state
                            .store(CircuitState::HalfOpen as u8, Ordering::Release);
                        window.probe_in_flight = true;
                        info!(group = %self.group, "Circuit breaker half-open, admitting probe");
                        true
                    }
                    Some(_) => false,
                    None => {
                        warn!(group = %self.group, "Circuit open with no opened-at mark, admitting call");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let mut window = self.window.lock().await;
                if window.probe_in_flight {
                    false
                } else {
                    window.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Time remaining until a probe would be admitted. Zero when not open.
    pub async fn remaining_cooldown(&self) -> Duration {
        if self.state() != CircuitState::Open {
            return Duration::ZERO;
        }
        let window = self.window.lock().await;
        match window.opened_at {
            Some(opened) => self.config.cooldown.saturating_sub(opened.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Record a successful call outcome. The window ratio is re-evaluated
    /// even on success: filling the window with old failures can cross the
    /// threshold on a successful call.
    pub async fn record_success(&self) {
        let mut window = self.window.lock().await;
        window.record(false, self.config.sliding_window_size);
        debug!(group = %self.group, "Call succeeded");

        match self.state() {
            CircuitState::HalfOpen => {
                window.outcomes.clear();
                window.opened_at = None;
                window.probe_in_flight = false;
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
                info!(group = %self.group, "Circuit breaker closed (probe succeeded)");
            }
            CircuitState::Closed => self.evaluate_window(&mut window),
            CircuitState::Open => {}
        }
    }

    /// Record a failed call outcome.
    pub async fn record_failure(&self) {
        let mut window = self.window.lock().await;
        window.record(true, self.config.sliding_window_size);

        match self.state() {
            CircuitState::Closed => self.evaluate_window(&mut window),
            CircuitState::HalfOpen => {
                let ratio = window.failure_ratio();
                warn!(group = %self.group, "Probe failed, reopening circuit");
                self.open(&mut window, ratio);
            }
            CircuitState::Open => {}
        }
    }

    fn evaluate_window(&self, window: &mut WindowState) {
        let ratio = window.failure_ratio();
        if window.outcomes.len() >= self.config.min_calls
            && ratio >= self.config.failure_rate_threshold
        {
            self.open(window, ratio);
        }
    }

    /// Hand back a claimed half-open probe slot without recording an
    /// outcome, for admissions rejected by a later protection layer before
    /// the operation ran.
    pub async fn release_probe(&self) {
        let mut window = self.window.lock().await;
        window.probe_in_flight = false;
    }

    fn open(&self, window: &mut WindowState, ratio: f64) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        window.opened_at = Some(Instant::now());
        window.probe_in_flight = false;
        error!(
            group = %self.group,
            failure_ratio = ratio,
            cooldown_seconds = self.config.cooldown.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Execute `operation` under this breaker. Open circuits reject without
    /// invoking; otherwise the outcome is recorded into the sliding window.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow().await {
            return Err(CircuitBreakerError::CircuitOpen {
                group: self.group.clone(),
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success().await,
            Err(_) => self.record_failure().await,
        }
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Force open, e.g. during an incident.
    pub async fn force_open(&self) {
        warn!(group = %self.group, "Circuit breaker forced open");
        let mut window = self.window.lock().await;
        let ratio = window.failure_ratio();
        self.open(&mut window, ratio);
    }

    /// Force closed, discarding window history.
    pub async fn force_closed(&self) {
        warn!(group = %self.group, "Circuit breaker forced closed");
        let mut window = self.window.lock().await;
        window.outcomes.clear();
        window.opened_at = None;
        window.probe_in_flight = false;
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
    }

    /// Counters for monitoring.
    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let window = self.window.lock().await;
        CircuitBreakerSnapshot {
            group: self.group.clone(),
            state: self.state(),
            total_calls: window.total_calls,
            failure_count: window.failure_count,
            windowed_failure_ratio: window.failure_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    fn config(window: usize, threshold: f64, cooldown: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            sliding_window_size: window,
            failure_rate_threshold: threshold,
            min_calls: window,
            cooldown,
        }
    }

    #[tokio::test]
    async fn stays_closed_under_success() {
        let breaker = CircuitBreaker::new("test", config(10, 0.5, Duration::from_secs(1)));

        for _ in 0..20 {
            let result = breaker.call(|| async { Ok::<_, String>("ok") }).await;
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_when_failure_ratio_crosses_threshold() {
        // Window of 20 at 50%: 11 failures among 20 calls must open.
        let breaker = CircuitBreaker::new("test", config(20, 0.5, Duration::from_secs(30)));

        for i in 0..20 {
            let fail = i < 11;
            let _ = breaker
                .call(|| async move {
                    if fail {
                        Err::<&str, _>("boom")
                    } else {
                        Ok("ok")
                    }
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Next call fails fast without invoking the operation.
        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not run")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_below_threshold_do_not_open() {
        let breaker = CircuitBreaker::new("test", config(20, 0.55, Duration::from_secs(30)));

        for i in 0..20 {
            let fail = i % 2 == 0;
            let _ = breaker
                .call(|| async move {
                    if fail {
                        Err::<&str, _>("boom")
                    } else {
                        Ok("ok")
                    }
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn probe_success_closes_circuit() {
        let breaker = CircuitBreaker::new("test", config(2, 0.5, Duration::from_millis(50)));

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<&str, _>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = breaker.call(|| async { Ok::<_, String>("recovered") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("test", config(2, 0.5, Duration::from_millis(50)));

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<&str, _>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = breaker
            .call(|| async { Err::<&str, _>("still broken") })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::OperationFailed(_))
        ));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new("test", config(2, 0.5, Duration::from_millis(50)));

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<&str, _>("boom") }).await;
        }
        sleep(Duration::from_millis(60)).await;

        // First admission claims the probe slot; a second concurrent one is
        // rejected until the probe outcome lands.
        assert!(breaker.should_allow().await);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.should_allow().await);

        breaker.record_success().await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn force_operations() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        breaker.force_open().await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.force_closed().await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
