use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards calls to a downstream that can go away (the broker). After
// `failure_threshold` consecutive failures the circuit opens and calls fail
// fast. Once `open_for` has elapsed the circuit goes HalfOpen and lets one
// trial call through at a time; concurrent callers fail fast until it
// finishes. `success_threshold` trial successes close it again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=Closed, 1=Open, 2=HalfOpen
    pub fn code(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call
    pub open_for: Duration,
    /// Successes in HalfOpen needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

type TransitionObserver = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    state: Arc<Mutex<BreakerState>>,
    trial_in_flight: Arc<AtomicBool>,
    config: CircuitBreakerConfig,
    observer: Option<TransitionObserver>,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// Held for the duration of a HalfOpen trial call. Released on drop so a
/// cancelled trial frees the slot too.
struct TrialPermit<'a>(&'a AtomicBool);

impl<'a> TrialPermit<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TrialPermit(flag))
    }
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            trial_in_flight: Arc::new(AtomicBool::new(false)),
            config,
            observer: None,
        }
    }

    /// Called with `(from, to)` on every state change.
    pub fn with_observer(
        mut self,
        observer: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        // Dropped after the outcome is recorded.
        let _trial = {
            let mut state = self.state.lock().await;
            if state.state == CircuitState::Open {
                let cooled_down = state
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.open_for);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                state.success_count = 0;
                self.transition(&mut state, CircuitState::HalfOpen);
            }

            if state.state == CircuitState::HalfOpen {
                match TrialPermit::acquire(&self.trial_in_flight) {
                    Some(permit) => Some(permit),
                    None => return Err(CircuitBreakerError::CircuitOpen),
                }
            } else {
                None
            }
        };

        match operation.await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.opened_at = None;
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                state.opened_at = Some(Instant::now());
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                state.success_count = 0;
                state.opened_at = Some(Instant::now());
                self.transition(&mut state, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = self.name,
                failures = state.failure_count,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                breaker = self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state change"
            ),
        }

        if let Some(observer) = &self.observer {
            observer(from, to);
        }
    }
}
