//! Circuit breaker guarding calls to the accounts service.
//!
//! Closed until `failure_threshold` consecutive failures, then open for
//! `cooldown`. After the cooldown it half-opens and admits at most
//! `half_open_max_probes` calls: a probe failure re-opens, that many
//! consecutive probe successes close it again. A call dropped before it
//! completes hands its probe slot back.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use ledger_types::ports::GatewayError;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_max_probes: u32,
    /// Failure counts in the closed state are cleared this often.
    pub interval: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            half_open_max_probes: 5,
            interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    window_started: Instant,
    opened_at: Option<Instant>,
    probes_admitted: u32,
    probe_successes: u32,
    /// Bumped on every trip so stale probes can't touch a newer half-open.
    generation: u64,
}

/// Records an abandoned call if dropped before [`Permit::finish`].
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: Option<u64>,
    finished: bool,
}

impl Permit<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        if success {
            self.breaker.on_success();
        } else {
            self.breaker.on_failure();
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.on_abandoned(self.probe);
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                window_started: Instant::now(),
                opened_at: None,
                probes_admitted: 0,
                probe_successes: 0,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Runs `call` if the circuit admits it and records the outcome.
    pub async fn call<T, F, Fut>(&self, call: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let permit = self.acquire()?;
        let result = call().await;
        permit.finish(result.is_ok());
        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| now.duration_since(at) >= self.config.cooldown);
                if cooled {
                    tracing::info!(breaker = %self.name, "circuit half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.probes_admitted = 0;
                    inner.probe_successes = 0;
                }
            }
            CircuitState::Closed => {
                if now.duration_since(inner.window_started) >= self.config.interval {
                    inner.window_started = now;
                    inner.consecutive_failures = 0;
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn acquire(&self) -> Result<Permit<'_>, GatewayError> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        let probe = match inner.state {
            CircuitState::Closed => None,
            CircuitState::Open => return Err(GatewayError::CircuitOpen),
            CircuitState::HalfOpen => {
                if inner.probes_admitted >= self.config.half_open_max_probes {
                    return Err(GatewayError::CircuitOpen);
                }
                inner.probes_admitted += 1;
                Some(inner.generation)
            }
        };
        Ok(Permit {
            breaker: self,
            probe,
            finished: false,
        })
    }

    fn on_abandoned(&self, probe: Option<u64>) {
        let Some(generation) = probe else {
            return;
        };
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.generation == generation {
            inner.probes_admitted = inner.probes_admitted.saturating_sub(1);
            tracing::debug!(breaker = %self.name, "probe cancelled, slot released");
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.half_open_max_probes {
                    tracing::info!(breaker = %self.name, "circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.window_started = Instant::now();
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                    self.trip(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "probe failed, circuit re-opened");
                self.trip(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.generation += 1;
        inner.opened_at = Some(Instant::now());
        inner.probes_admitted = 0;
        inner.probe_successes = 0;
    }
}
