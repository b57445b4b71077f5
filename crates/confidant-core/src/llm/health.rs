//! Provider health tracking for the fallback executor.
//!
//! A per-provider circuit breaker backs the executor's availability probe:
//! a provider that keeps failing is skipped until its cool-down elapses,
//! then probed with a single request.

use std::time::{Duration, Instant};

use confidant_types::llm::LlmError;

/// Circuit breaker state for a provider.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation. Tracks consecutive failures toward threshold.
    Closed { consecutive_failures: u32 },
    /// Provider is skipped. Will probe after `wait_duration` elapses.
    Open {
        opened_at: Instant,
        wait_duration: Duration,
    },
    /// Probing: one trial request admitted at `trial_started` to test if the
    /// provider recovered. Other callers are turned away until it resolves, or
    /// until another `open_duration` passes without an outcome.
    HalfOpen { trial_started: Instant },
}

impl CircuitState {
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed { .. } => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }
}

/// Health tracking for a single LLM provider.
#[derive(Debug)]
pub struct ProviderHealth {
    pub state: CircuitState,
    pub last_error: Option<String>,
    pub last_success: Option<Instant>,
    pub total_calls: u64,
    pub total_failures: u64,
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to wait in Open state before probing.
    pub open_duration: Duration,
    /// If rate-limited, don't use until this instant.
    pub rate_limit_until: Option<Instant>,
    /// Upper bound for a provider-supplied retry-after hint.
    pub max_rate_limit_wait: Duration,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed {
                consecutive_failures: 0,
            },
            last_error: None,
            last_success: None,
            total_calls: 0,
            total_failures: 0,
            failure_threshold: 3,
            open_duration: Duration::from_secs(30),
            rate_limit_until: None,
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl ProviderHealth {
    /// Check whether this provider may be routed to.
    ///
    /// Handles rate-limit cooldown and circuit state transitions
    /// (Open -> HalfOpen when the wait duration has elapsed). Only the caller
    /// that makes that transition is admitted while half-open.
    pub fn is_available(&mut self) -> bool {
        if let Some(until) = self.rate_limit_until {
            if Instant::now() < until {
                return false;
            }
            self.rate_limit_until = None;
        }

        let trial_due = match &self.state {
            CircuitState::Closed { .. } => return true,
            CircuitState::Open {
                opened_at,
                wait_duration,
            } => opened_at.elapsed() >= *wait_duration,
            // A trial that never reported back does not block the provider forever.
            CircuitState::HalfOpen { trial_started } => {
                trial_started.elapsed() >= self.open_duration
            }
        };
        if trial_due {
            self.state = CircuitState::HalfOpen {
                trial_started: Instant::now(),
            };
        }
        trial_due
    }

    /// Record a successful call to this provider.
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.last_success = Some(Instant::now());
        self.state = CircuitState::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a failed call to this provider.
    pub fn record_failure(&mut self, error: &LlmError) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.last_error = Some(error.to_string());

        if let LlmError::RateLimited { retry_after_ms } = error {
            let wait = retry_after_ms
                .map(Duration::from_millis)
                .unwrap_or(self.open_duration)
                .min(self.max_rate_limit_wait);
            self.rate_limit_until = Some(Instant::now() + wait);
        }

        let trip = Self::trips_immediately(error);
        match &self.state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                let new_count = consecutive_failures + 1;
                if trip || new_count >= self.failure_threshold {
                    self.open();
                } else {
                    self.state = CircuitState::Closed {
                        consecutive_failures: new_count,
                    };
                }
            }
            CircuitState::HalfOpen { .. } => self.open(),
            CircuitState::Open { .. } => {}
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open {
            opened_at: Instant::now(),
            wait_duration: self.open_duration,
        };
    }

    /// Errors that will not heal by retrying soon open the circuit at once.
    pub fn trips_immediately(error: &LlmError) -> bool {
        matches!(error, LlmError::AuthenticationFailed)
    }
}
