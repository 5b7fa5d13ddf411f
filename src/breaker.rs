//! Circuit breakers guarding the lifecycle callbacks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::callbacks::CallbackType;
use crate::error::CallbackError;

/// Failures before a breaker opens, unless overridden.
pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Bound on retained failure timestamps.
const RECENT_FAILURE_WINDOW: usize = 16;

/// Closed/Open gate in front of one callback type.
///
/// Opens after `failure_threshold` consecutive failures and stays open until
/// the next recorded success. While open, [`check`](Self::check) fails with
/// [`CallbackError::CircuitBreakerOpen`] and the guarded callback must not run.
/// Unlike a service-level breaker there is no half-open probing: recovery is
/// an explicit success recorded by the manager.
#[derive(Debug)]
pub struct CallbackCircuitBreaker {
    callback_type: CallbackType,
    failure_threshold: u32,
    failure_count: u32,
    recent_failures: VecDeque<Instant>,
    open: bool,
    last_failure: Option<Instant>,
}

impl CallbackCircuitBreaker {
    /// Creates a closed breaker for the given callback type.
    pub fn new(callback_type: CallbackType, failure_threshold: u32) -> Self {
        Self {
            callback_type,
            failure_threshold: failure_threshold.max(1),
            failure_count: 0,
            recent_failures: VecDeque::new(),
            open: false,
            last_failure: None,
        }
    }

    /// Fails if the breaker is open; otherwise the callback may run.
    pub fn check(&self) -> Result<(), CallbackError> {
        if self.open {
            Err(CallbackError::CircuitBreakerOpen {
                callback_type: self.callback_type,
                failure_count: self.failure_count,
            })
        } else {
            Ok(())
        }
    }

    /// Records a callback failure, opening the breaker at the threshold.
    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.failure_count += 1;
        self.last_failure = Some(now);
        if self.recent_failures.len() == RECENT_FAILURE_WINDOW {
            self.recent_failures.pop_front();
        }
        self.recent_failures.push_back(now);

        if !self.open && self.failure_count >= self.failure_threshold {
            self.open = true;

            #[cfg(feature = "tracing")]
            tracing::warn!(
                callback = self.callback_type.as_str(),
                failures = self.failure_count,
                "callback circuit breaker opened"
            );

            #[cfg(feature = "metrics")]
            metrics::counter!(
                "reconnect_breaker_transitions_total",
                "callback" => self.callback_type.as_str(),
                "to" => "open"
            )
            .increment(1);
        }
    }

    /// Records a callback success, resetting the counter and closing the breaker.
    pub fn record_success(&mut self) {
        #[cfg(feature = "tracing")]
        if self.open {
            tracing::info!(
                callback = self.callback_type.as_str(),
                "callback circuit breaker closed"
            );
        }

        self.failure_count = 0;
        self.recent_failures.clear();
        self.open = false;
    }

    /// Returns true while the breaker rejects calls.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Returns a point-in-time view of the breaker.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            callback_type: self.callback_type,
            failure_count: self.failure_count,
            recent_failures: self.recent_failures.len(),
            is_open: self.open,
            time_since_last_failure: self.last_failure.map(|t| t.elapsed()),
        }
    }
}

/// Snapshot of one breaker for observability.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    /// Which callback this breaker guards.
    pub callback_type: CallbackType,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Failure timestamps retained in the bounded window.
    pub recent_failures: usize,
    /// Whether calls are currently rejected.
    pub is_open: bool,
    /// Time since the most recent failure, if any.
    pub time_since_last_failure: Option<Duration>,
}
