//! Read-only snapshots of manager state and metrics.

use std::collections::HashMap;
use std::time::Duration;

use crate::breaker::CircuitBreakerSnapshot;
use crate::callbacks::CallbackType;
use crate::state::{ConnectionId, DisconnectReason, SessionState};

/// Aggregate counters maintained by one manager.
///
/// Mutated only by the manager itself; obtained as a clone through
/// [`ReconnectionManager::metrics`](crate::ReconnectionManager::metrics).
#[derive(Debug, Clone, Default)]
pub struct ReconnectionMetrics {
    /// Disconnects reported by the transport.
    pub total_disconnects: u64,
    /// Reconnection attempts started across all episodes.
    pub total_reconnection_attempts: u64,
    /// Episodes that ended with a successful reconnection.
    pub successful_reconnections: u64,
    /// Individual attempts that failed.
    pub failed_reconnections: u64,
    /// Running mean time from disconnect to recovery, success-only.
    pub average_reconnection_time: Duration,
    /// Longest observed disconnect-to-recovery gap.
    pub longest_downtime: Duration,
    /// Disconnects per reported reason.
    pub disconnect_reasons: HashMap<DisconnectReason, u64>,
    /// Callback failures that were classified critical.
    pub critical_callback_failures: u64,
}

impl ReconnectionMetrics {
    pub(crate) fn record_disconnect(&mut self, reason: DisconnectReason) {
        self.total_disconnects += 1;
        *self.disconnect_reasons.entry(reason).or_default() += 1;
    }

    pub(crate) fn record_recovery(&mut self, downtime: Duration) {
        self.successful_reconnections += 1;
        let n = self.successful_reconnections;
        let prev = self.average_reconnection_time.as_millis() as u64;
        let avg = (prev * (n - 1) + downtime.as_millis() as u64) / n;
        self.average_reconnection_time = Duration::from_millis(avg);
        if downtime > self.longest_downtime {
            self.longest_downtime = downtime;
        }
    }
}

/// Snapshot of callback failure counters and per-type breaker state.
#[derive(Debug, Clone)]
pub struct CallbackFailureMetrics {
    /// Callback failures across all types.
    pub total_failures: u64,
    /// Failures that were classified critical.
    pub critical_failures: u64,
    /// Breaker state keyed by callback type.
    pub breakers: HashMap<CallbackType, CircuitBreakerSnapshot>,
}

/// Everything [`ReconnectionManager::metrics`](crate::ReconnectionManager::metrics) reports.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Manager-level counters.
    pub reconnection: ReconnectionMetrics,
    /// Nested callback-failure metrics.
    pub callbacks: CallbackFailureMetrics,
}

/// Point-in-time view of one manager.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    /// The session this manager owns.
    pub identity: ConnectionId,
    /// Current lifecycle state.
    pub state: SessionState,
    /// 1-based attempt counter within the current episode, 0 when idle.
    pub current_attempt: u32,
    /// Retry budget per episode.
    pub max_attempts: u32,
    /// Whether the manager has permanently given up.
    pub permanent_failure: bool,
    /// Whether automatic reconnection is configured on.
    pub enabled: bool,
    /// Reason from the most recent disconnect, if any.
    pub last_disconnect_reason: Option<DisconnectReason>,
    /// Error text supplied with the most recent disconnect, if any.
    pub last_error_message: Option<String>,
    /// Attempt records currently retained.
    pub recorded_attempts: usize,
}
