//! Error taxonomy for callback execution.

use thiserror::Error;

use crate::callbacks::CallbackType;

/// Boxed error type returned by user-supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced while executing lifecycle callbacks.
///
/// `CircuitBreakerOpen` is transient: a callback type is temporarily gated.
/// `StateNotification` and `Critical` are fatal: a callback classified as
/// critical failed, and the state machine must treat the session as lost.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The breaker in front of this callback type is open; the callback did not run.
    #[error("{callback_type} callback circuit breaker is open after {failure_count} failures")]
    CircuitBreakerOpen {
        callback_type: CallbackType,
        failure_count: u32,
    },

    /// The state-change callback failed while classified as critical.
    #[error("state change notification failed: {source}")]
    StateNotification {
        #[source]
        source: BoxError,
    },

    /// A callback other than state-change failed while classified as critical.
    #[error("critical {callback_type} callback failed: {source}")]
    Critical {
        callback_type: CallbackType,
        #[source]
        source: BoxError,
    },

    /// Aggregate over a batch of callback executions.
    #[error("{critical} of {total} callback failures were critical")]
    Batch { critical: u64, total: u64 },
}

impl CallbackError {
    /// Returns true if the error indicates an open circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallbackError::CircuitBreakerOpen { .. })
    }

    /// Returns true if the error must drive the state machine to `Failed`.
    pub fn is_critical(&self) -> bool {
        match self {
            CallbackError::StateNotification { .. } | CallbackError::Critical { .. } => true,
            CallbackError::Batch { critical, .. } => *critical > 0,
            CallbackError::CircuitBreakerOpen { .. } => false,
        }
    }
}
