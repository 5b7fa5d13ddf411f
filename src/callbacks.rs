//! Lifecycle callbacks, failure classification, and breaker-guarded execution.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::breaker::{CallbackCircuitBreaker, CircuitBreakerSnapshot, DEFAULT_FAILURE_THRESHOLD};
use crate::error::{BoxError, CallbackError};
use crate::metrics::CallbackFailureMetrics;
use crate::state::{ConnectionId, DisconnectReason, SessionState};

/// The three lifecycle callbacks a session can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackType {
    /// Re-establishes the underlying connection.
    Connect,
    /// Observes a reported disconnect.
    Disconnect,
    /// Observes every state transition.
    StateChange,
}

impl CallbackType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CallbackType::Connect => "connect",
            CallbackType::Disconnect => "disconnect",
            CallbackType::StateChange => "state_change",
        }
    }
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failure of a given callback affects the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackCriticality {
    /// Failure is fatal: the manager transitions to `Failed` and stops.
    Critical,
    /// Failure is logged and metered; execution continues.
    Important,
    /// Failure is metered silently; execution continues.
    NonCritical,
}

/// Boxed future returned by every callback slot.
pub type CallbackFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Connect callback: dial the transport for this identity.
pub type ConnectCallback = Arc<dyn Fn(ConnectionId) -> CallbackFuture + Send + Sync>;

/// Disconnect callback: observe a reported loss.
pub type DisconnectCallback =
    Arc<dyn Fn(ConnectionId, DisconnectReason) -> CallbackFuture + Send + Sync>;

/// State-change callback: observe a transition.
pub type StateChangeCallback =
    Arc<dyn Fn(ConnectionId, SessionState) -> CallbackFuture + Send + Sync>;

/// The optional user-supplied lifecycle hooks.
///
/// A closed capability surface: exactly three slots, each optional. Unset
/// slots are skipped without touching their breaker.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub(crate) connect: Option<ConnectCallback>,
    pub(crate) disconnect: Option<DisconnectCallback>,
    pub(crate) state_change: Option<StateChangeCallback>,
}

impl SessionCallbacks {
    /// Creates an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect callback.
    ///
    /// The callback must self-bound: the manager enforces no per-attempt
    /// timeout, and a connect future that never resolves parks the retry loop
    /// until [`stop_reconnection`](crate::ReconnectionManager::stop_reconnection).
    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.connect = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    /// Sets the disconnect callback.
    pub fn on_disconnect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, DisconnectReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.disconnect = Some(Arc::new(move |id, reason| Box::pin(f(id, reason))));
        self
    }

    /// Sets the state-change callback.
    pub fn on_state_change<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, SessionState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.state_change = Some(Arc::new(move |id, state| Box::pin(f(id, state))));
        self
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("connect", &self.connect.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .field("state_change", &self.state_change.is_some())
            .finish()
    }
}

/// Outcome of one guarded callback execution.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The callback ran and returned Ok.
    Completed,
    /// No callback is registered for this slot.
    Skipped,
    /// The callback failed but the failure was absorbed per its criticality.
    Suppressed {
        /// Error text from the failed callback.
        error: String,
    },
}

impl CallbackOutcome {
    /// Returns true if the callback ran and failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, CallbackOutcome::Suppressed { .. })
    }
}

/// Executes callbacks under breaker protection and classifies their failures.
///
/// One breaker per [`CallbackType`]. Failures bump `total_failures`; failures
/// of a type currently classified [`CallbackCriticality::Critical`] also bump
/// `critical_failures` and surface as typed errors the caller must treat as
/// fatal. Everything else is absorbed and reported as
/// [`CallbackOutcome::Suppressed`].
pub struct CallbackFailureManager {
    breakers: Mutex<HashMap<CallbackType, CallbackCircuitBreaker>>,
    criticality: Mutex<HashMap<CallbackType, CallbackCriticality>>,
    total_failures: AtomicU64,
    critical_failures: AtomicU64,
}

impl CallbackFailureManager {
    /// Creates a manager with the default failure threshold.
    pub fn new() -> Self {
        Self::with_failure_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    /// Creates a manager whose breakers open after `failure_threshold` failures.
    pub fn with_failure_threshold(failure_threshold: u32) -> Self {
        let breakers = [
            CallbackType::Connect,
            CallbackType::Disconnect,
            CallbackType::StateChange,
        ]
        .into_iter()
        .map(|ty| (ty, CallbackCircuitBreaker::new(ty, failure_threshold)))
        .collect();

        let criticality = [
            (CallbackType::Connect, CallbackCriticality::Important),
            (CallbackType::Disconnect, CallbackCriticality::NonCritical),
            (CallbackType::StateChange, CallbackCriticality::Critical),
        ]
        .into_iter()
        .collect();

        Self {
            breakers: Mutex::new(breakers),
            criticality: Mutex::new(criticality),
            total_failures: AtomicU64::new(0),
            critical_failures: AtomicU64::new(0),
        }
    }

    /// Overrides the criticality of one callback type.
    pub fn set_criticality(&self, callback_type: CallbackType, criticality: CallbackCriticality) {
        self.criticality
            .lock()
            .unwrap()
            .insert(callback_type, criticality);
    }

    /// Returns the current criticality of one callback type.
    pub fn criticality(&self, callback_type: CallbackType) -> CallbackCriticality {
        self.criticality
            .lock()
            .unwrap()
            .get(&callback_type)
            .copied()
            .unwrap_or(CallbackCriticality::NonCritical)
    }

    /// Runs `f` under breaker protection for `callback_type`.
    ///
    /// The breaker is checked before the callback is constructed, so a gated
    /// callback never runs. The lock is not held across the await.
    pub async fn execute<F, Fut>(
        &self,
        callback_type: CallbackType,
        f: F,
    ) -> Result<CallbackOutcome, CallbackError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        {
            let breakers = self.breakers.lock().unwrap();
            if let Some(breaker) = breakers.get(&callback_type) {
                breaker.check()?;
            }
        }

        match f().await {
            Ok(()) => {
                if let Some(breaker) = self.breakers.lock().unwrap().get_mut(&callback_type) {
                    breaker.record_success();
                }
                Ok(CallbackOutcome::Completed)
            }
            Err(source) => {
                if let Some(breaker) = self.breakers.lock().unwrap().get_mut(&callback_type) {
                    breaker.record_failure();
                }
                self.total_failures.fetch_add(1, Ordering::Relaxed);

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "reconnect_callback_failures_total",
                    "callback" => callback_type.as_str()
                )
                .increment(1);

                match self.criticality(callback_type) {
                    CallbackCriticality::Critical => {
                        self.critical_failures.fetch_add(1, Ordering::Relaxed);
                        Err(match callback_type {
                            CallbackType::StateChange => {
                                CallbackError::StateNotification { source }
                            }
                            other => CallbackError::Critical {
                                callback_type: other,
                                source,
                            },
                        })
                    }
                    CallbackCriticality::Important => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            callback = callback_type.as_str(),
                            error = %source,
                            "important callback failed, continuing"
                        );
                        Ok(CallbackOutcome::Suppressed {
                            error: source.to_string(),
                        })
                    }
                    CallbackCriticality::NonCritical => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            callback = callback_type.as_str(),
                            error = %source,
                            "non-critical callback failed"
                        );
                        Ok(CallbackOutcome::Suppressed {
                            error: source.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Total callback failures across all types.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Failures that were classified critical when they happened.
    pub fn critical_failures(&self) -> u64 {
        self.critical_failures.load(Ordering::Relaxed)
    }

    /// Builds the aggregate error form from the running counters.
    pub fn batch_error(&self) -> CallbackError {
        CallbackError::Batch {
            critical: self.critical_failures(),
            total: self.total_failures(),
        }
    }

    /// Returns a snapshot of failure counters and per-type breaker state.
    pub fn metrics(&self) -> CallbackFailureMetrics {
        let breakers = self
            .breakers
            .lock()
            .unwrap()
            .iter()
            .map(|(ty, breaker)| (*ty, breaker.snapshot()))
            .collect();
        CallbackFailureMetrics {
            total_failures: self.total_failures(),
            critical_failures: self.critical_failures(),
            breakers,
        }
    }
}

impl Default for CallbackFailureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackFailureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackFailureManager")
            .field("total_failures", &self.total_failures())
            .field("critical_failures", &self.critical_failures())
            .finish()
    }
}

/// Thin per-event façade over [`CallbackFailureManager`].
///
/// Skips unset slots, clones the registered callback out of the lock before
/// awaiting it, and re-raises critical failure types unchanged so the state
/// machine can react.
pub struct CallbackExecutor {
    identity: ConnectionId,
    callbacks: Mutex<SessionCallbacks>,
    failures: CallbackFailureManager,
}

impl CallbackExecutor {
    /// Creates an executor with no callbacks registered.
    pub fn new(identity: ConnectionId) -> Self {
        Self {
            identity,
            callbacks: Mutex::new(SessionCallbacks::new()),
            failures: CallbackFailureManager::new(),
        }
    }

    /// The identity passed to every callback.
    pub fn identity(&self) -> &ConnectionId {
        &self.identity
    }

    /// Replaces the registered callbacks.
    pub fn set_callbacks(&self, callbacks: SessionCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    /// The failure manager backing this executor.
    pub fn failure_manager(&self) -> &CallbackFailureManager {
        &self.failures
    }

    /// Runs the connect callback, if set.
    pub async fn execute_connect(&self) -> Result<CallbackOutcome, CallbackError> {
        let Some(cb) = self.callbacks.lock().unwrap().connect.clone() else {
            return Ok(CallbackOutcome::Skipped);
        };
        let identity = self.identity.clone();
        self.failures
            .execute(CallbackType::Connect, move || cb(identity))
            .await
    }

    /// Runs the disconnect callback, if set.
    pub async fn execute_disconnect(
        &self,
        reason: DisconnectReason,
    ) -> Result<CallbackOutcome, CallbackError> {
        let Some(cb) = self.callbacks.lock().unwrap().disconnect.clone() else {
            return Ok(CallbackOutcome::Skipped);
        };
        let identity = self.identity.clone();
        self.failures
            .execute(CallbackType::Disconnect, move || cb(identity, reason))
            .await
    }

    /// Runs the state-change callback, if set.
    pub async fn execute_state_change(
        &self,
        new_state: SessionState,
    ) -> Result<CallbackOutcome, CallbackError> {
        let Some(cb) = self.callbacks.lock().unwrap().state_change.clone() else {
            return Ok(CallbackOutcome::Skipped);
        };
        let identity = self.identity.clone();
        self.failures
            .execute(CallbackType::StateChange, move || cb(identity, new_state))
            .await
    }
}

impl fmt::Debug for CallbackExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackExecutor")
            .field("identity", &self.identity)
            .field("callbacks", &*self.callbacks.lock().unwrap())
            .finish()
    }
}
