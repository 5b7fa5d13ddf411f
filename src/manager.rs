//! The reconnection state machine.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::backoff::BackoffCalculator;
use crate::callbacks::{
    CallbackCriticality, CallbackExecutor, CallbackOutcome, CallbackType, SessionCallbacks,
};
use crate::config::ReconnectionConfig;
use crate::error::CallbackError;
use crate::metrics::{ConnectionStatus, MetricsSnapshot, ReconnectionMetrics};
use crate::state::{ConnectionId, DisconnectReason, ReconnectionAttempt, SessionState};

/// Drives reconnection for one session.
///
/// One manager per [`ConnectionId`], created at session start and owned by the
/// surrounding connection registry. The transport reports each physical loss
/// through [`handle_disconnect`](Self::handle_disconnect) and each established
/// connection through
/// [`handle_successful_connection`](Self::handle_successful_connection); the
/// manager decides whether to retry, runs the retry loop on a spawned task,
/// and emits lifecycle notifications through the registered callbacks.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ReconnectionManager {
    identity: ConnectionId,
    executor: Arc<CallbackExecutor>,
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: ReconnectionConfig,
    state: SessionState,
    current_attempt: u32,
    base_delay: Duration,
    permanent_failure: bool,
    stop_requested: bool,
    last_disconnect_reason: Option<DisconnectReason>,
    last_error_message: Option<String>,
    disconnected_at: Option<Instant>,
    attempts: Vec<ReconnectionAttempt>,
    metrics: ReconnectionMetrics,
}

impl ReconnectionManager {
    /// Creates a manager in the `Disconnected` state.
    pub fn new(identity: ConnectionId, config: ReconnectionConfig) -> Self {
        let base_delay = config.initial_delay;
        Self {
            executor: Arc::new(CallbackExecutor::new(identity.clone())),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    config,
                    state: SessionState::Disconnected,
                    current_attempt: 0,
                    base_delay,
                    permanent_failure: false,
                    stop_requested: false,
                    last_disconnect_reason: None,
                    last_error_message: None,
                    disconnected_at: None,
                    attempts: Vec::new(),
                    metrics: ReconnectionMetrics::default(),
                }),
                retry_task: Mutex::new(None),
                reset_task: Mutex::new(None),
            }),
            identity,
        }
    }

    /// The session this manager owns.
    pub fn identity(&self) -> &ConnectionId {
        &self.identity
    }

    /// Replaces the registered lifecycle callbacks.
    pub fn set_callbacks(&self, callbacks: SessionCallbacks) {
        self.executor.set_callbacks(callbacks);
    }

    /// Overrides how failures of one callback type are classified.
    pub fn set_callback_criticality(
        &self,
        callback_type: CallbackType,
        criticality: CallbackCriticality,
    ) {
        self.executor
            .failure_manager()
            .set_criticality(callback_type, criticality);
    }

    /// Reacts to a physical connection loss reported by the transport.
    ///
    /// Records metrics, runs the disconnect callback, then decides: a reason
    /// in the permanent set ends in `Failed` with zero attempts; a disabled
    /// config ends in `Disabled`; otherwise the manager enters `Reconnecting`
    /// and a retry task starts. Inert while a previous permanent failure is
    /// still in effect.
    ///
    /// Fails only when a critical callback failure forces the machine to
    /// `Failed`; suppressed callback failures and open breakers never
    /// propagate from here.
    pub async fn handle_disconnect(
        &self,
        reason: DisconnectReason,
        error_message: Option<&str>,
    ) -> Result<(), CallbackError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.permanent_failure {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    identity = %self.identity,
                    "ignoring disconnect, manager is permanently failed"
                );
                return Ok(());
            }
            inner.state = SessionState::Disconnected;
            inner.current_attempt = 0;
            // A new disconnect starts a fresh episode; a stop only covers the
            // episode it was issued in.
            inner.stop_requested = false;
            inner.last_disconnect_reason = Some(reason);
            inner.last_error_message = error_message.map(str::to_owned);
            inner.disconnected_at = Some(Instant::now());
            inner.metrics.record_disconnect(reason);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            identity = %self.identity,
            reason = %reason,
            error = error_message.unwrap_or(""),
            "session disconnected"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "reconnect_disconnects_total",
            "identity" => self.identity.to_string(),
            "reason" => reason.as_str()
        )
        .increment(1);

        if let Err(err) = self.executor.execute_disconnect(reason).await {
            if err.is_critical() {
                self.hard_fail();
                return Err(err);
            }
            #[cfg(feature = "tracing")]
            tracing::warn!(identity = %self.identity, error = %err, "disconnect callback gated");
        }

        let (permanent, enabled) = {
            let inner = self.shared.inner.lock().unwrap();
            (inner.config.is_permanent(reason), inner.config.enabled)
        };

        if permanent {
            self.shared.inner.lock().unwrap().permanent_failure = true;
            transition(&self.shared, &self.executor, SessionState::Failed).await?;
            return Ok(());
        }

        if !enabled {
            transition(&self.shared, &self.executor, SessionState::Disabled).await?;
            return Ok(());
        }

        transition(&self.shared, &self.executor, SessionState::Reconnecting).await?;
        self.spawn_retry_task();
        Ok(())
    }

    /// Reacts to an established connection reported by the transport.
    ///
    /// Cancels any in-flight retries, moves to `Connected`, resets the attempt
    /// counter and the permanent-failure/stop flags, and schedules the delayed
    /// base-delay reset. Fails only if the `Connected` notification fails
    /// critically.
    pub async fn handle_successful_connection(&self) -> Result<(), CallbackError> {
        self.abort_retry_task();
        mark_connected(&self.shared, &self.executor, None).await
    }

    /// Stops any in-flight reconnection. Idempotent.
    ///
    /// The retry task is aborted wherever it is suspended; no state repair is
    /// performed, so a stop landing mid-connect leaves the manager in
    /// `Connecting` until the next disconnect/connect cycle.
    pub fn stop_reconnection(&self) {
        self.shared.inner.lock().unwrap().stop_requested = true;
        self.abort_retry_task();

        #[cfg(feature = "tracing")]
        tracing::debug!(identity = %self.identity, "reconnection stopped");
    }

    /// Returns a point-in-time view of the manager.
    pub fn status(&self) -> ConnectionStatus {
        let inner = self.shared.inner.lock().unwrap();
        ConnectionStatus {
            identity: self.identity.clone(),
            state: inner.state,
            current_attempt: inner.current_attempt,
            max_attempts: inner.config.max_attempts,
            permanent_failure: inner.permanent_failure,
            enabled: inner.config.enabled,
            last_disconnect_reason: inner.last_disconnect_reason,
            last_error_message: inner.last_error_message.clone(),
            recorded_attempts: inner.attempts.len(),
        }
    }

    /// Returns manager counters plus nested callback-failure metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        let failures = self.executor.failure_manager();
        let mut reconnection = self.shared.inner.lock().unwrap().metrics.clone();
        reconnection.critical_callback_failures = failures.critical_failures();
        MetricsSnapshot {
            reconnection,
            callbacks: failures.metrics(),
        }
    }

    /// Returns the recorded reconnection attempts.
    pub fn attempt_history(&self) -> Vec<ReconnectionAttempt> {
        self.shared.inner.lock().unwrap().attempts.clone()
    }

    /// Clears the recorded reconnection attempts. Counters are untouched.
    pub fn clear_history(&self) {
        self.shared.inner.lock().unwrap().attempts.clear();
    }

    /// Replaces the reconnection policy.
    ///
    /// Applies to subsequent delay computations; an escalated base delay is
    /// clamped into the new policy's range.
    pub fn update_config(&self, config: ReconnectionConfig) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.base_delay = inner
            .base_delay
            .clamp(config.initial_delay, config.max_delay);
        inner.config = config;
    }

    fn spawn_retry_task(&self) {
        let shared = Arc::clone(&self.shared);
        let executor = Arc::clone(&self.executor);
        let handle = tokio::spawn(run_retry_loop(shared, executor));
        if let Some(old) = self.shared.retry_task.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    fn abort_retry_task(&self) {
        if let Some(task) = self.shared.retry_task.lock().unwrap().take() {
            task.abort();
        }
    }

    fn hard_fail(&self) {
        hard_fail_inner(&self.shared);
        self.abort_retry_task();
    }
}

impl std::fmt::Debug for ReconnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock().unwrap();
        f.debug_struct("ReconnectionManager")
            .field("identity", &self.identity)
            .field("state", &inner.state)
            .field("current_attempt", &inner.current_attempt)
            .field("permanent_failure", &inner.permanent_failure)
            .finish()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for slot in [&self.retry_task, &self.reset_task] {
            if let Some(task) = slot.lock().ok().and_then(|mut guard| guard.take()) {
                task.abort();
            }
        }
    }
}

/// Marks the machine permanently failed without emitting a notification.
///
/// Used when a critical notification failure is the trigger; notifying again
/// from here would re-enter the failing callback.
fn hard_fail_inner(shared: &Shared) {
    let mut inner = shared.inner.lock().unwrap();
    inner.state = SessionState::Failed;
    inner.permanent_failure = true;
    inner.stop_requested = true;
}

fn stop_requested(shared: &Shared) -> bool {
    let inner = shared.inner.lock().unwrap();
    inner.stop_requested || inner.permanent_failure
}

/// Moves to `new_state` and notifies via the state-change callback.
///
/// Critical notification failures drive the machine to `Failed` and propagate;
/// an open state-change breaker is logged and swallowed.
async fn transition(
    shared: &Shared,
    executor: &CallbackExecutor,
    new_state: SessionState,
) -> Result<(), CallbackError> {
    {
        let mut inner = shared.inner.lock().unwrap();
        if inner.state == new_state {
            return Ok(());
        }
        inner.state = new_state;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        identity = %executor.identity(),
        state = new_state.as_str(),
        "state transition"
    );

    match executor.execute_state_change(new_state).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_critical() => {
            hard_fail_inner(shared);
            Err(err)
        }
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                identity = %executor.identity(),
                error = %_err,
                "state change notification gated"
            );
            Ok(())
        }
    }
}

/// Shared connected path for the retry loop and the transport-reported success.
///
/// `carried_base` is the delay of the successful attempt; after a recovery the
/// base delay keeps that escalated value so a flapping link re-enters backoff
/// where it left off, until the reset task restores the initial delay.
async fn mark_connected(
    shared: &Arc<Shared>,
    executor: &Arc<CallbackExecutor>,
    carried_base: Option<Duration>,
) -> Result<(), CallbackError> {
    let reset_after = {
        let mut inner = shared.inner.lock().unwrap();
        let recovering = inner.current_attempt > 0;
        if let Some(downtime) = inner.disconnected_at.take().map(|t| t.elapsed()) {
            if recovering {
                inner.metrics.record_recovery(downtime);
            }
        }
        if recovering {
            if let Some(base) = carried_base {
                inner.base_delay = base.clamp(inner.config.initial_delay, inner.config.max_delay);
            }
        }
        inner.current_attempt = 0;
        inner.permanent_failure = false;
        inner.stop_requested = false;
        inner.config.reset_delay_after_success
    };

    #[cfg(feature = "metrics")]
    metrics::counter!(
        "reconnect_connections_total",
        "identity" => executor.identity().to_string()
    )
    .increment(1);

    transition(shared, executor, SessionState::Connected).await?;
    spawn_reset_task(shared, reset_after);
    Ok(())
}

/// Restores the base delay after sustained connection.
fn spawn_reset_task(shared: &Arc<Shared>, reset_after: Duration) {
    let task_shared = Arc::clone(shared);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(reset_after).await;
        let mut inner = task_shared.inner.lock().unwrap();
        if inner.state == SessionState::Connected {
            inner.base_delay = inner.config.initial_delay;
        }
    });
    if let Some(old) = shared.reset_task.lock().unwrap().replace(handle) {
        old.abort();
    }
}

fn finish_attempt(shared: &Shared, duration: Duration, error: Option<String>) {
    let mut inner = shared.inner.lock().unwrap();
    let failed = error.is_some();
    if let Some(last) = inner.attempts.last_mut() {
        last.duration = duration;
        last.success = !failed;
        last.error_message = error;
    }
    if failed {
        inner.metrics.failed_reconnections += 1;
    }
}

/// The retry loop: sleep, connect, repeat until success, exhaustion, or stop.
async fn run_retry_loop(shared: Arc<Shared>, executor: Arc<CallbackExecutor>) {
    loop {
        let step = {
            let mut inner = shared.inner.lock().unwrap();
            if inner.stop_requested || inner.permanent_failure {
                return;
            }
            if inner.current_attempt >= inner.config.max_attempts {
                None
            } else {
                inner.current_attempt += 1;
                let attempt = inner.current_attempt;
                let delay = BackoffCalculator::from_config(&inner.config)
                    .delay_for_attempt(attempt, inner.base_delay);
                inner.attempts.push(ReconnectionAttempt {
                    attempt_number: attempt,
                    started_at: Instant::now(),
                    delay,
                    success: false,
                    error_message: None,
                    duration: Duration::ZERO,
                });
                inner.metrics.total_reconnection_attempts += 1;
                Some((attempt, delay))
            }
        };

        let Some((_attempt, delay)) = step else {
            break;
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            identity = %executor.identity(),
            attempt = _attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection attempt"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "reconnect_attempts_total",
            "identity" => executor.identity().to_string()
        )
        .increment(1);

        tokio::time::sleep(delay).await;

        if stop_requested(&shared) {
            return;
        }

        if transition(&shared, &executor, SessionState::Connecting)
            .await
            .is_err()
        {
            return;
        }

        let started = Instant::now();
        let result = executor.execute_connect().await;
        let elapsed = started.elapsed();

        match result {
            Ok(CallbackOutcome::Completed) | Ok(CallbackOutcome::Skipped) => {
                finish_attempt(&shared, elapsed, None);
                let _ = mark_connected(&shared, &executor, Some(delay)).await;
                return;
            }
            Ok(CallbackOutcome::Suppressed { error }) => {
                finish_attempt(&shared, elapsed, Some(error));
                if transition(&shared, &executor, SessionState::Reconnecting)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(err) if err.is_critical() => {
                finish_attempt(&shared, elapsed, Some(err.to_string()));
                hard_fail_inner(&shared);
                return;
            }
            Err(err) => {
                // Connect breaker open: counts as a failed attempt.
                finish_attempt(&shared, elapsed, Some(err.to_string()));
                if transition(&shared, &executor, SessionState::Reconnecting)
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    // Retry budget exhausted.
    shared.inner.lock().unwrap().permanent_failure = true;

    #[cfg(feature = "tracing")]
    tracing::warn!(
        identity = %executor.identity(),
        "reconnection attempts exhausted"
    );

    let _ = transition(&shared, &executor, SessionState::Failed).await;
}
