//! End-to-end reconnection behavior through the public API.
//!
//! Covers:
//! - Recovery after transient failures
//! - Permanent failure reasons and attempt exhaustion
//! - Critical callback failures driving the manager to failed
//! - Disabled reconnection
//! - Stop semantics and re-arming after a transport-reported connection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::assert_ok;

use session_reconnect::{
    CallbackCriticality, CallbackType, DisconnectReason, ReconnectionConfig, ReconnectionManager,
    SessionCallbacks, SessionState,
};

fn test_config() -> ReconnectionConfig {
    ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(100))
        .jitter_factor(0.0)
        .max_attempts(5)
        .build()
}

async fn wait_for_state(manager: &ReconnectionManager, state: SessionState) {
    for _ in 0..400 {
        if manager.status().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for {state:?}, still in {:?}",
        manager.status().state
    );
}

#[tokio::test]
async fn recovers_after_transient_connect_failures() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);

    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        let n = cc.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err("dial failed".into())
            } else {
                Ok(())
            }
        }
    }));

    assert_ok!(
        manager
            .handle_disconnect(DisconnectReason::NetworkError, Some("read reset"))
            .await
    );
    wait_for_state(&manager, SessionState::Connected).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let status = manager.status();
    assert_eq!(status.current_attempt, 0);
    assert!(!status.permanent_failure);
    assert_eq!(status.last_disconnect_reason, Some(DisconnectReason::NetworkError));
    assert_eq!(status.last_error_message.as_deref(), Some("read reset"));

    let metrics = manager.metrics().reconnection;
    assert_eq!(metrics.total_disconnects, 1);
    assert_eq!(metrics.total_reconnection_attempts, 3);
    assert_eq!(metrics.failed_reconnections, 2);
    assert_eq!(metrics.successful_reconnections, 1);
    assert!(metrics.average_reconnection_time > Duration::ZERO);
    assert!(metrics.longest_downtime >= metrics.average_reconnection_time);

    let history = manager.attempt_history();
    assert_eq!(history.len(), 3);
    assert!(!history[0].success);
    assert_eq!(history[0].error_message.as_deref(), Some("dial failed"));
    assert!(history[2].success);
    assert_eq!(history[2].attempt_number, 3);

    // jitter_factor is 0, so the delays are exact.
    assert_eq!(history[0].delay, Duration::from_millis(10));
    assert_eq!(history[1].delay, Duration::from_millis(20));
    assert_eq!(history[2].delay, Duration::from_millis(40));
}

#[tokio::test]
async fn permanent_reason_fails_without_attempts() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    manager.set_callbacks(
        SessionCallbacks::new()
            .on_connect(move |_id| {
                cc.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .on_state_change(move |_id, state| {
                seen_cb.lock().unwrap().push(state);
                async { Ok(()) }
            }),
    );

    manager
        .handle_disconnect(DisconnectReason::AuthenticationFailed, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Failed).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let status = manager.status();
    assert!(status.permanent_failure);
    assert_eq!(status.recorded_attempts, 0);

    // Straight to failed; connecting/reconnecting are never observed.
    assert_eq!(*seen.lock().unwrap(), vec![SessionState::Failed]);
}

#[tokio::test]
async fn exhausting_attempts_is_permanent() {
    let config = ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(5))
        .jitter_factor(0.0)
        .max_attempts(2)
        .build();
    let manager = ReconnectionManager::new("s".into(), config);
    manager.set_callbacks(
        SessionCallbacks::new().on_connect(|_id| async { Err("still down".into()) }),
    );

    manager
        .handle_disconnect(DisconnectReason::ConnectionError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Failed).await;

    let status = manager.status();
    assert!(status.permanent_failure);
    assert_eq!(status.recorded_attempts, 2);
    let metrics = manager.metrics().reconnection;
    assert_eq!(metrics.failed_reconnections, 2);
    assert_eq!(metrics.successful_reconnections, 0);

    // Further disconnects are ignored while permanently failed.
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    assert_eq!(manager.metrics().reconnection.total_disconnects, 1);
    assert_eq!(manager.status().state, SessionState::Failed);
}

#[tokio::test]
async fn critical_notification_failure_fails_once() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callbacks(
        SessionCallbacks::new().on_state_change(|_id, _state| async { Err("sink gone".into()) }),
    );

    let err = manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap_err();
    assert!(err.is_critical());

    let status = manager.status();
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.permanent_failure);

    // Entering failed does not re-notify through the failing callback.
    let metrics = manager.metrics();
    assert_eq!(metrics.reconnection.critical_callback_failures, 1);
    assert_eq!(metrics.callbacks.critical_failures, 1);
    assert_eq!(metrics.callbacks.total_failures, 1);
}

#[tokio::test]
async fn disabled_config_parks_in_disabled() {
    let config = ReconnectionConfig::builder()
        .enabled(false)
        .initial_delay(Duration::from_millis(5))
        .build();
    let manager = ReconnectionManager::new("s".into(), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        cc.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    assert_eq!(manager.status().state, SessionState::Disabled);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!manager.status().permanent_failure);
}

#[tokio::test]
async fn notifies_states_in_order() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    manager.set_callbacks(
        SessionCallbacks::new()
            .on_connect(|_id| async { Ok(()) })
            .on_state_change(move |_id, state| {
                seen_cb.lock().unwrap().push(state);
                async { Ok(()) }
            }),
    );

    manager
        .handle_disconnect(DisconnectReason::HeartbeatTimeout, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            SessionState::Reconnecting,
            SessionState::Connecting,
            SessionState::Connected,
        ]
    );
}

#[tokio::test]
async fn stop_is_idempotent_and_halts_retries() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        cc.fetch_add(1, Ordering::SeqCst);
        async { Err("down".into()) }
    }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    manager.stop_reconnection();
    manager.stop_reconnection();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!manager.status().permanent_failure);
}

#[tokio::test]
async fn fresh_disconnect_after_stop_retries_again() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async { Ok(()) }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    manager.stop_reconnection();

    // The stop only covers the episode it was issued in.
    manager
        .handle_disconnect(DisconnectReason::HeartbeatTimeout, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;
    assert!(!manager.attempt_history().is_empty());
}

#[tokio::test]
async fn stop_midway_leaves_state_unrepaired() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connecting).await;

    manager.stop_reconnection();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The aborted task performed no cleanup transition.
    assert_eq!(manager.status().state, SessionState::Connecting);
}

#[tokio::test]
async fn transport_connection_rearms_a_failed_manager() {
    let manager = ReconnectionManager::new("s".into(), test_config());

    manager
        .handle_disconnect(DisconnectReason::AuthenticationFailed, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Failed).await;
    assert!(manager.status().permanent_failure);

    manager.handle_successful_connection().await.unwrap();
    let status = manager.status();
    assert_eq!(status.state, SessionState::Connected);
    assert!(!status.permanent_failure);

    // A fresh transient disconnect retries again.
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async { Ok(()) }));
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;
    assert_eq!(manager.metrics().reconnection.total_reconnection_attempts, 1);
}

#[tokio::test]
async fn repeated_disconnects_replace_the_retry_loop() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async { Ok(()) }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    manager
        .handle_disconnect(DisconnectReason::HeartbeatTimeout, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    let metrics = manager.metrics().reconnection;
    assert_eq!(metrics.total_disconnects, 2);
    assert_eq!(metrics.disconnect_reasons[&DisconnectReason::NetworkError], 1);
    assert_eq!(
        metrics.disconnect_reasons[&DisconnectReason::HeartbeatTimeout],
        1
    );
}

#[tokio::test]
async fn flapping_link_reenters_backoff_at_escalated_delay() {
    let config = ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(200))
        .jitter_factor(0.0)
        .reset_delay_after_success(Duration::from_secs(60))
        .build();
    let manager = ReconnectionManager::new("s".into(), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        let n = cc.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err("dial failed".into())
            } else {
                Ok(())
            }
        }
    }));

    // First episode succeeds on attempt 3, whose delay was 40ms.
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    // The link drops again right away: backoff resumes from the escalated
    // base instead of restarting at the initial delay.
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    let history = manager.attempt_history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].delay, Duration::from_millis(40));
    assert_eq!(history[3].attempt_number, 1);
    assert_eq!(history[3].delay, Duration::from_millis(40));
}

#[tokio::test]
async fn base_delay_restored_after_sustained_connection() {
    let config = ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(200))
        .jitter_factor(0.0)
        .reset_delay_after_success(Duration::from_millis(50))
        .build();
    let manager = ReconnectionManager::new("s".into(), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        let n = cc.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err("dial failed".into())
            } else {
                Ok(())
            }
        }
    }));

    // Escalate the base to 40ms, then hold the connection past the window.
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    let history = manager.attempt_history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].delay, Duration::from_millis(10));
}

#[tokio::test]
async fn reset_window_elapsing_while_down_keeps_escalated_base() {
    let config = ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(200))
        .jitter_factor(0.0)
        .reset_delay_after_success(Duration::from_millis(30))
        .build();
    let manager = ReconnectionManager::new("s".into(), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);
    manager.set_callbacks(SessionCallbacks::new().on_connect(move |_id| {
        let n = cc.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 || n == 3 {
                Err("dial failed".into())
            } else {
                Ok(())
            }
        }
    }));

    // Escalate the base to 40ms, then drop again before the window elapses.
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;
    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    // The window elapsed mid-episode without a held connection, so the second
    // episode kept growing from the escalated base: 40ms, then 80ms.
    let history = manager.attempt_history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[3].delay, Duration::from_millis(40));
    assert_eq!(history[4].delay, Duration::from_millis(80));
}

#[tokio::test]
async fn clear_history_keeps_counters() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async { Ok(()) }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    assert_eq!(manager.attempt_history().len(), 1);
    manager.clear_history();
    assert!(manager.attempt_history().is_empty());
    assert_eq!(manager.metrics().reconnection.total_reconnection_attempts, 1);
}

#[tokio::test]
async fn missing_connect_callback_counts_as_success() {
    let manager = ReconnectionManager::new("s".into(), test_config());

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Connected).await;

    let history = manager.attempt_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
}

#[tokio::test]
async fn criticality_override_makes_connect_fatal() {
    let manager = ReconnectionManager::new("s".into(), test_config());
    manager.set_callback_criticality(CallbackType::Connect, CallbackCriticality::Critical);
    manager.set_callbacks(SessionCallbacks::new().on_connect(|_id| async { Err("down".into()) }));

    manager
        .handle_disconnect(DisconnectReason::NetworkError, None)
        .await
        .unwrap();
    wait_for_state(&manager, SessionState::Failed).await;

    let status = manager.status();
    assert!(status.permanent_failure);
    assert_eq!(status.recorded_attempts, 1);
    assert_eq!(manager.metrics().callbacks.critical_failures, 1);
}
