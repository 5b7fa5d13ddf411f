use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use session_reconnect::{
    DisconnectReason, ReconnectionConfig, ReconnectionManager, SessionCallbacks,
};

/// Example demonstrating recovery from a flaky transport.
///
/// The connect callback fails twice before succeeding, so the manager walks
/// through three backoff delays before reporting `connected`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Session Reconnect - Basic Recovery\n");

    let config = ReconnectionConfig::builder()
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(2))
        .backoff_multiplier(2.0)
        .jitter_factor(0.0)
        .max_attempts(5)
        .build();

    let manager = ReconnectionManager::new("demo-session".into(), config);

    let dials = Arc::new(AtomicUsize::new(0));
    let dials_cb = Arc::clone(&dials);
    manager.set_callbacks(
        SessionCallbacks::new()
            .on_connect(move |id| {
                let n = dials_cb.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        println!("   dial {id}: refused");
                        Err("connection refused".into())
                    } else {
                        println!("   dial {id}: established");
                        Ok(())
                    }
                }
            })
            .on_state_change(|_id, state| {
                println!("   state -> {state}");
                async { Ok(()) }
            }),
    );

    println!("Transport reports a network error:");
    manager
        .handle_disconnect(DisconnectReason::NetworkError, Some("read reset"))
        .await?;

    while manager.status().state != session_reconnect::SessionState::Connected {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let metrics = manager.metrics().reconnection;
    println!("\nRecovered after {} attempts", metrics.total_reconnection_attempts);
    println!("Downtime: {:?}", metrics.longest_downtime);
    for attempt in manager.attempt_history() {
        println!(
            "   attempt {}: delay {:?}, success: {}",
            attempt.attempt_number, attempt.delay, attempt.success
        );
    }

    Ok(())
}
