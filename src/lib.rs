//! Connection resilience for long-lived sessions.
//!
//! This crate keeps a logical session alive across physical connection
//! losses. Each session gets a [`ReconnectionManager`] that reacts to
//! transport events, schedules retries with exponential backoff and jitter,
//! and drives user-supplied lifecycle callbacks whose failures are classified
//! and circuit-broken instead of tearing the session down.
//!
//! # Features
//!
//! - **Exponential backoff with jitter**: configurable multiplier, cap, and
//!   randomization factor; the base delay carries across rapid
//!   disconnect/reconnect cycles and resets only after sustained connection
//! - **Permanent failure detection**: disconnect reasons such as
//!   authentication failure stop retries immediately
//! - **Callback criticality**: connect, disconnect, and state-change hooks
//!   are classified critical, important, or non-critical, and each is guarded
//!   by its own circuit breaker
//! - **Observability**: per-manager status and metrics snapshots, plus
//!   optional `tracing` and `metrics` integration behind cargo features
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use session_reconnect::{
//!     DisconnectReason, ReconnectionConfig, ReconnectionManager, SessionCallbacks,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), session_reconnect::CallbackError> {
//! let config = ReconnectionConfig::builder()
//!     .initial_delay(Duration::from_millis(10))
//!     .jitter_factor(0.0)
//!     .max_attempts(3)
//!     .build();
//!
//! let manager = ReconnectionManager::new("session-1".into(), config);
//! manager.set_callbacks(SessionCallbacks::new().on_connect(|id| async move {
//!     // Dial the transport for `id` here.
//!     let _ = id;
//!     Ok(())
//! }));
//!
//! manager
//!     .handle_disconnect(DisconnectReason::NetworkError, Some("read reset"))
//!     .await?;
//!
//! tokio::time::sleep(Duration::from_millis(100)).await;
//! println!("{:?}", manager.status().state);
//! # Ok(())
//! # }
//! ```

mod backoff;
mod breaker;
mod callbacks;
mod config;
mod error;
mod manager;
mod metrics;
mod state;

pub use backoff::BackoffCalculator;
pub use breaker::{CallbackCircuitBreaker, CircuitBreakerSnapshot};
pub use callbacks::{
    CallbackCriticality, CallbackExecutor, CallbackFailureManager, CallbackFuture,
    CallbackOutcome, CallbackType, ConnectCallback, DisconnectCallback, SessionCallbacks,
    StateChangeCallback,
};
pub use config::{ReconnectionConfig, ReconnectionConfigBuilder};
pub use error::{BoxError, CallbackError};
pub use manager::ReconnectionManager;
pub use metrics::{
    CallbackFailureMetrics, ConnectionStatus, MetricsSnapshot, ReconnectionMetrics,
};
pub use state::{ConnectionId, DisconnectReason, ReconnectionAttempt, SessionState};
