//! Session identity, lifecycle states, and attempt records.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opaque key distinguishing one logical session.
///
/// Cheap to clone; managers for different identities share no mutable state.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Creates a new identity from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Lifecycle state of one managed session.
///
/// `Failed` and `Disabled` are terminal: no further automatic attempts occur
/// until a fresh disconnect/connect cycle re-arms the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection; nothing in flight.
    Disconnected,
    /// A connect attempt is executing.
    Connecting,
    /// Connected and healthy.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Reconnection gave up (permanent reason or attempts exhausted).
    Failed,
    /// Reconnection is disabled by configuration.
    Disabled,
}

impl SessionState {
    /// Returns true for states that end a disconnect episode without recovery.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Disabled)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Failed => "failed",
            SessionState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the transport reported a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Clean shutdown initiated by either side.
    NormalClosure,
    /// The connection dropped with a transport-level error.
    ConnectionError,
    /// The peer stopped answering heartbeats.
    HeartbeatTimeout,
    /// The session credentials were rejected.
    AuthenticationFailed,
    /// The peer is shedding load from this client.
    RateLimited,
    /// The server reported an internal error before closing.
    ServerError,
    /// The local network path went away.
    NetworkError,
    /// Anything the transport could not classify.
    Unknown,
}

impl DisconnectReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::NormalClosure => "normal_closure",
            DisconnectReason::ConnectionError => "connection_error",
            DisconnectReason::HeartbeatTimeout => "heartbeat_timeout",
            DisconnectReason::AuthenticationFailed => "authentication_failed",
            DisconnectReason::RateLimited => "rate_limited",
            DisconnectReason::ServerError => "server_error",
            DisconnectReason::NetworkError => "network_error",
            DisconnectReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded reconnection attempt.
///
/// Records are append-only while a retry loop runs and cleared only through
/// [`ReconnectionManager::clear_history`](crate::ReconnectionManager::clear_history).
#[derive(Debug, Clone)]
pub struct ReconnectionAttempt {
    /// 1-based attempt counter within the current disconnect episode.
    pub attempt_number: u32,
    /// When the attempt was scheduled.
    pub started_at: Instant,
    /// Backoff delay waited before the connect callback ran.
    pub delay: Duration,
    /// Whether the connect callback completed successfully.
    pub success: bool,
    /// Error text from a failed connect callback, if any.
    pub error_message: Option<String>,
    /// How long the connect callback ran.
    pub duration: Duration,
}
