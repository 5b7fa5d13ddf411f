//! Reconnection policy configuration.

use std::collections::HashSet;
use std::time::Duration;

use crate::state::DisconnectReason;

/// Policy governing automatic reconnection for one session.
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    pub(crate) enabled: bool,
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) backoff_multiplier: f64,
    pub(crate) jitter_factor: f64,
    pub(crate) max_attempts: u32,
    pub(crate) reset_delay_after_success: Duration,
    pub(crate) permanent_failure_reasons: HashSet<DisconnectReason>,
}

impl ReconnectionConfig {
    /// Creates a new builder with default settings.
    pub fn builder() -> ReconnectionConfigBuilder {
        ReconnectionConfigBuilder::new()
    }

    /// Whether automatic reconnection is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Delay before the first reconnection attempt.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Hard cap on any computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Multiplicative growth factor between attempts.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Randomization factor applied to each delay (0.0 to 1.0).
    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Maximum number of retries per disconnect episode.
    ///
    /// Counts retries only, not the original connection.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sustained-connection time after which the base delay resets.
    pub fn reset_delay_after_success(&self) -> Duration {
        self.reset_delay_after_success
    }

    /// Disconnect reasons that terminate reconnection immediately.
    pub fn permanent_failure_reasons(&self) -> &HashSet<DisconnectReason> {
        &self.permanent_failure_reasons
    }

    /// Checks whether the given reason rules out any retry.
    pub fn is_permanent(&self, reason: DisconnectReason) -> bool {
        self.permanent_failure_reasons.contains(&reason)
    }
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        ReconnectionConfigBuilder::new().build()
    }
}

/// Builder for constructing a [`ReconnectionConfig`].
#[derive(Debug, Clone)]
pub struct ReconnectionConfigBuilder {
    enabled: bool,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_factor: f64,
    max_attempts: u32,
    reset_delay_after_success: Duration,
    permanent_failure_reasons: HashSet<DisconnectReason>,
}

impl ReconnectionConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
            reset_delay_after_success: Duration::from_millis(300_000),
            permanent_failure_reasons: [
                DisconnectReason::AuthenticationFailed,
                DisconnectReason::RateLimited,
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Enables or disables automatic reconnection.
    ///
    /// Default: true
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the delay before the first reconnection attempt.
    ///
    /// Default: 1 second
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the hard cap on any computed delay.
    ///
    /// Default: 30 seconds
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplicative growth factor between attempts.
    ///
    /// Values below 1.0 are clamped to 1.0.
    ///
    /// Default: 2.0
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the randomization factor applied to each delay.
    ///
    /// Clamped into `[0.0, 1.0]`.
    ///
    /// Default: 0.1
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Sets the maximum number of retries per disconnect episode.
    ///
    /// Default: 10
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets how long a connection must hold before the base delay resets.
    ///
    /// Default: 5 minutes
    pub fn reset_delay_after_success(mut self, delay: Duration) -> Self {
        self.reset_delay_after_success = delay;
        self
    }

    /// Replaces the set of disconnect reasons that terminate reconnection.
    ///
    /// Default: `{AuthenticationFailed, RateLimited}`
    pub fn permanent_failure_reasons<I>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = DisconnectReason>,
    {
        self.permanent_failure_reasons = reasons.into_iter().collect();
        self
    }

    /// Adds one disconnect reason to the permanent set.
    pub fn permanent_failure_reason(mut self, reason: DisconnectReason) -> Self {
        self.permanent_failure_reasons.insert(reason);
        self
    }

    /// Builds the [`ReconnectionConfig`], normalizing out-of-range values.
    pub fn build(self) -> ReconnectionConfig {
        ReconnectionConfig {
            enabled: self.enabled,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay.max(self.initial_delay),
            backoff_multiplier: self.backoff_multiplier.max(1.0),
            jitter_factor: self.jitter_factor.clamp(0.0, 1.0),
            max_attempts: self.max_attempts,
            reset_delay_after_success: self.reset_delay_after_success,
            permanent_failure_reasons: self.permanent_failure_reasons,
        }
    }
}

impl Default for ReconnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
