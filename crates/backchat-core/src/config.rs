// ── Runtime session configuration ──
//
// These types describe *how* a session talks to the chat server and how
// it recovers from push-channel failures. They never touch disk: the CLI
// (via backchat-config) constructs a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Default spacing between snapshot polls once the session has fallen back.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Admin login credentials.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: SecretString,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

/// Retry schedule for the push channel.
///
/// Attempt `n` (0-based) waits `base_delay * 2^n`, capped at `max_delay`.
/// Once `max_retries` retries have failed the session switches to polling
/// for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub base_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Retries before giving up on push. Default: 3.
    pub max_retries: u32,

    /// Fall back to polling on the very first closure instead of backing off.
    pub first_failure_polls: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            first_failure_polls: false,
        }
    }
}

/// Configuration for one chat session against a single server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server base URL (e.g., `https://chat.example.com`).
    pub url: Url,
    /// TLS verification strategy for REST calls.
    pub tls: TlsVerification,
    /// Per-request timeout for REST calls.
    pub timeout: Duration,
    /// Push-channel retry schedule.
    pub reconnect: ReconnectConfig,
    /// Poll cadence after falling back from push.
    pub poll_interval: Duration,
    /// Max messages per snapshot. `None` leaves it to the server.
    pub snapshot_limit: Option<u32>,
}

impl SessionConfig {
    /// A config for `url` with every other knob at its default.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            snapshot_limit: None,
        }
    }

    /// Reject settings the event loop cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::ValidationFailed {
                message: "poll interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_schedule() {
        let config = SessionConfig::new("http://localhost:8001".parse().unwrap());
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_retries, 3);
        assert!(!config.reconnect.first_failure_polls);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_poll_interval_is_invalid() {
        let mut config = SessionConfig::new("http://localhost:8001".parse().unwrap());
        config.poll_interval = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(CoreError::ValidationFailed { .. })
        ));
    }
}
