// ── Reconnect policy ──
//
// Pure state machine deciding what happens after the push channel opens
// or closes. It performs no I/O and reads no clock; every transition
// returns a `Directive` that the transport selector carries out.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::ReconnectConfig;
use crate::model::ConnectionMode;

// ── LinkState ───────────────────────────────────────────────────────

/// Where the session's delivery path currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    Idle,
    PushConnecting,
    PushOpen,
    /// Waiting to retry; `attempt` is the retry count when the wait began.
    Backoff { attempt: u32 },
    /// Terminal: snapshots are polled for the rest of the session.
    Polling,
}

// ── Directive ───────────────────────────────────────────────────────

/// Action the selector must take after a policy transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Open the push channel now.
    Connect,
    /// Tear down and retry the push channel after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Tear down and switch to snapshot polling.
    StartPolling,
}

// ── ReconnectPolicy ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    state: LinkState,
    retry_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: LinkState::Idle,
            retry_count: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Backoff before retry `attempt` (0-based): `base_delay * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay))
    }

    /// Session start. Only meaningful from `Idle`.
    pub fn start(&mut self) -> Option<Directive> {
        if self.state != LinkState::Idle {
            return None;
        }
        self.state = LinkState::PushConnecting;
        Some(Directive::Connect)
    }

    /// The pending connect succeeded.
    pub fn on_open(&mut self) {
        if self.state == LinkState::PushConnecting {
            self.state = LinkState::PushOpen;
            self.retry_count = 0;
        }
    }

    /// The channel closed, errored, or failed to open.
    ///
    /// Returns `None` when no push attempt is in flight (a stale close
    /// after the session already fell back).
    pub fn on_closed(&mut self) -> Option<Directive> {
        if !matches!(self.state, LinkState::PushConnecting | LinkState::PushOpen) {
            return None;
        }

        let attempt = self.retry_count;
        let give_up = attempt >= self.config.max_retries
            || (attempt == 0 && self.config.first_failure_polls);

        if give_up {
            self.state = LinkState::Polling;
            return Some(Directive::StartPolling);
        }

        self.state = LinkState::Backoff { attempt };
        Some(Directive::Retry {
            attempt,
            delay: self.delay(attempt),
        })
    }

    /// The backoff timer fired.
    pub fn on_retry_due(&mut self) -> Option<Directive> {
        let LinkState::Backoff { .. } = self.state else {
            return None;
        };
        self.retry_count += 1;
        self.state = LinkState::PushConnecting;
        Some(Directive::Connect)
    }

    /// Delivery mode as shown to users.
    pub fn mode(&self) -> ConnectionMode {
        match self.state {
            LinkState::PushOpen => ConnectionMode::Push,
            LinkState::Polling => ConnectionMode::Poll,
            LinkState::Idle | LinkState::PushConnecting | LinkState::Backoff { .. } => {
                ConnectionMode::Disconnected
            }
        }
    }

    pub(crate) fn status(&self, snapshot_failed: bool) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            retry_count: self.retry_count,
            max_retries: self.config.max_retries,
            snapshot_failed,
        }
    }
}

// ── ConnectionStatus ────────────────────────────────────────────────

/// Observable link status, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    #[serde(flatten)]
    pub state: LinkState,
    pub retry_count: u32,
    pub max_retries: u32,
    /// The most recent snapshot load failed.
    pub snapshot_failed: bool,
}

impl ConnectionStatus {
    pub fn initial(max_retries: u32) -> Self {
        Self {
            state: LinkState::Idle,
            retry_count: 0,
            max_retries,
            snapshot_failed: false,
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        match self.state {
            LinkState::PushOpen => ConnectionMode::Push,
            LinkState::Polling if !self.snapshot_failed => ConnectionMode::Poll,
            _ => ConnectionMode::Disconnected,
        }
    }

    /// Short status line for display.
    pub fn label(&self) -> String {
        match self.state {
            LinkState::Idle => "disconnected".into(),
            LinkState::PushConnecting if self.retry_count == 0 => "connecting".into(),
            LinkState::PushConnecting => {
                format!("reconnecting {}/{}", self.retry_count, self.max_retries)
            }
            LinkState::Backoff { attempt } => {
                format!("reconnecting {}/{}", attempt + 1, self.max_retries)
            }
            LinkState::PushOpen => "connected".into(),
            LinkState::Polling if self.snapshot_failed => "disconnected".into(),
            LinkState::Polling => "connected (polling)".into(),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
