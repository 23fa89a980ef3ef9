// ── Transport selector ──
//
// Owns whichever delivery resource is live: a pending connect, an open
// push channel, a backoff timer, or the poll interval. They share one
// slot, so entering any of them tears down the previous one and two can
// never be active at once.

use std::pin::Pin;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::debug;

use backchat_api::PushChannel;

use crate::error::CoreError;
use crate::model::InboundEvent;

/// Shortest poll period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A push-channel open in flight. Dropping it aborts the handshake.
pub type PendingConnect = BoxFuture<'static, Result<PushChannel, CoreError>>;

enum ActiveTransport {
    Idle,
    Connecting(PendingConnect),
    Push(PushChannel),
    Backoff(Pin<Box<Sleep>>),
    Polling(Interval),
}

/// Which resource the selector currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Idle,
    Connecting,
    Push,
    Backoff,
    Polling,
}

/// What happened on the active resource.
#[derive(Debug)]
pub enum TransportEvent {
    /// The pending connect produced an open channel.
    Opened,
    /// The pending connect failed. The selector is idle again.
    ConnectFailed(CoreError),
    /// A frame arrived on the push channel.
    Inbound(InboundEvent),
    /// The push channel closed. The selector is idle again.
    Closed,
    /// The backoff timer fired. The selector is idle again.
    RetryDue,
    /// Time to load a snapshot.
    PollTick,
}

pub struct TransportSelector {
    active: ActiveTransport,
    poll_interval: Duration,
}

impl TransportSelector {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            active: ActiveTransport::Idle,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn kind(&self) -> TransportKind {
        match self.active {
            ActiveTransport::Idle => TransportKind::Idle,
            ActiveTransport::Connecting(_) => TransportKind::Connecting,
            ActiveTransport::Push(_) => TransportKind::Push,
            ActiveTransport::Backoff(_) => TransportKind::Backoff,
            ActiveTransport::Polling(_) => TransportKind::Polling,
        }
    }

    /// A push channel is open or being opened.
    pub fn is_push_active(&self) -> bool {
        matches!(
            self.active,
            ActiveTransport::Connecting(_) | ActiveTransport::Push(_)
        )
    }

    pub fn is_poll_active(&self) -> bool {
        matches!(self.active, ActiveTransport::Polling(_))
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Start opening the push channel.
    pub fn open_push(&mut self, connect: PendingConnect) {
        self.teardown();
        self.active = ActiveTransport::Connecting(connect);
    }

    /// Arm the backoff timer.
    pub fn schedule_retry(&mut self, delay: Duration) {
        self.teardown();
        self.active = ActiveTransport::Backoff(Box::pin(tokio::time::sleep(delay)));
    }

    /// Start the poll interval. The first tick comes one period from now.
    pub fn start_polling(&mut self) {
        self.teardown();
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.active = ActiveTransport::Polling(interval);
    }

    /// Release whatever is active. Idempotent.
    pub fn teardown(&mut self) {
        match std::mem::replace(&mut self.active, ActiveTransport::Idle) {
            ActiveTransport::Idle => {}
            ActiveTransport::Connecting(_) => debug!("abandoning pending push connect"),
            ActiveTransport::Push(channel) => {
                channel.close();
                debug!("push channel closed");
            }
            ActiveTransport::Backoff(_) => debug!("backoff timer cancelled"),
            ActiveTransport::Polling(_) => debug!("poll interval stopped"),
        }
    }

    // ── Event source ─────────────────────────────────────────────────

    /// Wait for the next event on the active resource.
    ///
    /// Pends forever while idle. Cancel-safe: dropping the future before
    /// it resolves leaves the active resource untouched.
    pub async fn next(&mut self) -> TransportEvent {
        match &mut self.active {
            ActiveTransport::Idle => std::future::pending().await,
            ActiveTransport::Connecting(pending) => match pending.await {
                Ok(channel) => {
                    self.active = ActiveTransport::Push(channel);
                    TransportEvent::Opened
                }
                Err(e) => {
                    self.active = ActiveTransport::Idle;
                    TransportEvent::ConnectFailed(e)
                }
            },
            ActiveTransport::Push(channel) => match channel.recv().await {
                Some(event) => TransportEvent::Inbound(event),
                None => {
                    self.teardown();
                    TransportEvent::Closed
                }
            },
            ActiveTransport::Backoff(timer) => {
                timer.as_mut().await;
                self.active = ActiveTransport::Idle;
                TransportEvent::RetryDue
            }
            ActiveTransport::Polling(interval) => {
                interval.tick().await;
                TransportEvent::PollTick
            }
        }
    }
}

impl Drop for TransportSelector {
    fn drop(&mut self) {
        self.teardown();
    }
}
