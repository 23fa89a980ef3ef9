// ── Reactive message stream ──
//
// Subscription type for consuming changes to the visible message list.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Message;

type Snapshot = Arc<Vec<Arc<Message>>>;

/// A subscription to the visible message list.
///
/// Gives point-in-time access through [`current`](Self::current) and
/// change notification through [`changed`](Self::changed) or by converting
/// into a `Stream`.
pub struct MessageStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl MessageStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// The latest published snapshot.
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the session has shut down.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The first item is the snapshot current at conversion time.
    pub fn into_stream(self) -> MessageWatchStream {
        MessageWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a fresh snapshot on every effective change.
pub struct MessageWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for MessageWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;

    use super::*;
    use crate::model::{InboundEvent, MessageId};
    use crate::store::Reconciler;

    fn event(id: &str) -> InboundEvent {
        InboundEvent::NewMessage(Message {
            id: MessageId::from(id),
            username: "bob".into(),
            content: "hey".into(),
            is_admin: false,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn changed_tracks_reconciler() {
        let mut reconciler = Reconciler::new();
        let mut stream = reconciler.subscribe();
        assert!(stream.current().is_empty());

        reconciler.apply_event(event("m1"));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn stream_ends_when_reconciler_drops() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_event(event("m1"));
        let mut stream = reconciler.subscribe().into_stream();

        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1);

        drop(reconciler);
        assert!(stream.next().await.is_none());
    }
}
