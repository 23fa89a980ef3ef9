// ── Stream reconciler ──
//
// Merges snapshots and push events into one ordered, id-unique message
// list. Every effective change rebuilds the snapshot that subscribers
// receive through a `watch` channel; no-op merges publish nothing.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{InboundEvent, Message, MessageId};
use crate::stream::MessageStream;

/// Successive snapshots a deleted id must be missing from before it is forgotten.
const TOMBSTONE_SNAPSHOT_MISSES: u8 = 3;

/// Outcome of applying one [`InboundEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new message was appended.
    Inserted,
    /// The message was already visible; nothing changed.
    Duplicate,
    /// A visible message was removed.
    Removed,
    /// The deletion named a message that is not visible; nothing changed.
    Absent,
    /// The message was deleted earlier in this session and stays hidden.
    Suppressed,
}

/// Owner of the visible message list.
///
/// Order is local append order. Ids are unique: inserting a known id is a
/// no-op and deleting an unknown id is a no-op, so the same creation seen
/// through both push and poll never shows twice.
///
/// Deleted ids are remembered as tombstones. A creation that arrives after
/// its own deletion is suppressed, which makes the outcome independent of
/// which of the two events is seen first. A tombstone is dropped once
/// three successive snapshots have not listed its id, so the map stays
/// bounded by the deletions the server still reports plus those seen
/// within the last few polls.
pub struct Reconciler {
    entries: IndexMap<MessageId, Arc<Message>>,
    /// Deleted id -> successive snapshots it has been missing from.
    deleted: HashMap<MessageId, u8>,
    snapshot: watch::Sender<Arc<Vec<Arc<Message>>>>,
}

impl Reconciler {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: IndexMap::new(),
            deleted: HashMap::new(),
            snapshot,
        }
    }

    /// Merge one event from either transport.
    pub fn apply_event(&mut self, event: InboundEvent) -> Applied {
        let applied = match event {
            InboundEvent::NewMessage(message) => {
                if self.deleted.contains_key(&message.id) {
                    Applied::Suppressed
                } else if self.entries.contains_key(&message.id) {
                    Applied::Duplicate
                } else {
                    self.entries.insert(message.id.clone(), Arc::new(message));
                    Applied::Inserted
                }
            }
            InboundEvent::MessageDeleted { message_id } => {
                // shift_remove keeps the remaining order intact
                let removed = self.entries.shift_remove(&message_id).is_some();
                self.deleted.insert(message_id, 0);
                if removed {
                    Applied::Removed
                } else {
                    Applied::Absent
                }
            }
        };

        if matches!(applied, Applied::Inserted | Applied::Removed) {
            self.rebuild_snapshot();
        }
        applied
    }

    /// Replace the list with a full snapshot if it differs from what is shown.
    ///
    /// Repeated ids inside `messages` keep their first occurrence, and ids
    /// already seen deleted are dropped. Returns `true` if the visible list
    /// changed.
    pub fn apply_snapshot(&mut self, messages: Vec<Message>) -> bool {
        for misses in self.deleted.values_mut() {
            *misses = misses.saturating_add(1);
        }

        let mut incoming: IndexMap<MessageId, Arc<Message>> = IndexMap::with_capacity(messages.len());
        for message in messages {
            if let Some(misses) = self.deleted.get_mut(&message.id) {
                *misses = 0;
                continue;
            }
            incoming
                .entry(message.id.clone())
                .or_insert_with(|| Arc::new(message));
        }
        self.deleted
            .retain(|_, misses| *misses < TOMBSTONE_SNAPSHOT_MISSES);

        if self.same_as(&incoming) {
            return false;
        }

        self.entries = incoming;
        self.rebuild_snapshot();
        true
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Message>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> MessageStream {
        MessageStream::new(self.snapshot.subscribe())
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Arc<Vec<Arc<Message>>>> {
        self.snapshot.subscribe()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Structural equality: same ids in the same order with the same content.
    fn same_as(&self, other: &IndexMap<MessageId, Arc<Message>>) -> bool {
        self.entries.len() == other.len()
            && self
                .entries
                .values()
                .zip(other.values())
                .all(|(a, b)| a == b)
    }

    fn rebuild_snapshot(&self) {
        let values: Vec<Arc<Message>> = self.entries.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn msg(id: &str, content: &str) -> Message {
        Message {
            id: MessageId::from(id),
            username: "alice".into(),
            content: content.into(),
            is_admin: false,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn ids(r: &Reconciler) -> Vec<String> {
        r.snapshot().iter().map(|m| m.id.to_string()).collect()
    }

    fn deleted(id: &str) -> InboundEvent {
        InboundEvent::MessageDeleted {
            message_id: MessageId::from(id),
        }
    }

    #[test]
    fn new_message_is_idempotent() {
        let mut r = Reconciler::new();
        assert_eq!(r.apply_event(InboundEvent::NewMessage(msg("m1", "hi"))), Applied::Inserted);
        assert_eq!(r.apply_event(InboundEvent::NewMessage(msg("m1", "hi"))), Applied::Duplicate);
        assert_eq!(ids(&r), vec!["m1"]);
    }

    #[test]
    fn deletion_before_creation_is_silent() {
        let mut r = Reconciler::new();
        assert_eq!(r.apply_event(deleted("m1")), Applied::Absent);
        assert!(r.is_empty());
    }

    #[test]
    fn deletion_then_creation_stays_deleted() {
        let mut r = Reconciler::new();
        r.apply_event(deleted("m1"));
        assert_eq!(r.apply_event(InboundEvent::NewMessage(msg("m1", "hi"))), Applied::Suppressed);
        assert!(!r.contains(&MessageId::from("m1")));
    }

    #[test]
    fn stale_snapshot_does_not_resurrect_deleted() {
        let mut r = Reconciler::new();
        r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]);
        r.apply_event(deleted("m1"));
        // A poll that raced the deletion still lists m1.
        assert!(!r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]));
        assert_eq!(ids(&r), vec!["m2"]);
    }

    #[test]
    fn tombstone_is_forgotten_after_successive_missing_snapshots() {
        let mut r = Reconciler::new();
        r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]);
        r.apply_event(deleted("m1"));

        // Listing the id again resets the count.
        r.apply_snapshot(vec![msg("m2", "yo")]);
        r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]);
        r.apply_snapshot(vec![msg("m2", "yo")]);
        r.apply_snapshot(vec![msg("m2", "yo")]);
        assert!(r.deleted.contains_key(&MessageId::from("m1")));

        r.apply_snapshot(vec![msg("m2", "yo")]);
        assert!(r.deleted.is_empty());
        assert_eq!(ids(&r), vec!["m2"]);
    }

    #[test]
    fn deletions_between_snapshots_stay_bounded() {
        let mut r = Reconciler::new();
        for round in 0..50 {
            let id = format!("m{round}");
            r.apply_event(InboundEvent::NewMessage(msg(&id, "x")));
            r.apply_event(deleted(&id));
            r.apply_snapshot(Vec::new());
        }
        assert!(r.deleted.len() <= usize::from(TOMBSTONE_SNAPSHOT_MISSES));
    }

    #[test]
    fn deletion_preserves_order_of_the_rest() {
        let mut r = Reconciler::new();
        for id in ["a", "b", "c"] {
            r.apply_event(InboundEvent::NewMessage(msg(id, id)));
        }
        assert_eq!(r.apply_event(deleted("b")), Applied::Removed);
        assert_eq!(ids(&r), vec!["a", "c"]);
    }

    #[test]
    fn identical_snapshot_does_not_republish() {
        let mut r = Reconciler::new();
        let mut rx = r.watch();
        assert!(r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!r.apply_snapshot(vec![msg("m1", "hi"), msg("m2", "yo")]));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut r = Reconciler::new();
        r.apply_event(InboundEvent::NewMessage(msg("stale", "gone soon")));
        assert!(r.apply_snapshot(vec![msg("m1", "hi")]));
        assert_eq!(ids(&r), vec!["m1"]);
        assert!(!r.contains(&MessageId::from("stale")));
    }

    #[test]
    fn snapshot_with_repeated_ids_keeps_first() {
        let mut r = Reconciler::new();
        r.apply_snapshot(vec![msg("m1", "first"), msg("m2", "x"), msg("m1", "second")]);
        assert_eq!(ids(&r), vec!["m1", "m2"]);
        assert_eq!(r.snapshot()[0].content, "first");
    }

    #[test]
    fn push_echo_after_poll_is_deduplicated() {
        let mut r = Reconciler::new();
        r.apply_snapshot(vec![msg("m1", "hi")]);
        assert_eq!(r.apply_event(InboundEvent::NewMessage(msg("m1", "hi"))), Applied::Duplicate);
        assert_eq!(r.len(), 1);
    }
}
