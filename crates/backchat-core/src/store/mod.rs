// ── Message store ──
//
// The reconciler that owns the visible message list and publishes
// immutable snapshots to subscribers.

mod reconciler;

pub use reconciler::{Applied, Reconciler};
