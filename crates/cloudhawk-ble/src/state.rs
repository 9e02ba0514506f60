//! State store: the mutable holder of a mower's last-known state
//!
//! Wraps the pure merge logic from `cloudhawk-core` with the locking and
//! event plumbing the client needs. The merge itself is fast and
//! non-blocking so the notification delivery path is never held up;
//! slower downstream consumers hang off the broadcast channel instead.

use chrono::{DateTime, Utc};
use cloudhawk_core::{MowerState, StateChangeSet, StateUpdate};
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

/// Thread-safe store for one mower's state
pub struct StateStore {
    state: RwLock<MowerState>,
    /// Non-empty change sets only; downstream observers need not see
    /// frames that repeated known values
    changes_tx: broadcast::Sender<StateChangeSet>,
    /// Bumped on every applied frame, including no-change ones; this is
    /// what command acknowledgement and staleness detection watch
    updated_tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(64);
        let (updated_tx, _) = watch::channel(None);
        Self {
            state: RwLock::new(MowerState::default()),
            changes_tx,
            updated_tx,
        }
    }

    /// Merge a decoded update, returning the set of changed fields.
    /// Broadcasts the change set when it is non-empty.
    pub fn apply(&self, update: StateUpdate) -> StateChangeSet {
        let observed_at = Utc::now();
        let changes = self.state.write().apply(update, observed_at);
        self.updated_tx.send_replace(Some(observed_at));
        if !changes.is_empty() {
            let _ = self.changes_tx.send(changes.clone());
        }
        changes
    }

    /// Clear back to unknown. Called once per transport-session lifetime,
    /// before the first post-reconnect frame is applied.
    pub fn reset(&self) {
        self.state.write().reset();
        self.updated_tx.send_replace(None);
    }

    /// Immutable copy of the current state; the only external read path
    pub fn snapshot(&self) -> MowerState {
        self.state.read().clone()
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_updated_at
    }

    /// Subscribe to non-empty change sets
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangeSet> {
        self.changes_tx.subscribe()
    }

    /// Watch the apply timestamp; fires on every applied frame
    pub fn watch_updates(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.updated_tx.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use cloudhawk_core::MowerStatus;

    use super::*;

    #[test]
    fn apply_broadcasts_only_real_changes() {
        let store = StateStore::new();
        let mut changes = store.subscribe();

        let update = StateUpdate {
            status: Some(MowerStatus::Mowing),
            ..Default::default()
        };
        store.apply(update.clone());
        assert!(changes.try_recv().is_ok());

        // Same frame again: timestamp advances, no event
        store.apply(update);
        assert!(changes.try_recv().is_err());
        assert!(store.last_updated_at().is_some());
    }

    #[test]
    fn reset_returns_snapshot_to_unknown() {
        let store = StateStore::new();
        store.apply(StateUpdate {
            status: Some(MowerStatus::Docked),
            battery_percent: Some(90),
            ..Default::default()
        });

        store.reset();
        let snapshot = store.snapshot();
        assert_eq!(snapshot, MowerState::default());
        assert!(snapshot.last_updated_at.is_none());
    }

    #[test]
    fn update_watch_fires_on_every_apply() {
        let store = StateStore::new();
        let mut updates = store.watch_updates();
        updates.borrow_and_update();

        store.apply(StateUpdate::default());
        assert!(updates.has_changed().unwrap());
    }
}
