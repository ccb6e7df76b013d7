//! Sync status and its observers
//!
//! Observers are plain callbacks invoked synchronously on every
//! transition, in registration order. The callback list is cloned before
//! dispatch, so a callback may register or unregister others.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State of the outbox synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Offline,
    Error,
    Completed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Offline => write!(f, "offline"),
            SyncStatus::Error => write!(f, "error"),
            SyncStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type StatusCallback = Arc<dyn Fn(SyncStatus) + Send + Sync>;

/// Current status plus the callbacks watching it
pub struct StatusBoard {
    current: Mutex<SyncStatus>,
    observers: Mutex<Vec<(SubscriptionId, StatusCallback)>>,
    next_id: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(SyncStatus::Idle),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> SyncStatus {
        *self.current.lock()
    }

    /// Record a transition and notify every observer
    pub fn set(&self, status: SyncStatus) {
        *self.current.lock() = status;
        self.notify(status);
    }

    /// Transition only if the current status is `expected`
    pub fn set_if(&self, expected: SyncStatus, status: SyncStatus) -> bool {
        {
            let mut current = self.current.lock();
            if *current != expected {
                return false;
            }
            *current = status;
        }
        self.notify(status);
        true
    }

    fn notify(&self, status: SyncStatus) {
        let observers: Vec<StatusCallback> = self
            .observers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in observers {
            callback(status);
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let board = StatusBoard::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&log);
        board.subscribe(move |s| first.lock().push(format!("a:{s}")));
        let second = Arc::clone(&log);
        board.subscribe(move |s| second.lock().push(format!("b:{s}")));

        board.set(SyncStatus::Syncing);
        assert_eq!(*log.lock(), vec!["a:syncing", "b:syncing"]);
        assert_eq!(board.get(), SyncStatus::Syncing);
    }

    #[test]
    fn test_unsubscribe() {
        let board = StatusBoard::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = board.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        board.set(SyncStatus::Completed);
        assert!(board.unsubscribe(id));
        assert!(!board.unsubscribe(id));
        board.set(SyncStatus::Idle);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(board.observer_count(), 0);
    }

    #[test]
    fn test_set_if() {
        let board = StatusBoard::new();
        assert!(!board.set_if(SyncStatus::Completed, SyncStatus::Idle));
        board.set(SyncStatus::Completed);
        assert!(board.set_if(SyncStatus::Completed, SyncStatus::Idle));
        assert_eq!(board.get(), SyncStatus::Idle);
    }
}
