//! Sync Outbox
//!
//! Durable queue of pending actions. Every mutation happens under one
//! async mutex and is written through to the durable store before the
//! lock is released, so concurrent enqueues can never lose each other.

use crate::domain::ports::DurableStoreRef;
use crate::error::Result;
use crate::offline::action::{ActionPriority, PendingAction};
use crate::storage::StorageKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Failed passes after which an action is dropped
pub const MAX_RETRIES: u32 = 3;

#[derive(Default)]
struct State {
    queue: VecDeque<PendingAction>,
    /// Actions handed to the running pass, persisted ahead of `queue`
    in_flight: Vec<PendingAction>,
}

impl State {
    fn durable(&self) -> Vec<&PendingAction> {
        self.in_flight.iter().chain(self.queue.iter()).collect()
    }
}

pub struct Outbox {
    store: DurableStoreRef,
    state: Mutex<State>,
    /// Mirror of `queue.len()` readable without awaiting
    len: AtomicUsize,
}

impl Outbox {
    /// Create an empty outbox; call [`load`](Self::load) to restore state
    pub fn new(store: DurableStoreRef) -> Self {
        Self {
            store,
            state: Mutex::new(State::default()),
            len: AtomicUsize::new(0),
        }
    }

    /// Restore the queue from the durable store
    ///
    /// An unreadable outbox is logged and replaced by an empty one.
    pub async fn load(&self) -> usize {
        let key = StorageKey::PendingActions.as_str();
        let restored = match self.store.get_item(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<VecDeque<PendingAction>>(&raw) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable pending actions");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load pending actions");
                VecDeque::new()
            }
        };

        let mut state = self.state.lock().await;
        state.queue = restored;
        state.in_flight.clear();
        self.len.store(state.queue.len(), Ordering::Release);
        debug!(count = state.queue.len(), "Pending actions loaded");
        state.queue.len()
    }

    async fn persist(&self, state: &State) -> Result<()> {
        let raw = serde_json::to_string(&state.durable())?;
        self.store
            .set_item(StorageKey::PendingActions.as_str(), &raw)
            .await
    }

    /// Enqueue an action; `High` goes to the front
    ///
    /// If the write-through fails the action is taken back out and the
    /// error returned.
    pub async fn push(&self, action: PendingAction) -> Result<()> {
        let mut state = self.state.lock().await;
        let high = action.priority == ActionPriority::High;
        let id = action.id.clone();

        if high {
            state.queue.push_front(action);
        } else {
            state.queue.push_back(action);
        }

        if let Err(e) = self.persist(&state).await {
            if high {
                state.queue.pop_front();
            } else {
                state.queue.pop_back();
            }
            return Err(e);
        }

        self.len.store(state.queue.len(), Ordering::Release);
        debug!(action_id = %id, pending = state.queue.len(), "Action queued");
        Ok(())
    }

    /// Take every queued action for a sync pass
    ///
    /// Taken actions stay in the durable copy until
    /// [`finish_pass`](Self::finish_pass), including across pushes made
    /// while the pass runs, so a crash mid-pass replays them.
    pub async fn take_all(&self) -> Vec<PendingAction> {
        let mut state = self.state.lock().await;
        let taken: Vec<_> = state.queue.drain(..).collect();
        state.in_flight.extend(taken.iter().cloned());
        self.len.store(0, Ordering::Release);
        taken
    }

    /// Release the in-flight actions, append the ones that must be
    /// retried, and persist the queue
    pub async fn finish_pass(&self, retry: Vec<PendingAction>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.in_flight.clear();
        state.queue.extend(retry);
        self.len.store(state.queue.len(), Ordering::Release);
        self.persist(&state).await
    }

    /// Empty the queue in memory only
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.in_flight.clear();
        self.len.store(0, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queue in drain order
    pub async fn snapshot(&self) -> Vec<PendingAction> {
        self.state.lock().await.queue.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DurableStore;
    use crate::offline::action::{product_payload, ActionType};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn action(priority: ActionPriority, product: &str) -> PendingAction {
        PendingAction::new(ActionType::AddFavorite, product_payload(product), priority, 1)
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let outbox = Outbox::new(Arc::new(MemoryStore::new()));

        outbox.push(action(ActionPriority::Low, "low")).await.unwrap();
        outbox.push(action(ActionPriority::Medium, "medium")).await.unwrap();
        outbox.push(action(ActionPriority::High, "high")).await.unwrap();

        let order: Vec<_> = outbox
            .snapshot()
            .await
            .iter()
            .map(|a| a.product_id().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["high", "low", "medium"]);
    }

    #[tokio::test]
    async fn test_reload_after_restart() {
        let store = Arc::new(MemoryStore::new());

        let queued = action(ActionPriority::Medium, "p1");
        {
            let outbox = Outbox::new(store.clone());
            outbox.push(queued.clone()).await.unwrap();
        }

        let outbox = Outbox::new(store);
        assert_eq!(outbox.load().await, 1);
        assert_eq!(outbox.snapshot().await, vec![queued]);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::new(store.clone());

        store.set_available(false);
        assert!(outbox.push(action(ActionPriority::High, "p1")).await.is_err());
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn test_pass_keeps_durable_copy_until_finished() {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::new(store.clone());
        outbox.push(action(ActionPriority::Medium, "p1")).await.unwrap();

        let taken = outbox.take_all().await;
        assert_eq!(taken.len(), 1);
        assert!(outbox.is_empty());

        let raw = store.get_item("pending_actions").await.unwrap().unwrap();
        assert!(raw.contains("p1"));

        outbox.finish_pass(Vec::new()).await.unwrap();
        let raw = store.get_item("pending_actions").await.unwrap().unwrap();
        assert_eq!(raw, "[]");
    }

    #[tokio::test]
    async fn test_push_during_pass_keeps_in_flight_durable() {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::new(store.clone());
        outbox.push(action(ActionPriority::Medium, "inflight")).await.unwrap();

        let taken = outbox.take_all().await;
        assert_eq!(taken.len(), 1);
        outbox.push(action(ActionPriority::High, "new")).await.unwrap();
        assert_eq!(outbox.len(), 1);

        // Crash before finish_pass
        let reopened = Outbox::new(store.clone());
        assert_eq!(reopened.load().await, 2);
        let ids: Vec<_> = reopened
            .snapshot()
            .await
            .iter()
            .map(|a| a.product_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["inflight", "new"]);

        outbox.finish_pass(Vec::new()).await.unwrap();
        let reopened = Outbox::new(store);
        assert_eq!(reopened.load().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_outbox_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set_item("pending_actions", "{oops").await.unwrap();

        let outbox = Outbox::new(store);
        assert_eq!(outbox.load().await, 0);
    }
}
