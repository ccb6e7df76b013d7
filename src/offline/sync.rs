//! Default sync endpoint
//!
//! There is no storefront backend yet, so delivery is a structured log
//! line per action. Payloads are still checked so malformed actions fail
//! the same way they would against a real server.

use crate::domain::ports::SyncEndpoint;
use crate::error::{Error, Result};
use crate::offline::action::{ActionType, PendingAction};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingSyncEndpoint {
    delivered: AtomicU64,
}

impl LoggingSyncEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions accepted since creation
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

fn reject(action: &PendingAction, reason: &str) -> Error {
    Error::SyncFailed {
        action_id: action.id.clone(),
        action_type: action.action_type.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl SyncEndpoint for LoggingSyncEndpoint {
    async fn execute(&self, action: &PendingAction) -> Result<()> {
        let product_id = action
            .product_id()
            .ok_or_else(|| reject(action, "payload has no productId"))?;

        match action.action_type {
            ActionType::AddToCart | ActionType::UpdateQuantity => {
                let quantity = action
                    .payload
                    .get("quantity")
                    .and_then(|q| q.as_u64())
                    .ok_or_else(|| reject(action, "payload has no quantity"))?;
                info!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    product_id,
                    quantity,
                    "Syncing cart change"
                );
            }
            ActionType::RemoveFromCart => {
                info!(action_id = %action.id, product_id, "Syncing remove from cart");
            }
            ActionType::AddFavorite | ActionType::RemoveFavorite => {
                info!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    product_id,
                    "Syncing favorite"
                );
            }
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
