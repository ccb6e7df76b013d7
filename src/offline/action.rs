//! Pending Actions
//!
//! Locally-applied mutations waiting to reach the server.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Kind of mutation carried by a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddToCart,
    RemoveFromCart,
    UpdateQuantity,
    AddFavorite,
    RemoveFavorite,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddToCart => "add_to_cart",
            ActionType::RemoveFromCart => "remove_from_cart",
            ActionType::UpdateQuantity => "update_quantity",
            ActionType::AddFavorite => "add_favorite",
            ActionType::RemoveFavorite => "remove_favorite",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drain priority; `High` jumps the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for ActionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPriority::High => write!(f, "high"),
            ActionPriority::Medium => write!(f, "medium"),
            ActionPriority::Low => write!(f, "low"),
        }
    }
}

/// One entry of the sync outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// `action_<millis>_<random>`
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub payload: Value,
    /// Creation time (Unix millis)
    pub timestamp: i64,
    /// Failed sync passes so far
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub priority: ActionPriority,
}

impl PendingAction {
    pub fn new(action_type: ActionType, payload: Value, priority: ActionPriority, now_ms: i64) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("action_{}_{}", now_ms, &suffix[..9]),
            action_type,
            payload,
            timestamp: now_ms,
            retries: 0,
            priority,
        }
    }

    /// Product the action refers to, if the payload names one
    pub fn product_id(&self) -> Option<&str> {
        self.payload.get("productId").and_then(Value::as_str)
    }
}

/// Payload for cart actions that carry a quantity
pub fn quantity_payload(product_id: &str, quantity: u32) -> Value {
    json!({ "productId": product_id, "quantity": quantity })
}

/// Payload for actions that only name a product
pub fn product_payload(product_id: &str) -> Value {
    json!({ "productId": product_id })
}
