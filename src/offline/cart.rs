//! Offline cart lines and merge rules
//!
//! Adding is additive on an existing line; updating overwrites. One line
//! per product.

use serde::{Deserialize, Serialize};

/// One product in the offline cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    /// Last local change (Unix millis)
    pub timestamp: i64,
}

/// Add `quantity` of `product_id`, merging into an existing line
pub fn merge_add(cart: &mut Vec<CartLine>, product_id: &str, quantity: u32, now_ms: i64) {
    match cart.iter_mut().find(|line| line.product_id == product_id) {
        Some(line) => {
            line.quantity = line.quantity.saturating_add(quantity);
        }
        None => cart.push(CartLine {
            product_id: product_id.to_string(),
            quantity,
            timestamp: now_ms,
        }),
    }
}

/// Drop the line for `product_id`; returns whether one existed
pub fn remove_line(cart: &mut Vec<CartLine>, product_id: &str) -> bool {
    let before = cart.len();
    cart.retain(|line| line.product_id != product_id);
    cart.len() != before
}

/// Overwrite the quantity of an existing line; returns whether one existed
pub fn set_quantity(cart: &mut [CartLine], product_id: &str, quantity: u32, now_ms: i64) -> bool {
    match cart.iter_mut().find(|line| line.product_id == product_id) {
        Some(line) => {
            line.quantity = quantity;
            line.timestamp = now_ms;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_additive() {
        let mut cart = Vec::new();
        merge_add(&mut cart, "p1", 2, 10);
        merge_add(&mut cart, "p1", 3, 20);
        merge_add(&mut cart, "p2", 1, 30);

        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].quantity, 5);
        assert_eq!(cart[0].timestamp, 10);
    }

    #[test]
    fn test_update_overwrites() {
        let mut cart = Vec::new();
        merge_add(&mut cart, "p1", 2, 10);

        assert!(set_quantity(&mut cart, "p1", 7, 50));
        assert_eq!(cart[0].quantity, 7);
        assert_eq!(cart[0].timestamp, 50);
        assert!(!set_quantity(&mut cart, "nope", 1, 50));
    }

    #[test]
    fn test_remove() {
        let mut cart = Vec::new();
        merge_add(&mut cart, "p1", 1, 0);
        assert!(remove_line(&mut cart, "p1"));
        assert!(!remove_line(&mut cart, "p1"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_wire_format() {
        let line = CartLine {
            product_id: "fruit1".into(),
            quantity: 2,
            timestamp: 5,
        };
        assert_eq!(
            serde_json::to_string(&line).unwrap(),
            r#"{"productId":"fruit1","quantity":2,"timestamp":5}"#
        );
    }
}
