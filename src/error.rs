//! Error types for the offline engine
//!
//! Provides structured error types for the durable store adapters, the
//! smart cache, the sync outbox and the network adaptation layer.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the offline engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Durable Store Errors
    // =========================================================================
    #[error("Durable store unavailable: {store}")]
    StoreUnavailable { store: String },

    #[error("Durable store {operation} failed for key {key}: {reason}")]
    StoreOperation {
        operation: String,
        key: String,
        reason: String,
    },

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    // =========================================================================
    // Sync Errors
    // =========================================================================
    #[error("Sync failed for action {action_id} ({action_type}): {reason}")]
    SyncFailed {
        action_id: String,
        action_type: String,
        reason: String,
    },

    #[error("Sync timed out for action {action_id} after {timeout:?}")]
    SyncTimeout { action_id: String, timeout: Duration },

    #[error("Sync pass already in progress")]
    SyncInProgress,

    // =========================================================================
    // Network Errors
    // =========================================================================
    #[error("Connectivity probe failed: {0}")]
    ProbeFailed(String),

    #[error("Image transform failed for {uri}: {reason}")]
    ImageTransform { uri: String, reason: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: String, quantity: i64 },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient (worth retrying later)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. }
                | Error::StoreOperation { .. }
                | Error::SyncFailed { .. }
                | Error::SyncTimeout { .. }
                | Error::SyncInProgress
                | Error::ProbeFailed(_)
                | Error::Io(_)
        )
    }

    /// Check if this error is retryable
    ///
    /// Programmer and configuration errors never are.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidKey(_)
                | Error::InvalidQuantity { .. }
                | Error::JsonParse(_)
                | Error::YamlParse(_)
        )
    }

    /// Shorthand for a failed store operation
    pub fn store(operation: &str, key: &str, reason: impl std::fmt::Display) -> Self {
        Error::StoreOperation {
            operation: operation.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the offline engine
pub type Result<T> = std::result::Result<T, Error>;
