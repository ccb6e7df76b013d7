//! Offline-first storage and synchronization
//!
//! Local changes are made durable first and then queued in an outbox that
//! is drained whenever the network tier allows:
//!
//! ```text
//!   add_to_cart ──> durable cart ──> Outbox (durable) ──> sync pass ──> SyncEndpoint
//!                                        ^                    │
//!                                        └── retry < max ─────┘
//! ```
//!
//! - [`OfflineStorageManager`]: cart, preferences, catalog caches, outbox
//! - [`DataPreloader`]: cold-start seeding from bundled fixtures
//! - [`StatusBoard`]: sync status with synchronous observers

pub mod action;
pub mod cart;
pub mod fixtures;
pub mod manager;
pub mod outbox;
pub mod preloader;
pub mod status;
pub mod sync;

pub use action::{ActionPriority, ActionType, PendingAction};
pub use cart::CartLine;
pub use manager::{
    KeyStats, OfflineManagerConfig, OfflineStorageManager, StorageStats, SyncOutcome, SyncReport,
};
pub use outbox::{Outbox, MAX_RETRIES};
pub use preloader::{DataPreloader, PreloadReport, PreloadStep, StepResult};
pub use status::{StatusBoard, SubscriptionId, SyncStatus};
pub use sync::LoggingSyncEndpoint;
