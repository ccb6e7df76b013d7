//! Offline Storage Manager
//!
//! Single authority for the offline cart, user preferences, cached catalog
//! data and the sync outbox. Cart and favorite changes are applied to the
//! durable store first and only then queued for the server.
//!
//! # Sync pass
//!
//! ```text
//!   tier offline? ──yes──> skip (outbox untouched)
//!        │no
//!   pass running? ──yes──> skip
//!        │no
//!   status = syncing
//!   take outbox snapshot
//!   for each action:
//!       attempt (tier timeout, in-pass backoff retries)
//!         ok    ──> done
//!         fail  ──> retries < max ? requeue(retries + 1) : drop + error!
//!   persist outbox ──fail──> status = error
//!        │ok
//!   status = completed ──(hold)──> idle
//! ```

use crate::cache::{CacheEntry, Ttl};
use crate::domain::catalog::{Category, Product, UserPreferences};
use crate::domain::ports::{ClockRef, DurableStoreRef, SyncEndpointRef};
use crate::error::{Error, Result};
use crate::network::{AdaptationPolicy, NetworkTier};
use crate::offline::action::{
    product_payload, quantity_payload, ActionPriority, ActionType, PendingAction,
};
use crate::offline::cart::{self, CartLine};
use crate::offline::outbox::{Outbox, MAX_RETRIES};
use crate::offline::status::{StatusBoard, SubscriptionId, SyncStatus};
use crate::storage::{validate_key, StorageKey};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the offline storage manager
#[derive(Debug, Clone)]
pub struct OfflineManagerConfig {
    /// Period of the auto-sync driver
    pub auto_sync_interval: Duration,
    /// How long `completed` is shown before reverting to `idle`
    pub completed_hold: Duration,
    /// Failed passes before an action is dropped
    pub max_retries: u32,
    /// Cached catalog data older than this (since last sync) is pruned at startup
    pub staleness_window: Duration,
    pub products_ttl: Ttl,
    pub categories_ttl: Ttl,
    pub search_history_limit: usize,
    /// Data layout version; a different persisted tag triggers migration
    pub data_version: String,
    /// First in-pass retry delay; doubles per attempt
    pub retry_initial_backoff: Duration,
}

impl Default for OfflineManagerConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval: Duration::from_secs(30),
            completed_hold: Duration::from_millis(2000),
            max_retries: MAX_RETRIES,
            staleness_window: Duration::from_secs(7 * 24 * 60 * 60),
            products_ttl: Ttl::hours(24),
            categories_ttl: Ttl::days(7),
            search_history_limit: 20,
            data_version: "3.0.0".to_string(),
            retry_initial_backoff: Duration::from_millis(250),
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Counts from one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub requeued: usize,
    pub dropped: usize,
    /// Outbox length after the pass
    pub remaining: usize,
}

/// Result of asking for a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Tier is offline; nothing attempted
    SkippedOffline,
    /// Another pass holds the gate
    SkippedInProgress,
    /// Pass ran and the outbox was persisted
    Finished(SyncReport),
    /// Pass ran but the outbox could not be persisted
    PersistFailed(SyncReport),
}

/// Size and presence of one managed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
    pub key: String,
    pub size: usize,
    pub exists: bool,
}

/// Diagnostic view of everything the manager persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Keyed by label (`PRODUCTS`, `USER_CART`, ...)
    pub keys: BTreeMap<String, KeyStats>,
    pub total_size: usize,
    pub pending_actions: usize,
    pub sync_status: SyncStatus,
}

struct AutoSync {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Offline Storage Manager
// =============================================================================

pub struct OfflineStorageManager {
    store: DurableStoreRef,
    clock: ClockRef,
    endpoint: SyncEndpointRef,
    tier: watch::Receiver<NetworkTier>,
    outbox: Outbox,
    status: Arc<StatusBoard>,
    /// Held for the duration of a sync pass
    sync_gate: Mutex<()>,
    /// Serializes read-modify-write of the cart
    cart_lock: Mutex<()>,
    /// Serializes read-modify-write of preferences
    prefs_lock: Mutex<()>,
    /// Serializes read-modify-write of search history
    history_lock: Mutex<()>,
    config: OfflineManagerConfig,
    idle_reset: parking_lot::Mutex<Option<JoinHandle<()>>>,
    auto_sync: parking_lot::Mutex<Option<AutoSync>>,
}

impl OfflineStorageManager {
    /// Create the manager and run the startup sequence
    ///
    /// Restores the outbox, prunes stale catalog data and migrates the
    /// persisted layout. Failures in any step are logged; startup always
    /// completes.
    pub async fn open(
        store: DurableStoreRef,
        clock: ClockRef,
        endpoint: SyncEndpointRef,
        tier: watch::Receiver<NetworkTier>,
        config: OfflineManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            outbox: Outbox::new(Arc::clone(&store)),
            store,
            clock,
            endpoint,
            tier,
            status: Arc::new(StatusBoard::new()),
            sync_gate: Mutex::new(()),
            cart_lock: Mutex::new(()),
            prefs_lock: Mutex::new(()),
            history_lock: Mutex::new(()),
            config,
            idle_reset: parking_lot::Mutex::new(None),
            auto_sync: parking_lot::Mutex::new(None),
        });

        manager.initialize().await;
        manager
    }

    async fn initialize(&self) {
        let restored = self.outbox.load().await;
        self.prune_stale_data().await;
        self.migrate_if_needed().await;
        info!(
            pending_actions = restored,
            store = self.store.store_name(),
            "Offline storage initialized"
        );
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    fn current_tier(&self) -> NetworkTier {
        *self.tier.borrow()
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Last time a sync pass emptied the outbox (Unix millis)
    pub async fn get_last_sync(&self) -> Option<i64> {
        match self.store.get_item(StorageKey::LastSync.as_str()).await {
            Ok(Some(raw)) => raw.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read last sync timestamp");
                None
            }
        }
    }

    async fn prune_stale_data(&self) {
        let Some(last_sync) = self.get_last_sync().await else {
            return;
        };
        let age_ms = self.now().saturating_sub(last_sync);
        if age_ms <= self.config.staleness_window.as_millis() as i64 {
            return;
        }

        info!(age_ms, "Cached catalog data is stale, pruning");
        for key in StorageKey::stale_cache_keys() {
            if let Err(e) = self.store.remove_item(key.as_str()).await {
                warn!(key = %key, error = %e, "Failed to clear stale cache key");
            }
        }
    }

    async fn migrate_if_needed(&self) {
        let key = StorageKey::AppVersion.as_str();
        let current = match self.store.get_item(key).await {
            Ok(raw) => raw.map(|raw| {
                serde_json::from_str::<String>(&raw).unwrap_or(raw)
            }),
            Err(e) => {
                warn!(error = %e, "Data migration failed: could not read version");
                return;
            }
        };

        let target = self.config.data_version.as_str();
        if current.as_deref() == Some(target) {
            return;
        }

        info!(from = ?current, to = target, "Migrating offline data");
        if let Err(e) = self.perform_migration(current.as_deref()).await {
            warn!(error = %e, "Data migration failed");
            return;
        }

        let tag = serde_json::Value::String(target.to_string()).to_string();
        if let Err(e) = self.store.set_item(key, &tag).await {
            warn!(error = %e, "Failed to record data version");
        }
    }

    async fn perform_migration(&self, from: Option<&str>) -> Result<()> {
        let needs_voice_fields = from.map_or(true, |v| version_less(v, "3.0.0"));
        if !needs_voice_fields {
            return Ok(());
        }

        let _guard = self.prefs_lock.lock().await;
        if let Some(mut prefs) = self.load_preferences().await? {
            prefs.voice_commands_enabled = Some(true);
            prefs.offline_mode_preferred = Some(false);
            self.write_json(StorageKey::UserPreferences.as_str(), &prefs).await?;
            debug!("Added voice and offline preference fields");
        }
        Ok(())
    }

    // =========================================================================
    // TTL-Aware Durable Accessors
    // =========================================================================

    /// Store `data` under `key` in a TTL envelope
    pub async fn save_data<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Ttl) -> Result<()> {
        validate_key(key)?;
        let entry = CacheEntry::new(serde_json::to_value(data)?, self.now(), ttl);
        self.write_json(key, &entry).await
    }

    /// Read an enveloped value; expired entries are deleted and read as absent
    pub async fn get_data<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to get data");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Stored value is not a data envelope");
                return None;
            }
        };

        if entry.is_expired(self.now()) {
            debug!(key = %key, "Stored data expired");
            if let Err(e) = self.store.remove_item(key).await {
                warn!(key = %key, error = %e, "Failed to remove expired data");
            }
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored data has unexpected shape");
                None
            }
        }
    }

    pub async fn cache_products(&self, products: &[Product]) -> Result<()> {
        self.save_data(StorageKey::Products.as_str(), products, self.config.products_ttl)
            .await?;
        info!(count = products.len(), "Cached products for offline access");
        Ok(())
    }

    pub async fn get_cached_products(&self) -> Vec<Product> {
        self.get_data(StorageKey::Products.as_str())
            .await
            .unwrap_or_default()
    }

    pub async fn cache_categories(&self, categories: &[Category]) -> Result<()> {
        self.save_data(StorageKey::Categories.as_str(), categories, self.config.categories_ttl)
            .await
    }

    pub async fn get_cached_categories(&self) -> Vec<Category> {
        self.get_data(StorageKey::Categories.as_str())
            .await
            .unwrap_or_default()
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Case-insensitive substring search over cached products
    ///
    /// A blank query returns every cached product.
    pub async fn search_offline_products(&self, query: &str) -> Vec<Product> {
        let products = self.get_cached_products().await;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return products;
        }
        products.into_iter().filter(|p| p.matches(&needle)).collect()
    }

    /// Record a query at the front of the history, without duplicates
    pub async fn save_search_query(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }

        let _guard = self.history_lock.lock().await;
        let mut history = self.get_search_history().await;
        history.retain(|h| h != query);
        history.insert(0, query.to_string());
        history.truncate(self.config.search_history_limit);

        self.save_data(StorageKey::SearchHistory.as_str(), &history, Ttl::Forever)
            .await
    }

    pub async fn get_search_history(&self) -> Vec<String> {
        self.get_data(StorageKey::SearchHistory.as_str())
            .await
            .unwrap_or_default()
    }

    // =========================================================================
    // Outbox
    // =========================================================================

    /// Queue an action; persisted before this returns
    pub async fn queue_action(
        &self,
        action_type: ActionType,
        payload: serde_json::Value,
        priority: ActionPriority,
    ) -> Result<()> {
        let action = PendingAction::new(action_type, payload, priority, self.now());
        self.outbox.push(action).await
    }

    pub fn pending_actions_count(&self) -> usize {
        self.outbox.len()
    }

    /// Queued actions in drain order
    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.outbox.snapshot().await
    }

    /// Run one sync pass
    pub async fn process_pending_actions(&self) -> SyncOutcome {
        let tier = self.current_tier();
        if tier.is_offline() {
            debug!("Skipping sync pass while offline");
            return SyncOutcome::SkippedOffline;
        }

        let Ok(_gate) = self.sync_gate.try_lock() else {
            debug!("Sync pass already in progress");
            return SyncOutcome::SkippedInProgress;
        };

        if let Some(reset) = self.idle_reset.lock().take() {
            reset.abort();
        }
        self.status.set(SyncStatus::Syncing);

        let policy = tier.policy();
        let actions = self.outbox.take_all().await;
        let mut report = SyncReport {
            attempted: actions.len(),
            ..Default::default()
        };
        let mut retry = Vec::new();

        for mut action in actions {
            match self.attempt(&action, &policy).await {
                Ok(()) => report.synced += 1,
                Err(e) if action.retries < self.config.max_retries => {
                    warn!(action_id = %action.id, error = %e, "Failed to execute action");
                    action.retries += 1;
                    report.requeued += 1;
                    retry.push(action);
                }
                Err(e) => {
                    error!(
                        action_id = %action.id,
                        action_type = %action.action_type,
                        retries = action.retries,
                        payload = %action.payload,
                        error = %e,
                        "Action permanently failed, dropping"
                    );
                    report.dropped += 1;
                }
            }
        }

        if let Err(e) = self.outbox.finish_pass(retry).await {
            error!(error = %e, "Failed to persist pending actions");
            report.remaining = self.outbox.len();
            self.status.set(SyncStatus::Error);
            return SyncOutcome::PersistFailed(report);
        }
        report.remaining = self.outbox.len();

        if report.remaining == 0 {
            let now = self.now().to_string();
            if let Err(e) = self.store.set_item(StorageKey::LastSync.as_str(), &now).await {
                warn!(error = %e, "Failed to record last sync timestamp");
            }
        }

        info!(
            tier = %tier,
            attempted = report.attempted,
            synced = report.synced,
            requeued = report.requeued,
            dropped = report.dropped,
            "Sync pass completed"
        );
        self.status.set(SyncStatus::Completed);
        self.schedule_idle_reset();

        SyncOutcome::Finished(report)
    }

    /// Deliver one action, retrying within the pass as the tier allows
    async fn attempt(&self, action: &PendingAction, policy: &AdaptationPolicy) -> Result<()> {
        let timeout = policy
            .timeout()
            .ok_or_else(|| Error::Internal("sync attempted with no network".to_string()))?;

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.retry_initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(timeout)
            .with_max_elapsed_time(None)
            .build();

        let mut attempts_left = policy.retry_attempts;
        loop {
            let result = match tokio::time::timeout(timeout, self.endpoint.execute(action)).await {
                Ok(result) => result,
                Err(_) => Err(Error::SyncTimeout {
                    action_id: action.id.clone(),
                    timeout,
                }),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempts_left > 0 && e.is_retryable() => {
                    attempts_left -= 1;
                    let delay = backoff.next_backoff().unwrap_or(timeout);
                    debug!(action_id = %action.id, error = %e, ?delay, "Retrying action");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn schedule_idle_reset(&self) {
        let status = Arc::clone(&self.status);
        let hold = self.config.completed_hold;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            status.set_if(SyncStatus::Completed, SyncStatus::Idle);
        });
        if let Some(previous) = self.idle_reset.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Run a sync pass now
    pub async fn force_sync(&self) -> SyncOutcome {
        self.process_pending_actions().await
    }

    // =========================================================================
    // Sync Status
    // =========================================================================

    pub fn get_sync_status(&self) -> SyncStatus {
        self.status.get()
    }

    /// Register a callback fired synchronously on every status transition
    pub fn on_sync_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    pub fn off_sync_status_change(&self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Cart as stored; unreadable or missing reads as empty
    pub async fn get_offline_cart(&self) -> Vec<CartLine> {
        match self.read_json(StorageKey::UserCart.as_str()).await {
            Ok(cart) => cart.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read offline cart");
                Vec::new()
            }
        }
    }

    pub async fn save_offline_cart(&self, cart: &[CartLine]) -> Result<()> {
        self.write_json(StorageKey::UserCart.as_str(), cart).await
    }

    /// Strict read used by mutations so a failed read never clobbers the cart
    async fn load_cart(&self) -> Result<Vec<CartLine>> {
        Ok(self
            .read_json(StorageKey::UserCart.as_str())
            .await?
            .unwrap_or_default())
    }

    /// Add `quantity` of a product; repeated adds accumulate
    pub async fn add_to_cart(&self, product_id: &str, quantity: u32) -> Result<()> {
        validate_key(product_id)?;
        if quantity == 0 {
            return Err(Error::InvalidQuantity {
                product_id: product_id.to_string(),
                quantity: 0,
            });
        }

        let _guard = self.cart_lock.lock().await;
        let mut cart = self.load_cart().await?;
        cart::merge_add(&mut cart, product_id, quantity, self.now());
        self.save_offline_cart(&cart).await?;

        self.queue_action(
            ActionType::AddToCart,
            quantity_payload(product_id, quantity),
            ActionPriority::High,
        )
        .await
    }

    pub async fn remove_from_cart(&self, product_id: &str) -> Result<()> {
        validate_key(product_id)?;

        let _guard = self.cart_lock.lock().await;
        let mut cart = self.load_cart().await?;
        cart::remove_line(&mut cart, product_id);
        self.save_offline_cart(&cart).await?;

        self.queue_action(
            ActionType::RemoveFromCart,
            product_payload(product_id),
            ActionPriority::High,
        )
        .await
    }

    /// Overwrite a line's quantity; zero or below removes the line
    ///
    /// Updating a product that is not in the cart changes nothing.
    pub async fn update_quantity(&self, product_id: &str, quantity: i64) -> Result<()> {
        validate_key(product_id)?;
        if quantity <= 0 {
            let _guard = self.cart_lock.lock().await;
            let mut cart = self.load_cart().await?;
            if !cart::remove_line(&mut cart, product_id) {
                debug!(product_id, "Quantity update for product not in cart");
                return Ok(());
            }
            self.save_offline_cart(&cart).await?;

            return self
                .queue_action(
                    ActionType::RemoveFromCart,
                    product_payload(product_id),
                    ActionPriority::High,
                )
                .await;
        }
        let quantity = u32::try_from(quantity).map_err(|_| Error::InvalidQuantity {
            product_id: product_id.to_string(),
            quantity,
        })?;

        let _guard = self.cart_lock.lock().await;
        let mut cart = self.load_cart().await?;
        if !cart::set_quantity(&mut cart, product_id, quantity, self.now()) {
            debug!(product_id, "Quantity update for product not in cart");
            return Ok(());
        }
        self.save_offline_cart(&cart).await?;

        self.queue_action(
            ActionType::UpdateQuantity,
            quantity_payload(product_id, quantity),
            ActionPriority::Medium,
        )
        .await
    }

    // =========================================================================
    // Preferences & Favorites
    // =========================================================================

    async fn load_preferences(&self) -> Result<Option<UserPreferences>> {
        self.read_json(StorageKey::UserPreferences.as_str()).await
    }

    pub async fn get_user_data(&self) -> Option<UserPreferences> {
        match self.load_preferences().await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(error = %e, "Failed to read user preferences");
                None
            }
        }
    }

    pub async fn save_user_data(&self, prefs: &UserPreferences) -> Result<()> {
        let _guard = self.prefs_lock.lock().await;
        self.write_json(StorageKey::UserPreferences.as_str(), prefs).await
    }

    pub async fn add_favorite(&self, product_id: &str) -> Result<()> {
        self.update_favorite(product_id, true).await
    }

    pub async fn remove_favorite(&self, product_id: &str) -> Result<()> {
        self.update_favorite(product_id, false).await
    }

    async fn update_favorite(&self, product_id: &str, favorite: bool) -> Result<()> {
        validate_key(product_id)?;

        let _guard = self.prefs_lock.lock().await;
        let mut prefs = self.load_preferences().await?.unwrap_or_default();
        if favorite {
            prefs.favorites.insert(product_id.to_string());
        } else {
            prefs.favorites.remove(product_id);
        }
        self.write_json(StorageKey::UserPreferences.as_str(), &prefs).await?;

        let action_type = if favorite {
            ActionType::AddFavorite
        } else {
            ActionType::RemoveFavorite
        };
        self.queue_action(action_type, product_payload(product_id), ActionPriority::Medium)
            .await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove every managed key and empty the outbox
    pub async fn clear_all_data(&self) -> Result<()> {
        let keys: Vec<&str> = StorageKey::all().iter().map(|k| k.as_str()).collect();
        self.store.multi_remove(&keys).await?;
        self.outbox.clear().await;
        self.status.set(SyncStatus::Idle);
        info!("Cleared all offline data");
        Ok(())
    }

    /// Size and presence of every managed key
    pub async fn get_storage_stats(&self) -> StorageStats {
        let mut keys = BTreeMap::new();
        let mut total_size = 0;

        for key in StorageKey::all() {
            let value = match self.store.get_item(key.as_str()).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read key for stats");
                    None
                }
            };
            let size = value.as_ref().map_or(0, String::len);
            total_size += size;
            keys.insert(
                key.label().to_string(),
                KeyStats {
                    key: key.as_str().to_string(),
                    size,
                    exists: value.is_some(),
                },
            );
        }

        StorageStats {
            keys,
            total_size,
            pending_actions: self.pending_actions_count(),
            sync_status: self.get_sync_status(),
        }
    }

    // =========================================================================
    // Auto Sync
    // =========================================================================

    /// Start the periodic sync driver; a second call is a no-op
    ///
    /// Besides the timer, a transition out of `offline` triggers a pass
    /// right away.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let mut slot = self.auto_sync.lock();
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut tier_rx = self.tier.clone();
        let period = self.config.auto_sync_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            let mut tier_open = true;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                    changed = tier_rx.changed(), if tier_open => {
                        if changed.is_err() {
                            tier_open = false;
                            continue;
                        }
                    }
                }

                let Some(manager) = weak.upgrade() else { break };
                manager.auto_sync_tick().await;
            }
            debug!("Auto sync stopped");
        });

        info!(interval = ?period, "Auto sync started");
        *slot = Some(AutoSync { cancel, handle });
    }

    async fn auto_sync_tick(&self) {
        if self.current_tier().is_offline() {
            self.status.set_if(SyncStatus::Idle, SyncStatus::Offline);
            return;
        }
        self.status.set_if(SyncStatus::Offline, SyncStatus::Idle);
        if !self.outbox.is_empty() {
            self.process_pending_actions().await;
        }
    }

    /// Stop the sync driver; idempotent
    pub fn stop_auto_sync(&self) {
        if let Some(auto_sync) = self.auto_sync.lock().take() {
            auto_sync.cancel.cancel();
            info!("Auto sync stopped");
        }
    }

    pub fn is_auto_syncing(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    // =========================================================================
    // Raw JSON Helpers
    // =========================================================================

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_item(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set_item(key, &raw).await
    }
}

impl Drop for OfflineStorageManager {
    fn drop(&mut self) {
        if let Some(auto_sync) = self.auto_sync.get_mut().take() {
            auto_sync.cancel.cancel();
        }
        if let Some(reset) = self.idle_reset.get_mut().take() {
            reset.abort();
        }
    }
}

/// Dotted numeric version comparison; non-numeric segments compare as 0
fn version_less(a: &str, b: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (mut a, mut b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    a < b
}
