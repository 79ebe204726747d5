//! # Engine
//!
//! Coordinator the presentation layer talks to. Owns the shared context, the
//! realtime subscription of the active business and the terminal's checkout.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             Engine                                      │
//! │                                                                         │
//! │  sign_in / restore_session ──► activate(business)                       │
//! │                                   │ release previous subscription       │
//! │                                   │ load_all: sync_pending, then fetch  │
//! │                                   │           every table concurrently  │
//! │                                   │ acquire subscription for business   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │  WritePath   │  │ OfflineQueue │  │ Subscription │  │ Checkout   │  │
//! │  │ (inventory,  │  │ (replay on   │  │ (merge feed  │  │ Session    │  │
//! │  │  refunds)    │  │  reconnect)  │  │  into state) │  │ (Mutex)    │  │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  └─────┬──────┘  │
//! │         └─────────────────┴────────┬────────┴────────────────┘         │
//! │                                    ▼                                    │
//! │                 SyncContext (remote, cache, collections)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tally_core::{
    Business, CoreError, Product, Session, Supplier, SyncDiagnostic, Table, TaxRate, Transaction,
};
use tally_db::{load_json, store_json, CacheKey, Database, DbConfig, LocalCache};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::checkout::{CheckoutSession, Receipt};
use crate::collections::Stored;
use crate::config::TallyConfig;
use crate::context::SyncContext;
use crate::diagnostics::{self, ResyncReport};
use crate::error::{SyncError, SyncResult};
use crate::queue::{self, ReplayReport};
use crate::remote::{with_timeout, AuthOutcome, RemoteStore};
use crate::subscription::RealtimeSubscription;
use crate::telemetry;
use crate::writer::{WriteOutcome, WritePath};

// =============================================================================
// Load Report
// =============================================================================

/// Where a table's records came from during a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    /// The fetch failed; the cached copy was used.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoad {
    pub table: Table,
    pub records: usize,
    pub source: LoadSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn from_cache(&self) -> bool {
        self.tables.iter().any(|t| t.source == LoadSource::Cache)
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    config: TallyConfig,
    ctx: Arc<SyncContext>,
    writer: WritePath,
    session: RwLock<Option<Session>>,
    subscription: Mutex<Option<RealtimeSubscription>>,
    checkout: Mutex<CheckoutSession>,
}

impl Engine {
    /// Builds an engine over the given remote store and local cache.
    pub async fn init(
        config: TallyConfig,
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let ctx = Arc::new(SyncContext::new(remote, cache, config.request_timeout()).await?);
        let checkout = CheckoutSession::new(config.tax_rate());

        info!(device_id = %config.device_id(), "Engine initialized");

        Ok(Engine {
            writer: WritePath::new(ctx.clone()),
            ctx,
            session: RwLock::new(None),
            subscription: Mutex::new(None),
            checkout: Mutex::new(checkout),
            config,
        })
    }

    /// Builds an engine backed by the SQLite cache at the configured path.
    ///
    /// Installs the default tracing subscriber unless the host already
    /// installed one.
    pub async fn open(config: TallyConfig, remote: Arc<dyn RemoteStore>) -> SyncResult<Self> {
        if telemetry::init_tracing() {
            debug!(filter = telemetry::DEFAULT_FILTER, "Tracing installed");
        }

        let db_config = match config.cache_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                DbConfig::new(path)
            }
            None => {
                warn!("No cache path available, using in-memory cache");
                DbConfig::in_memory()
            }
        };
        let database = Database::new(db_config).await?;

        Self::init(config, remote, Arc::new(database)).await
    }

    /// Releases the realtime subscription. The engine stays usable offline.
    pub async fn dispose(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.release().await;
        }
        info!("Engine disposed");
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn business_id(&self) -> SyncResult<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.business.id.clone())
            .ok_or(SyncError::NoActiveBusiness)
    }

    fn tax_rate_for(&self, business: &Business) -> TaxRate {
        business
            .tax_rate_bps
            .map(TaxRate::from_bps)
            .unwrap_or_else(|| self.config.tax_rate())
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Authenticates and, on success, activates the returned business.
    ///
    /// A failed sign-in is an `Ok(AuthOutcome::Failure)`, never an `Err`.
    pub async fn sign_in(&self, email: &str, password: &str) -> SyncResult<AuthOutcome> {
        let outcome = match tokio::time::timeout(
            self.ctx.request_timeout(),
            self.ctx.remote().authenticate(email, password),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => AuthOutcome::failure("Sign-in timed out", "TIMEOUT"),
        };

        match &outcome {
            AuthOutcome::Success { user, business } => {
                let session = Session {
                    user: user.clone(),
                    business: business.clone(),
                    signed_in_at: Utc::now(),
                };
                store_json(self.ctx.cache(), &CacheKey::Session, &session).await?;
                info!(user_id = %user.id, business_id = %business.id, "Signed in");
                self.activate(session).await?;
            }
            AuthOutcome::Failure { code, .. } => {
                warn!(%code, "Sign-in failed");
            }
        }

        Ok(outcome)
    }

    /// Re-activates the persisted session, if any.
    pub async fn restore_session(&self) -> SyncResult<Option<Session>> {
        let Some(session) = load_json::<Session>(self.ctx.cache(), &CacheKey::Session).await? else {
            debug!("No persisted session");
            return Ok(None);
        };

        info!(business_id = %session.business.id, "Restoring session");
        self.activate(session.clone()).await?;
        Ok(Some(session))
    }

    pub async fn sign_out(&self) -> SyncResult<()> {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.release().await;
        }
        self.ctx.cache().remove(&CacheKey::Session).await?;
        self.ctx.collections.write().await.clear();
        *self.checkout.lock().await = CheckoutSession::new(self.config.tax_rate());
        *self.session.write().await = None;

        info!("Signed out");
        Ok(())
    }

    pub async fn mark_setup_complete(&self) -> SyncResult<()> {
        store_json(self.ctx.cache(), &CacheKey::SetupComplete, &true).await?;
        Ok(())
    }

    pub async fn is_setup_complete(&self) -> SyncResult<bool> {
        Ok(load_json::<bool>(self.ctx.cache(), &CacheKey::SetupComplete)
            .await?
            .unwrap_or(false))
    }

    /// Makes `session.business` the active scope.
    ///
    /// The previous business's subscription is released before anything of
    /// the new business is loaded.
    async fn activate(&self, session: Session) -> SyncResult<()> {
        let business = session.business.clone();

        if let Some(previous) = self.subscription.lock().await.take() {
            debug!(business_id = %previous.business_id(), "Releasing previous subscription");
            previous.release().await;
        }

        self.ctx.collections.write().await.clear();
        *self.checkout.lock().await = CheckoutSession::new(self.tax_rate_for(&business));
        *self.session.write().await = Some(session);

        let report = self.load_all().await?;
        if report.from_cache() {
            warn!(business_id = %business.id, "Loaded from cache, remote unreachable");
        }

        self.subscribe(&business.id).await;
        Ok(())
    }

    /// Acquires the realtime subscription if none is held. Failures are logged.
    async fn subscribe(&self, business_id: &str) {
        let mut slot = self.subscription.lock().await;
        if slot.is_some() {
            return;
        }
        match RealtimeSubscription::acquire(
            self.ctx.clone(),
            business_id,
            self.config.monitored_tables(),
        )
        .await
        {
            Ok(subscription) => *slot = Some(subscription),
            Err(e) => warn!(business_id, error = %e, "Realtime subscription unavailable"),
        }
    }

    // =========================================================================
    // Load & Reconnect
    // =========================================================================

    /// Replays the queue, then loads every monitored table concurrently.
    ///
    /// A table whose fetch fails keeps its cached copy.
    pub async fn load_all(&self) -> SyncResult<LoadReport> {
        let business_id = self.business_id().await?;
        queue::sync_pending(&self.ctx).await?;

        let fetches = self.config.monitored_tables().iter().map(|table| {
            let business_id = business_id.as_str();
            async move {
                let result = with_timeout(
                    self.ctx.request_timeout(),
                    self.ctx.remote().fetch(*table, business_id),
                )
                .await;
                (*table, result)
            }
        });

        let mut report = LoadReport::default();
        for (table, result) in join_all(fetches).await {
            let (records, source) = match result {
                Ok(records) => (records, LoadSource::Remote),
                Err(e) => {
                    warn!(table = %table, error = %e, "Fetch failed, using cached copy");
                    let cached = self
                        .ctx
                        .cache()
                        .get(&CacheKey::table(&business_id, table))
                        .await?;
                    let records = match cached {
                        Some(serde_json::Value::Array(records)) => records,
                        _ => Vec::new(),
                    };
                    (records, LoadSource::Cache)
                }
            };

            let (kept, _rejected) = self
                .ctx
                .collections
                .write()
                .await
                .replace_from_records(table, records);
            if source == LoadSource::Remote {
                self.ctx.persist_table(&business_id, table).await?;
            }

            report.tables.push(TableLoad {
                table,
                records: kept,
                source,
            });
        }

        info!(business_id = %business_id, tables = report.tables.len(), "Load complete");
        Ok(report)
    }

    /// Replays every queued action.
    pub async fn sync_pending(&self) -> SyncResult<Vec<ReplayReport>> {
        queue::sync_pending(&self.ctx).await
    }

    /// Called when connectivity returns: replay, then resubscribe if needed.
    pub async fn reconnect(&self) -> SyncResult<Vec<ReplayReport>> {
        let business_id = self.business_id().await?;
        let reports = queue::sync_pending(&self.ctx).await?;
        self.subscribe(&business_id).await;
        Ok(reports)
    }

    pub async fn is_subscribed(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub async fn diagnostics(&self) -> SyncResult<Vec<SyncDiagnostic>> {
        let business_id = self.business_id().await?;
        Ok(diagnostics::diagnose(&self.ctx, &business_id, self.config.monitored_tables()).await)
    }

    /// Operator-triggered: replaces the local table with the remote snapshot.
    pub async fn force_resync(&self, table: Table) -> SyncResult<ResyncReport> {
        let business_id = self.business_id().await?;
        diagnostics::force_resync(&self.ctx, &business_id, table).await
    }

    pub async fn pending_count(&self) -> usize {
        self.ctx.queue.lock().await.len()
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub async fn products(&self) -> Vec<Product> {
        self.ctx.collections.read().await.products.items().to_vec()
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.ctx.collections.read().await.transactions.items().to_vec()
    }

    pub async fn suppliers(&self) -> Vec<Supplier> {
        self.ctx.collections.read().await.suppliers.items().to_vec()
    }

    pub async fn upsert_product(&self, mut product: Product) -> SyncResult<WriteOutcome> {
        product.business_id = self.business_id().await?;
        product.updated_at = Some(Utc::now());
        self.writer.upsert(product).await
    }

    pub async fn delete_product(&self, id: &str) -> SyncResult<WriteOutcome> {
        self.delete::<Product>(id).await
    }

    pub async fn upsert_supplier(&self, mut supplier: Supplier) -> SyncResult<WriteOutcome> {
        supplier.business_id = self.business_id().await?;
        self.writer.upsert(supplier).await
    }

    pub async fn delete_supplier(&self, id: &str) -> SyncResult<WriteOutcome> {
        self.delete::<Supplier>(id).await
    }

    async fn delete<T: Stored>(&self, id: &str) -> SyncResult<WriteOutcome> {
        let business_id = self.business_id().await?;
        self.writer.delete::<T>(&business_id, id).await
    }

    /// Marks a completed transaction line as refunded.
    pub async fn refund_transaction(&self, id: &str) -> SyncResult<Transaction> {
        self.business_id().await?;
        let refunded = {
            let collections = self.ctx.collections.read().await;
            let current = collections
                .transactions
                .get(id)
                .ok_or_else(|| SyncError::NotFound {
                    table: Table::Transactions,
                    id: id.to_string(),
                })?;
            current.refund()?
        };

        self.writer.store(refunded.clone()).await?;
        info!(transaction_id = %id, "Transaction refunded");
        Ok(refunded)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Exclusive access to the terminal's checkout.
    pub async fn checkout(&self) -> MutexGuard<'_, CheckoutSession> {
        self.checkout.lock().await
    }

    /// Adds a known product to the cart by id.
    pub async fn add_to_cart(&self, product_id: &str, quantity: i64) -> SyncResult<()> {
        let product = self
            .ctx
            .collections
            .read()
            .await
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        self.checkout.lock().await.add_to_cart(&product, quantity)?;
        Ok(())
    }

    /// Commits the sale in REVIEW. The checkout lock is held throughout, so a
    /// second commit cannot start while one is processing.
    pub async fn commit_sale(&self) -> SyncResult<Receipt> {
        let business_id = self.business_id().await?;
        let mut checkout = self.checkout.lock().await;
        checkout.commit(&self.ctx, &business_id).await
    }

    pub async fn acknowledge_checkout_error(&self) -> SyncResult<()> {
        let business_id = self.business_id().await?;
        let mut checkout = self.checkout.lock().await;
        checkout.acknowledge_error(&self.ctx, &business_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemote;
    use crate::test_support::{product, test_config, BUSINESS};
    use tally_core::{AuthUser, CheckoutPhase, DiagnosticStatus, Entity, PaymentMethod};
    use tally_db::MemoryCache;

    const EMAIL: &str = "owner@shop.test";
    const PASSWORD: &str = "secret";

    fn business(id: &str) -> Business {
        Business {
            id: id.to_string(),
            name: format!("Shop {}", id),
            tax_rate_bps: None,
        }
    }

    async fn remote_with_account() -> Arc<InMemoryRemote> {
        let remote = Arc::new(InMemoryRemote::new());
        let user = AuthUser {
            id: "u1".into(),
            email: EMAIL.into(),
            name: "Owner".into(),
        };
        remote.add_account(EMAIL, PASSWORD, user, business(BUSINESS)).await;
        remote
    }

    async fn engine(remote: Arc<InMemoryRemote>, cache: Arc<MemoryCache>) -> Engine {
        Engine::init(test_config(), remote, cache).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_uses_file_cache() {
        let path = std::env::temp_dir()
            .join(format!("tally-engine-{}", std::process::id()))
            .join("cache.db");
        let mut config = test_config();
        config.cache.path = Some(path.clone());

        let remote = remote_with_account().await;
        let engine = Engine::open(config, remote).await.unwrap();
        engine.sign_in(EMAIL, PASSWORD).await.unwrap();
        engine.upsert_product(product("p1", 100, 1)).await.unwrap();
        assert!(path.exists());

        // The host-level subscriber is already in place after open.
        assert!(!telemetry::init_tracing());
        engine.dispose().await;
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_sign_in_loads_and_subscribes() {
        let remote = remote_with_account().await;
        remote
            .seed(Table::Products, vec![product("p1", 100, 10).to_record().unwrap()])
            .await;
        let engine = engine(remote.clone(), Arc::new(MemoryCache::new())).await;

        let outcome = engine.sign_in(EMAIL, PASSWORD).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(engine.products().await.len(), 1);
        assert!(engine.is_subscribed().await);
        assert_eq!(remote.active_channels().await, 3);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_a_value() {
        let remote = remote_with_account().await;
        let engine = engine(remote, Arc::new(MemoryCache::new())).await;

        let outcome = engine.sign_in(EMAIL, "wrong").await.unwrap();
        assert!(matches!(outcome, AuthOutcome::Failure { ref code, .. } if code == "INVALID_CREDENTIALS"));
        assert!(engine.session().await.is_none());
        assert!(matches!(engine.diagnostics().await, Err(SyncError::NoActiveBusiness)));
    }

    #[tokio::test]
    async fn test_offline_edit_replays_once_on_reconnect() {
        let remote = remote_with_account().await;
        remote
            .seed(Table::Products, vec![product("p1", 100, 10).to_record().unwrap()])
            .await;
        let engine = engine(remote.clone(), Arc::new(MemoryCache::new())).await;
        engine.sign_in(EMAIL, PASSWORD).await.unwrap();

        remote.set_online(false);
        let mut edited = engine.products().await[0].clone();
        edited.stock = 7;
        assert_eq!(engine.upsert_product(edited).await.unwrap(), WriteOutcome::Queued);
        assert_eq!(engine.pending_count().await, 1);

        remote.set_online(true);
        let writes_before = remote.write_count();
        engine.reconnect().await.unwrap();
        engine.reconnect().await.unwrap();

        assert_eq!(remote.write_count(), writes_before + 1);
        assert_eq!(engine.pending_count().await, 0);
        assert_eq!(remote.get(Table::Products, "p1").await.unwrap()["stock"], 7);

        let diagnostics = engine.diagnostics().await.unwrap();
        let products = diagnostics.iter().find(|d| d.table == Table::Products).unwrap();
        assert_eq!(products.status, DiagnosticStatus::Synced);
    }

    #[tokio::test]
    async fn test_business_switch_releases_old_channels() {
        let remote = remote_with_account().await;
        let user = AuthUser {
            id: "u2".into(),
            email: "other@shop.test".into(),
            name: "Other".into(),
        };
        remote
            .add_account("other@shop.test", PASSWORD, user, business("biz-2"))
            .await;
        let engine = engine(remote.clone(), Arc::new(MemoryCache::new())).await;

        engine.sign_in(EMAIL, PASSWORD).await.unwrap();
        engine.sign_in("other@shop.test", PASSWORD).await.unwrap();
        assert_eq!(remote.active_channels().await, 3);

        engine.sign_out().await.unwrap();
        assert_eq!(remote.active_channels().await, 0);
        assert!(engine.products().await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_session_falls_back_to_cache() {
        let remote = remote_with_account().await;
        remote
            .seed(Table::Products, vec![product("p1", 100, 10).to_record().unwrap()])
            .await;
        let cache = Arc::new(MemoryCache::new());
        {
            let engine = engine(remote.clone(), cache.clone()).await;
            engine.sign_in(EMAIL, PASSWORD).await.unwrap();
            engine.mark_setup_complete().await.unwrap();
            engine.dispose().await;
        }

        remote.set_online(false);
        let engine = engine(remote.clone(), cache).await;
        let session = engine.restore_session().await.unwrap();

        assert_eq!(session.unwrap().business.id, BUSINESS);
        assert!(engine.is_setup_complete().await.unwrap());
        assert_eq!(engine.products().await.len(), 1);
        assert!(!engine.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_sale_through_engine() {
        let remote = remote_with_account().await;
        remote
            .seed(Table::Products, vec![product("p1", 100, 10).to_record().unwrap()])
            .await;
        let engine = engine(remote.clone(), Arc::new(MemoryCache::new())).await;
        engine.sign_in(EMAIL, PASSWORD).await.unwrap();

        engine.add_to_cart("p1", 2).await.unwrap();
        {
            let mut checkout = engine.checkout().await;
            checkout.select_method(PaymentMethod::Cash).unwrap();
            checkout.submit_cash_tender(tally_core::Money::from_cents(300)).unwrap();
        }
        let receipt = engine.commit_sale().await.unwrap();

        assert_eq!(receipt.totals.total.cents(), 224);
        assert_eq!(receipt.change.cents(), 76);
        assert_eq!(engine.checkout().await.phase(), CheckoutPhase::Success);
        assert_eq!(engine.products().await[0].stock, 8);

        let refunded = engine
            .refund_transaction(&receipt.transactions[0].id)
            .await
            .unwrap();
        assert_eq!(refunded.status, tally_core::TransactionStatus::Refunded);
        assert!(engine.refund_transaction(&refunded.id).await.is_err());
    }

    #[tokio::test]
    async fn test_load_all_reports_cache_fallback() {
        let remote = remote_with_account().await;
        let engine = engine(remote.clone(), Arc::new(MemoryCache::new())).await;
        engine.sign_in(EMAIL, PASSWORD).await.unwrap();
        engine.upsert_product(product("p1", 100, 1)).await.unwrap();

        remote.set_online(false);
        let report = engine.load_all().await.unwrap();
        assert!(report.from_cache());
        assert_eq!(engine.products().await.len(), 1);
    }
}
