//! # Checkout Session
//!
//! Drives one sale from cart to committed transaction records.
//!
//! ## Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           commit()                                      │
//! │                                                                         │
//! │  REVIEW ──► PROCESSING                                                  │
//! │                 │                                                       │
//! │                 ├─ re-check every line against latest known stock       │
//! │                 │     short ──► ERROR (STOCK_SYNC_ERROR), nothing written│
//! │                 │                                                       │
//! │                 ├─ one Transaction per line (shared sale id)           │
//! │                 ├─ StockLedger::plan_sale: one decrement per line       │
//! │                 ├─ both tables to the cache, then to memory, as a unit  │
//! │                 │     cache refuses ──► ERROR (PERSISTENCE), nothing    │
//! │                 │                       written, nothing sent           │
//! │                 ├─ lines ─► upsert_many, stock ─► upsert_many (or queue)│
//! │                 ▼                                                       │
//! │             SUCCESS ──► cart cleared, Receipt returned                  │
//! │                                                                         │
//! │  Remote failures never fail the sale: they land in the offline queue.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ERROR is left only through [`CheckoutSession::acknowledge_error`], which
//! refreshes product stock before the cashier tries again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::pricing::{change_due, price};
use tally_core::validation::validate_tender_cents;
use serde_json::Value;
use tally_core::{
    Cart, CartItem, CheckoutErrorKind, CheckoutMachine, CheckoutPhase, CoreError, CoreResult,
    DiscountRate, Entity, Money, MutationOp, PaymentMethod, PricingInput, Product, Table, TaxRate,
    Totals, Transaction,
};
use tally_db::CacheKey;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collections::decode_records;
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::ledger::StockLedger;
use crate::queue::replay_table_locked;
use crate::remote::with_timeout;
use crate::writer::WritePath;

// =============================================================================
// Receipt
// =============================================================================

/// Everything the presentation layer needs to print a completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub sale_id: String,
    pub lines: Vec<CartItem>,
    pub totals: Totals,
    pub payment_method: PaymentMethod,
    /// Cash handed over; `None` for non-cash methods.
    pub tendered: Option<Money>,
    pub change: Money,
    pub transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// One terminal's checkout. Not shared: the engine guards it with a mutex.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    machine: CheckoutMachine,
    cart: Cart,
    method: Option<PaymentMethod>,
    tendered: Option<Money>,
    pricing: PricingInput,
}

impl CheckoutSession {
    pub fn new(tax_rate: TaxRate) -> Self {
        CheckoutSession {
            machine: CheckoutMachine::new(),
            cart: Cart::new(),
            method: None,
            tendered: None,
            pricing: PricingInput {
                tax_rate,
                discount: DiscountRate::default(),
            },
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.machine.phase()
    }

    pub fn error_kind(&self) -> Option<CheckoutErrorKind> {
        self.machine.error_kind()
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        self.method
    }

    pub fn tendered(&self) -> Option<Money> {
        self.tendered
    }

    pub fn pricing(&self) -> PricingInput {
        self.pricing
    }

    pub fn totals(&self) -> Totals {
        price(&self.cart.lines(), self.pricing)
    }

    /// Change owed for the current tender; zero for non-cash sales.
    pub fn change(&self) -> Money {
        self.tendered
            .map(|tendered| change_due(tendered, self.totals().total))
            .unwrap_or_default()
    }

    // =========================================================================
    // Cart editing (METHOD_SELECT only)
    // =========================================================================

    fn ensure_editable(&self) -> CoreResult<()> {
        match self.phase() {
            CheckoutPhase::MethodSelect => Ok(()),
            phase => Err(CoreError::CartLocked { phase }),
        }
    }

    pub fn add_to_cart(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        self.ensure_editable()?;
        self.cart.add_item(product, quantity)
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        self.ensure_editable()?;
        self.cart.update_quantity(product_id, quantity)
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        self.ensure_editable()?;
        self.cart.remove_item(product_id)
    }

    pub fn set_discount(&mut self, discount: DiscountRate) -> CoreResult<()> {
        self.ensure_editable()?;
        self.pricing.discount = discount;
        Ok(())
    }

    pub fn set_tax_rate(&mut self, tax_rate: TaxRate) -> CoreResult<()> {
        self.ensure_editable()?;
        self.pricing.tax_rate = tax_rate;
        Ok(())
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Leaves METHOD_SELECT. Needs a non-empty cart.
    pub fn select_method(&mut self, method: PaymentMethod) -> CoreResult<()> {
        if self.cart.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        let next = if method.requires_tender() {
            CheckoutPhase::MethodDetails
        } else {
            CheckoutPhase::ConfirmPayment
        };
        self.machine.transition(next)?;
        self.method = Some(method);
        self.tendered = None;
        Ok(())
    }

    /// METHOD_DETAILS → REVIEW once the cash covers the total.
    pub fn submit_cash_tender(&mut self, tendered: Money) -> CoreResult<()> {
        if self.phase() != CheckoutPhase::MethodDetails {
            return Err(CoreError::IllegalTransition {
                from: self.phase(),
                to: CheckoutPhase::Review,
            });
        }
        validate_tender_cents(tendered.cents())?;

        let due = self.totals().total;
        if tendered < due {
            return Err(CoreError::InsufficientTender {
                due_cents: due.cents(),
                tendered_cents: tendered.cents(),
            });
        }

        self.machine.transition(CheckoutPhase::Review)?;
        self.tendered = Some(tendered);
        Ok(())
    }

    /// CONFIRM_PAYMENT → REVIEW for non-cash methods.
    pub fn confirm_payment(&mut self) -> CoreResult<()> {
        if self.phase() != CheckoutPhase::ConfirmPayment {
            return Err(CoreError::IllegalTransition {
                from: self.phase(),
                to: CheckoutPhase::Review,
            });
        }
        self.machine.transition(CheckoutPhase::Review)
    }

    /// Steps back to METHOD_SELECT, keeping the cart.
    pub fn back(&mut self) -> CoreResult<()> {
        self.machine.transition(CheckoutPhase::MethodSelect)?;
        self.method = None;
        self.tendered = None;
        Ok(())
    }

    /// Abandons the sale before PROCESSING. No remote call is made.
    pub fn discard(&mut self) -> CoreResult<()> {
        self.machine.cancel()?;
        self.reset_sale();
        Ok(())
    }

    /// SUCCESS → METHOD_SELECT with an empty cart.
    pub fn start_new_sale(&mut self) -> CoreResult<()> {
        if self.phase() != CheckoutPhase::Success {
            return Err(CoreError::IllegalTransition {
                from: self.phase(),
                to: CheckoutPhase::MethodSelect,
            });
        }
        self.machine.transition(CheckoutPhase::MethodSelect)?;
        self.reset_sale();
        Ok(())
    }

    fn reset_sale(&mut self) {
        self.cart.clear();
        self.method = None;
        self.tendered = None;
        self.pricing.discount = DiscountRate::default();
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commits the sale for `business_id`.
    ///
    /// On error the session is left in ERROR with the cart intact.
    pub async fn commit(
        &mut self,
        ctx: &Arc<SyncContext>,
        business_id: &str,
    ) -> SyncResult<Receipt> {
        let Some(method) = self.method.filter(|_| self.phase() == CheckoutPhase::Review) else {
            return Err(CoreError::IllegalTransition {
                from: self.phase(),
                to: CheckoutPhase::Processing,
            }
            .into());
        };
        self.machine.transition(CheckoutPhase::Processing)?;

        if let Err(e) = self.recheck_stock(ctx).await {
            warn!(error = %e, "Stock re-check failed, sale aborted");
            self.machine.fail(CheckoutErrorKind::StockSync)?;
            return Err(e.into());
        }

        let totals = self.totals();
        let sale_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        match self.persist_sale(ctx, business_id, &sale_id, method, created_at).await {
            Ok(transactions) => {
                self.machine.transition(CheckoutPhase::Success)?;
                let receipt = Receipt {
                    sale_id,
                    lines: self.cart.items().to_vec(),
                    totals,
                    payment_method: method,
                    tendered: self.tendered,
                    change: self.change(),
                    transactions,
                    created_at,
                };
                self.cart.clear();

                info!(
                    sale_id = %receipt.sale_id,
                    lines = receipt.lines.len(),
                    total_cents = totals.total.cents(),
                    "Sale committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(%sale_id, ?e, "Failed to persist sale");
                self.machine.fail(CheckoutErrorKind::Persistence)?;
                Err(e)
            }
        }
    }

    /// Every line must still be covered by the latest known stock.
    async fn recheck_stock(&self, ctx: &SyncContext) -> CoreResult<()> {
        let collections = ctx.collections.read().await;
        for item in self.cart.items() {
            let product = collections
                .products
                .get(&item.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;
            if !product.can_sell(item.quantity) {
                return Err(CoreError::InsufficientStock {
                    sku: product.sku.clone(),
                    available: product.stock,
                    requested: item.quantity,
                });
            }
        }
        Ok(())
    }

    /// Lands the whole sale locally as one unit, then sends it.
    ///
    /// Both table locks are held throughout, transactions before products.
    /// Once the local write succeeds the sale stands; remote trouble only
    /// queues it.
    async fn persist_sale(
        &self,
        ctx: &Arc<SyncContext>,
        business_id: &str,
        sale_id: &str,
        method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> SyncResult<Vec<Transaction>> {
        let transactions: Vec<Transaction> = self
            .cart
            .items()
            .iter()
            .map(|item| {
                Transaction::completed(
                    sale_id,
                    business_id,
                    &item.product_id,
                    item.unit_price(),
                    item.quantity,
                    method,
                    created_at,
                )
            })
            .collect();

        let _lines_guard = ctx.table_lock(Table::Transactions).lock().await;
        let _stock_guard = ctx.table_lock(Table::Products).lock().await;

        let stock = apply_sale_locally(ctx, business_id, &transactions, self.cart.items()).await?;

        let writer = WritePath::new(ctx.clone());
        for (table, entries) in [
            (Table::Transactions, record_entries(&transactions)?),
            (Table::Products, record_entries(&stock)?),
        ] {
            if let Err(e) = writer
                .push_locked(table, MutationOp::Upsert, business_id, entries)
                .await
            {
                error!(%sale_id, table = %table, error = %e, "Sale stored locally but not yet queued durably");
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Error recovery
    // =========================================================================

    /// ERROR → METHOD_SELECT, then refreshes product stock from the remote.
    ///
    /// The refresh is best effort: offline, the cashier retries against the
    /// stock already known.
    pub async fn acknowledge_error(
        &mut self,
        ctx: &SyncContext,
        business_id: &str,
    ) -> SyncResult<()> {
        if self.phase() != CheckoutPhase::Error {
            return Err(CoreError::IllegalTransition {
                from: self.phase(),
                to: CheckoutPhase::MethodSelect,
            }
            .into());
        }
        self.machine.transition(CheckoutPhase::MethodSelect)?;
        self.method = None;
        self.tendered = None;

        if let Err(e) = refresh_products(ctx, business_id).await {
            warn!(error = %e, "Could not refresh stock after checkout error");
        }
        Ok(())
    }
}

/// Writes the sale lines and the lowered stock to the cache, then to
/// memory. If either cache write fails the cache is put back and memory is
/// untouched. Returns the updated products.
async fn apply_sale_locally(
    ctx: &SyncContext,
    business_id: &str,
    transactions: &[Transaction],
    lines: &[CartItem],
) -> SyncResult<Vec<Product>> {
    let mut collections = ctx.collections.write().await;
    let stock = StockLedger::plan_sale(&collections.products, lines)?;

    let mut next_lines = collections.transactions.clone();
    for transaction in transactions {
        next_lines.upsert(transaction.clone());
    }
    let mut next_products = collections.products.clone();
    for product in &stock {
        next_products.upsert(product.clone());
    }

    let lines_key = CacheKey::table(business_id, Table::Transactions);
    let products_key = CacheKey::table(business_id, Table::Products);
    let previous_lines = collections.transactions.to_records()?;
    let lines_snapshot = next_lines.to_records()?;
    let products_snapshot = next_products.to_records()?;

    ctx.cache().put(&lines_key, lines_snapshot).await?;
    if let Err(e) = ctx.cache().put(&products_key, products_snapshot).await {
        if let Err(restore) = ctx.cache().put(&lines_key, previous_lines).await {
            error!(error = %restore, "Could not restore cached transactions");
        }
        return Err(e.into());
    }

    collections.transactions = next_lines;
    collections.products = next_products;
    Ok(stock)
}

fn record_entries<T: Entity>(records: &[T]) -> SyncResult<Vec<(String, Value)>> {
    records
        .iter()
        .map(|record| Ok((record.id().to_string(), record.to_record()?)))
        .collect()
}

/// Pulls current product rows from the remote.
///
/// Queued product writes are replayed first. If they all went through the
/// remote rows replace the local set, so products deleted elsewhere go away;
/// otherwise the rows are merged by id and the queued edits stay visible.
async fn refresh_products(ctx: &SyncContext, business_id: &str) -> SyncResult<usize> {
    let _guard = ctx.table_lock(Table::Products).lock().await;
    let replay = replay_table_locked(ctx, Table::Products).await?;

    let records = with_timeout(
        ctx.request_timeout(),
        ctx.remote().fetch(Table::Products, business_id),
    )
    .await?;

    let refreshed = {
        let mut collections = ctx.collections.write().await;
        if replay.remaining == 0 {
            collections.replace_from_records(Table::Products, records).0
        } else {
            let (products, _rejected) = decode_records::<Product>(records);
            let refreshed = products.len();
            for product in products {
                collections.products.upsert(product);
            }
            refreshed
        }
    };
    ctx.persist_table(business_id, Table::Products).await?;

    info!(refreshed, replaced = replay.remaining == 0, "Product stock refreshed");
    Ok(refreshed)
}
