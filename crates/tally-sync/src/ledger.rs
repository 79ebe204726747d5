//! # Stock Ledger
//!
//! Lowers product stock after a sale, one line at a time.
//!
//! The new stock is `max(0, current - qty)` and the updated product goes
//! through the ordinary [`WritePath`], so a decrement made offline is queued
//! like any other edit. Decrements are not atomic across lines or terminals:
//! two terminals selling the last unit while partitioned both succeed, and
//! the drift shows up later in diagnostics.
//!
//! A checkout computes all of its decrements up front with
//! [`StockLedger::plan_sale`] so the sale lands locally as one unit.

use std::sync::Arc;

use tally_core::{CartItem, CoreError, Product};
use tracing::debug;

use crate::collections::Collection;
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::writer::{WriteOutcome, WritePath};

#[derive(Clone)]
pub struct StockLedger {
    ctx: Arc<SyncContext>,
    writer: WritePath,
}

impl StockLedger {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let writer = WritePath::new(ctx.clone());
        StockLedger { ctx, writer }
    }

    /// Decrements `product_id` by `quantity` based on the latest known stock.
    pub async fn decrement(
        &self,
        product_id: &str,
        quantity: i64,
    ) -> SyncResult<(Product, WriteOutcome)> {
        let updated = {
            let collections = self.ctx.collections.read().await;
            let current = collections
                .products
                .get(product_id)
                .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
            current.with_stock_decremented(quantity)
        };

        debug!(
            product_id,
            quantity,
            new_stock = updated.stock,
            "Decrementing stock"
        );

        let outcome = self.writer.store(updated.clone()).await?;
        Ok((updated, outcome))
    }

    /// The products a sale lowers, one decrement per line, without writing
    /// anything. Lines for the same product accumulate.
    pub fn plan_sale(products: &Collection<Product>, lines: &[CartItem]) -> SyncResult<Vec<Product>> {
        let mut planned: Vec<Product> = Vec::with_capacity(lines.len());
        for line in lines {
            match planned.iter_mut().find(|p| p.id == line.product_id) {
                Some(product) => *product = product.with_stock_decremented(line.quantity),
                None => {
                    let current = products
                        .get(&line.product_id)
                        .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
                    planned.push(current.with_stock_decremented(line.quantity));
                }
            }
        }
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, product};
    use crate::error::SyncError;
    use tally_core::Table;

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        let ledger = StockLedger::new(ctx.clone());
        writer.upsert(product("p1", 100, 3)).await.unwrap();

        let (updated, outcome) = ledger.decrement("p1", 2).await.unwrap();
        assert_eq!(updated.stock, 1);
        assert_eq!(outcome, WriteOutcome::Synced);

        let (updated, _) = ledger.decrement("p1", 5).await.unwrap();
        assert_eq!(updated.stock, 0);
        assert_eq!(remote.get(Table::Products, "p1").await.unwrap()["stock"], 0);
    }

    #[tokio::test]
    async fn test_offline_decrement_is_queued() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        let ledger = StockLedger::new(ctx.clone());
        writer.upsert(product("p1", 100, 10)).await.unwrap();

        remote.set_online(false);
        let (updated, outcome) = ledger.decrement("p1", 3).await.unwrap();
        assert_eq!(updated.stock, 7);
        assert_eq!(outcome, WriteOutcome::Queued);
        assert_eq!(ctx.collections.read().await.products.get("p1").unwrap().stock, 7);
    }

    #[test]
    fn test_plan_sale_accumulates_and_writes_nothing() {
        let mut products = Collection::<Product>::default();
        products.upsert(product("p1", 100, 5));
        products.upsert(product("p2", 100, 1));

        let lines = vec![
            CartItem::from_product(&product("p1", 100, 5), 2),
            CartItem::from_product(&product("p2", 100, 1), 3),
            CartItem::from_product(&product("p1", 100, 5), 1),
        ];
        let planned = StockLedger::plan_sale(&products, &lines).unwrap();

        let stock: Vec<(&str, i64)> = planned.iter().map(|p| (p.id.as_str(), p.stock)).collect();
        assert_eq!(stock, vec![("p1", 2), ("p2", 0)]);
        assert_eq!(products.get("p1").unwrap().stock, 5);

        let missing = vec![CartItem::from_product(&product("p9", 100, 1), 1)];
        assert!(StockLedger::plan_sale(&products, &missing).is_err());
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (ctx, _remote, _cache) = context().await;
        let ledger = StockLedger::new(ctx.clone());

        let err = ledger.decrement("missing", 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::ProductNotFound(_))));
    }
}
