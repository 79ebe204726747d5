//! # Remote Change Merge
//!
//! Applies realtime change notifications to the in-memory collections.
//!
//! ```text
//! ChangeEvent { table, operation, payload }
//!      │
//!      ├── other business ─────────────► Ignored
//!      ├── DELETE  ─► remove payload.id ─► Removed | Ignored (absent)
//!      └── INSERT / UPDATE
//!             ├── invalid payload ─────► Ignored (warn)
//!             ├── id present ──────────► Replaced (in place)
//!             └── id absent ───────────► Inserted (prepended for transactions)
//! ```
//!
//! Applying the same event twice gives the same collection as applying it once.

use serde_json::Value;
use tally_core::{
    record_business_id, ChangeEvent, ChangeOperation, Product, Supplier, Table, Transaction,
};
use tracing::{debug, warn};

use crate::collections::{Collections, Stored, Upserted};
use crate::context::SyncContext;
use crate::error::SyncResult;

/// What merging one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Ignored)
    }
}

impl From<Upserted> for MergeOutcome {
    fn from(upserted: Upserted) -> Self {
        match upserted {
            Upserted::Inserted => MergeOutcome::Inserted,
            Upserted::Replaced => MergeOutcome::Replaced,
        }
    }
}

/// Applies one event to `collections` for the active business.
pub fn apply_change(
    collections: &mut Collections,
    event: &ChangeEvent,
    active_business: &str,
) -> MergeOutcome {
    if record_business_id(&event.payload).is_some_and(|b| b != active_business) {
        debug!(table = %event.table, "Ignoring change for another business");
        return MergeOutcome::Ignored;
    }

    match event.operation {
        ChangeOperation::Delete => match event.record_id() {
            Some(id) if collections.remove(event.table, id) => MergeOutcome::Removed,
            _ => MergeOutcome::Ignored,
        },
        ChangeOperation::Insert | ChangeOperation::Update => {
            let payload = event.payload.clone();
            match event.table {
                Table::Products => merge_record::<Product>(collections, payload, active_business),
                Table::Transactions => {
                    merge_record::<Transaction>(collections, payload, active_business)
                }
                Table::Suppliers => merge_record::<Supplier>(collections, payload, active_business),
            }
        }
    }
}

fn merge_record<T: Stored>(
    collections: &mut Collections,
    payload: Value,
    active_business: &str,
) -> MergeOutcome {
    let record = match T::from_record(payload) {
        Ok(record) => record,
        Err(e) => {
            warn!(table = %T::TABLE, error = %e, "Dropping invalid realtime payload");
            return MergeOutcome::Ignored;
        }
    };

    if record.business_id() != active_business {
        return MergeOutcome::Ignored;
    }

    collections.of_mut::<T>().upsert(record).into()
}

/// Merges an event into the shared collections and persists the table.
pub async fn merge_event(
    ctx: &SyncContext,
    event: &ChangeEvent,
    active_business: &str,
) -> SyncResult<MergeOutcome> {
    let outcome = apply_change(&mut *ctx.collections.write().await, event, active_business);

    if outcome.changed() {
        ctx.persist_table(active_business, event.table).await?;
        debug!(table = %event.table, ?outcome, "Merged realtime change");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, product, transaction, BUSINESS};
    use serde_json::json;
    use tally_core::Entity;

    fn event(table: Table, operation: ChangeOperation, payload: Value) -> ChangeEvent {
        ChangeEvent::new(table, operation, payload)
    }

    #[test]
    fn test_repeated_delete_is_harmless() {
        let mut all = Collections::default();
        all.transactions.upsert(transaction("t1", "p1", 1));
        all.transactions.upsert(transaction("t2", "p1", 1));

        let delete = event(Table::Transactions, ChangeOperation::Delete, json!({ "id": "t1" }));
        assert_eq!(apply_change(&mut all, &delete, BUSINESS), MergeOutcome::Removed);
        assert_eq!(apply_change(&mut all, &delete, BUSINESS), MergeOutcome::Ignored);

        assert!(all.transactions.get("t1").is_none());
        assert_eq!(all.transactions.len(), 1);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut all = Collections::default();
        all.products.upsert(product("p1", 100, 5));
        all.products.upsert(product("p2", 100, 5));

        let mut changed = product("p1", 100, 2);
        changed.name = "Renamed".into();
        let update = event(Table::Products, ChangeOperation::Update, changed.to_record().unwrap());

        assert_eq!(apply_change(&mut all, &update, BUSINESS), MergeOutcome::Replaced);
        assert_eq!(all.products.items()[0].name, "Renamed");
        assert_eq!(all.products.len(), 2);

        // Same event again leaves the same state.
        let before = all.products.items().to_vec();
        apply_change(&mut all, &update, BUSINESS);
        assert_eq!(all.products.items(), before.as_slice());
    }

    #[test]
    fn test_insert_prepends_transactions() {
        let mut all = Collections::default();
        all.transactions.upsert(transaction("t1", "p1", 1));

        let insert = event(
            Table::Transactions,
            ChangeOperation::Insert,
            transaction("t2", "p1", 3).to_record().unwrap(),
        );
        assert_eq!(apply_change(&mut all, &insert, BUSINESS), MergeOutcome::Inserted);
        assert_eq!(all.transactions.items()[0].id, "t2");
    }

    #[test]
    fn test_other_business_and_invalid_payloads_ignored() {
        let mut all = Collections::default();

        let mut foreign = product("p9", 100, 1);
        foreign.business_id = "biz-other".into();
        let foreign = event(Table::Products, ChangeOperation::Insert, foreign.to_record().unwrap());
        assert_eq!(apply_change(&mut all, &foreign, BUSINESS), MergeOutcome::Ignored);

        let broken = event(Table::Products, ChangeOperation::Insert, json!({ "id": "p1" }));
        assert_eq!(apply_change(&mut all, &broken, BUSINESS), MergeOutcome::Ignored);

        let foreign_delete = event(
            Table::Products,
            ChangeOperation::Delete,
            json!({ "id": "p1", "business_id": "biz-other" }),
        );
        all.products.upsert(product("p1", 100, 1));
        assert_eq!(apply_change(&mut all, &foreign_delete, BUSINESS), MergeOutcome::Ignored);
        assert!(all.products.get("p1").is_some());
    }

    #[tokio::test]
    async fn test_merge_event_persists_table() {
        let (ctx, _remote, cache) = context().await;
        let insert = event(
            Table::Products,
            ChangeOperation::Insert,
            product("p1", 100, 1).to_record().unwrap(),
        );

        let outcome = merge_event(&ctx, &insert, BUSINESS).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);

        let cached = tally_db::LocalCache::get(
            cache.as_ref(),
            &tally_db::CacheKey::table(BUSINESS, Table::Products),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(cached.as_array().map(Vec::len), Some(1));
    }
}
