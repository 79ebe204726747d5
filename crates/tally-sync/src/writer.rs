//! # Write Path
//!
//! The single route every mutation takes, whatever component issues it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 WritePath::upsert / store / delete                      │
//! │                                                                         │
//! │   1. take the table lock                                                │
//! │   2. write the edited table to the local cache                          │
//! │        fail ─► error, memory untouched, nothing sent or queued          │
//! │   3. apply the same edit to the in-memory collection                    │
//! │   4. queue has entries for table?                                       │
//! │        yes ─► enqueue ─► replay table in order                          │
//! │        no  ─► remote call (with timeout)                                │
//! │                   ok   ─► Synced                                        │
//! │                   fail ─► enqueue ─► Queued                             │
//! │                                                                         │
//! │   The user action never fails because the remote is unreachable.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`WritePath::upsert`] holds records to the input rules of
//! [`Entity::validate`](tally_core::Entity::validate). [`WritePath::store`] is
//! for records the engine derives from ones it already holds (stock
//! decrements, refunds), which only need to be structurally sound.

use std::sync::Arc;

use serde_json::{json, Value};
use tally_core::{MutationOp, Table};
use tally_db::CacheKey;
use tracing::{debug, error, warn};

use crate::collections::{Collection, Stored};
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::queue::{replay_table_locked, send};
use crate::remote::with_timeout;

/// Where a mutation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote store acknowledged it.
    Synced,
    /// It waits in the offline queue.
    Queued,
}

#[derive(Clone)]
pub struct WritePath {
    ctx: Arc<SyncContext>,
}

impl WritePath {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        WritePath { ctx }
    }

    /// Writes a record entered at this terminal, replacing any record with
    /// the same id.
    pub async fn upsert<T: Stored>(&self, mut record: T) -> SyncResult<WriteOutcome> {
        record.normalize();
        record.validate()?;
        self.write(record).await
    }

    /// Writes a record derived from one already held.
    pub async fn store<T: Stored>(&self, mut record: T) -> SyncResult<WriteOutcome> {
        record.normalize();
        record.check_structure()?;
        self.write(record).await
    }

    /// Removes a record. Removing an unknown id still reaches the remote.
    pub async fn delete<T: Stored>(&self, business_id: &str, id: &str) -> SyncResult<WriteOutcome> {
        let _guard = self.ctx.table_lock(T::TABLE).lock().await;

        apply_locally::<T>(&self.ctx, business_id, |items| {
            items.remove(id);
        })
        .await?;

        let entries = vec![(id.to_string(), json!({ "id": id }))];
        self.push_locked(T::TABLE, MutationOp::Delete, business_id, entries)
            .await
    }

    async fn write<T: Stored>(&self, record: T) -> SyncResult<WriteOutcome> {
        let payload = record.to_record()?;
        let business_id = record.business_id().to_string();
        let id = record.id().to_string();

        let _guard = self.ctx.table_lock(T::TABLE).lock().await;

        apply_locally::<T>(&self.ctx, &business_id, |items| {
            items.upsert(record);
        })
        .await?;

        self.push_locked(T::TABLE, MutationOp::Upsert, &business_id, vec![(id, payload)])
            .await
    }

    /// Sends already-applied mutations of `table` to the remote, or queues
    /// them. The caller holds the table lock.
    ///
    /// Several upserts go out as one `upsert_many` call; if it fails each
    /// record is queued on its own.
    pub(crate) async fn push_locked(
        &self,
        table: Table,
        operation: MutationOp,
        business_id: &str,
        entries: Vec<(String, Value)>,
    ) -> SyncResult<WriteOutcome> {
        let ctx = self.ctx.as_ref();
        if entries.is_empty() {
            return Ok(WriteOutcome::Synced);
        }

        // Older queued writes for this table must reach the remote first.
        if ctx.queue.lock().await.has_pending(table) {
            self.enqueue(table, operation, business_id, &entries).await?;
            let report = replay_table_locked(ctx, table).await?;
            return Ok(if report.remaining == 0 {
                WriteOutcome::Synced
            } else {
                WriteOutcome::Queued
            });
        }

        let result = match (operation, entries.as_slice()) {
            (_, [(record_id, payload)]) => {
                send(ctx, table, operation, business_id, record_id, payload).await
            }
            (MutationOp::Upsert, _) => {
                let records = entries.iter().map(|(_, payload)| payload.clone()).collect();
                with_timeout(
                    ctx.request_timeout(),
                    ctx.remote().upsert_many(table, records, business_id),
                )
                .await
            }
            (MutationOp::Delete, _) => {
                let mut outcome = Ok(());
                for (record_id, payload) in &entries {
                    outcome = send(ctx, table, operation, business_id, record_id, payload).await;
                    if outcome.is_err() {
                        break;
                    }
                }
                outcome
            }
        };

        match result {
            Ok(()) => {
                debug!(table = %table, %operation, records = entries.len(), "Remote write acknowledged");
                Ok(WriteOutcome::Synced)
            }
            Err(e) => {
                log_remote_failure(table, operation, &e);
                self.enqueue(table, operation, business_id, &entries).await?;
                Ok(WriteOutcome::Queued)
            }
        }
    }

    async fn enqueue(
        &self,
        table: Table,
        operation: MutationOp,
        business_id: &str,
        entries: &[(String, Value)],
    ) -> SyncResult<()> {
        let mut queue = self.ctx.queue.lock().await;
        for (record_id, payload) in entries {
            queue.enqueue(table, operation, business_id, record_id, payload.clone());
        }
        queue.persist(self.ctx.cache()).await
    }
}

/// Edits the cached copy of `T`'s table, then the in-memory one. If the
/// cache refuses the write, memory is left as it was.
async fn apply_locally<T: Stored>(
    ctx: &SyncContext,
    business_id: &str,
    edit: impl FnOnce(&mut Collection<T>),
) -> SyncResult<()> {
    let mut collections = ctx.collections.write().await;
    let mut next = collections.of::<T>().clone();
    edit(&mut next);

    ctx.cache()
        .put(&CacheKey::table(business_id, T::TABLE), next.to_records()?)
        .await?;
    *collections.of_mut::<T>() = next;
    Ok(())
}

fn log_remote_failure(table: Table, operation: MutationOp, e: &SyncError) {
    if e.is_retryable() {
        warn!(table = %table, %operation, error = %e, "Remote write failed, queued for replay");
    } else {
        error!(table = %table, %operation, error = %e, "Remote write failed unexpectedly, queued for replay");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, product, BUSINESS};
    use tally_core::{Entity, Product};
    use tally_db::load_json;

    #[tokio::test]
    async fn test_online_write_is_synced() {
        let (ctx, remote, cache) = context().await;
        let writer = WritePath::new(ctx.clone());

        let outcome = writer.upsert(product("p1", 100, 10)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Synced);
        assert!(ctx.queue.lock().await.is_empty());
        assert_eq!(remote.get(Table::Products, "p1").await.unwrap()["stock"], 10);

        let cached: Vec<Product> = load_json(cache.as_ref(), &CacheKey::table(BUSINESS, Table::Products))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_write_is_applied_locally_and_queued() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        remote.set_online(false);

        let outcome = writer.upsert(product("p1", 100, 7)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Queued);
        assert_eq!(ctx.collections.read().await.products.get("p1").unwrap().stock, 7);

        let pending = ctx.queue.lock().await.pending_for(Table::Products);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, MutationOp::Upsert);
    }

    #[tokio::test]
    async fn test_hung_remote_write_is_queued() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        remote.set_hanging(true);

        let outcome = writer.delete::<Product>(BUSINESS, "p1").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Queued);
        assert_eq!(ctx.pending_count(Table::Products, BUSINESS).await, 1);
    }

    #[tokio::test]
    async fn test_new_write_does_not_overtake_queue() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());

        remote.set_online(false);
        writer.upsert(product("p1", 100, 9)).await.unwrap();
        remote.set_online(true);

        // The queued write is flushed ahead of this one.
        let outcome = writer.upsert(product("p1", 100, 4)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Synced);
        assert!(ctx.queue.lock().await.is_empty());
        assert_eq!(remote.get(Table::Products, "p1").await.unwrap()["stock"], 4);
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_failure_leaves_no_trace() {
        let (ctx, remote, cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        writer.upsert(product("p1", 100, 5)).await.unwrap();
        cache.set_read_only(true);

        assert!(writer.upsert(product("p2", 100, 1)).await.is_err());
        assert!(writer.delete::<Product>(BUSINESS, "p1").await.is_err());

        let collections = ctx.collections.read().await;
        assert!(collections.products.get("p2").is_none());
        assert!(collections.products.get("p1").is_some());
        assert!(remote.get(Table::Products, "p2").await.is_none());
        assert!(remote.get(Table::Products, "p1").await.is_some());
        assert!(ctx.queue.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writes_reach_remote_in_local_order() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());

        let (a, b) = tokio::join!(
            writer.upsert(product("p1", 100, 1)),
            writer.upsert(product("p1", 100, 2)),
        );
        a.unwrap();
        b.unwrap();

        let local = ctx.collections.read().await.products.get("p1").unwrap().stock;
        assert_eq!(remote.get(Table::Products, "p1").await.unwrap()["stock"], local);
    }

    #[tokio::test]
    async fn test_store_accepts_remote_shaped_records() {
        let (ctx, _remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());

        let mut imported = product("p1", 100, 1);
        imported.sku = "A/B-12".into();
        assert!(writer.upsert(imported.clone()).await.is_err());
        assert_eq!(writer.store(imported).await.unwrap(), WriteOutcome::Synced);
    }

    #[tokio::test]
    async fn test_several_upserts_go_out_as_one_batch() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());
        let entries = |ids: &[&str]| {
            ids.iter()
                .map(|id| (id.to_string(), product(id, 100, 1).to_record().unwrap()))
                .collect::<Vec<_>>()
        };

        let outcome = {
            let _guard = ctx.table_lock(Table::Products).lock().await;
            writer
                .push_locked(Table::Products, MutationOp::Upsert, BUSINESS, entries(&["p1", "p2"]))
                .await
                .unwrap()
        };
        assert_eq!(outcome, WriteOutcome::Synced);
        assert_eq!((remote.batch_count(), remote.write_count()), (1, 2));

        // A refused batch is queued record by record.
        remote.set_online(false);
        let outcome = {
            let _guard = ctx.table_lock(Table::Products).lock().await;
            writer
                .push_locked(Table::Products, MutationOp::Upsert, BUSINESS, entries(&["p3", "p4"]))
                .await
                .unwrap()
        };
        assert_eq!(outcome, WriteOutcome::Queued);
        let queued: Vec<String> = ctx
            .queue
            .lock()
            .await
            .pending_for(Table::Products)
            .into_iter()
            .map(|e| e.record_id)
            .collect();
        assert_eq!(queued, vec!["p3", "p4"]);
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_written() {
        let (ctx, remote, _cache) = context().await;
        let writer = WritePath::new(ctx.clone());

        let mut bad = product("p1", 100, 1);
        bad.sku = String::new();
        assert!(writer.upsert(bad).await.is_err());
        assert!(ctx.collections.read().await.products.is_empty());
        assert_eq!(remote.write_count(), 0);
    }
}
