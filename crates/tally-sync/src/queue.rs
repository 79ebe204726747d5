//! # Offline Write Queue
//!
//! Durable FIFO of mutations the remote store has not acknowledged yet.
//!
//! ## Replay
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         sync_pending()                                  │
//! │                                                                         │
//! │   products      ─► o1 ✓ ─► o2 ✓ ─► o3 ✓            (queue empty)       │
//! │   transactions  ─► o4 ✓ ─► o5 ✗  stop             (o5, o6 retained)    │
//! │   suppliers     ─► (nothing queued)                                    │
//! │                                                                         │
//! │   Tables replay concurrently. Within one table entries go strictly in  │
//! │   `seq` order and the first failure halts that table only.             │
//! │   An entry leaves the queue only after the remote acknowledges it.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue is written to the cache after every change, so a crash between
//! enqueue and replay loses nothing.

use futures_util::future::join_all;
use serde_json::Value;
use tally_core::{MutationOp, PendingAction, Table};
use tally_db::{load_json, store_json, CacheKey, LocalCache};
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::remote::with_timeout;

// =============================================================================
// Queue
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct OfflineQueue {
    entries: Vec<PendingAction>,
    next_seq: u64,
}

impl OfflineQueue {
    /// Restores the persisted queue, or starts empty.
    pub async fn load(cache: &dyn LocalCache) -> SyncResult<Self> {
        let mut entries: Vec<PendingAction> =
            load_json(cache, &CacheKey::PendingQueue).await?.unwrap_or_default();
        entries.sort_by_key(|e| e.seq);
        let next_seq = entries.last().map_or(0, |e| e.seq + 1);

        if !entries.is_empty() {
            info!(pending = entries.len(), "Restored offline queue");
        }

        Ok(OfflineQueue { entries, next_seq })
    }

    pub async fn persist(&self, cache: &dyn LocalCache) -> SyncResult<()> {
        store_json(cache, &CacheKey::PendingQueue, &self.entries).await?;
        Ok(())
    }

    pub fn enqueue(
        &mut self,
        table: Table,
        operation: MutationOp,
        business_id: &str,
        record_id: &str,
        payload: Value,
    ) -> PendingAction {
        let seq = self.next_seq;
        self.next_seq += 1;

        let action = match operation {
            MutationOp::Upsert => PendingAction::upsert(seq, table, business_id, record_id, payload),
            MutationOp::Delete => PendingAction::delete(seq, table, business_id, record_id),
        };
        self.entries.push(action.clone());
        action
    }

    /// Entries for `table` in replay order.
    pub fn pending_for(&self, table: Table) -> Vec<PendingAction> {
        self.entries
            .iter()
            .filter(|e| e.table == table)
            .cloned()
            .collect()
    }

    pub fn has_pending(&self, table: Table) -> bool {
        self.entries.iter().any(|e| e.table == table)
    }

    pub fn count_for(&self, table: Table, business_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.table == table && e.business_id == business_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops an acknowledged entry.
    pub fn acknowledge(&mut self, id: &str) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn record_failure(&mut self, id: &str, error: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
    }

    /// Removes the entries of `business_id` for `table`. Returns how many
    /// were dropped.
    pub fn discard_table(&mut self, table: Table, business_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.table == table && e.business_id == business_id));
        before - self.entries.len()
    }
}

// =============================================================================
// Replay
// =============================================================================

/// Outcome of replaying one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub table: Table,
    pub replayed: usize,
    pub remaining: usize,
    /// Error of the entry that halted replay, if any.
    pub halted_by: Option<String>,
}

/// Sends one mutation to the remote store, bounded by the request timeout.
pub(crate) async fn send(
    ctx: &SyncContext,
    table: Table,
    operation: MutationOp,
    business_id: &str,
    record_id: &str,
    payload: &Value,
) -> SyncResult<()> {
    let remote = ctx.remote();
    let call = async {
        match operation {
            MutationOp::Upsert => remote.upsert(table, payload.clone(), business_id).await,
            MutationOp::Delete => remote.delete(table, record_id).await,
        }
    };
    with_timeout(ctx.request_timeout(), call).await
}

async fn send_action(ctx: &SyncContext, action: &PendingAction) -> SyncResult<()> {
    send(
        ctx,
        action.table,
        action.operation,
        &action.business_id,
        &action.record_id,
        &action.payload,
    )
    .await
}

/// Replays `table` in order. The caller holds the table lock.
pub(crate) async fn replay_table_locked(ctx: &SyncContext, table: Table) -> SyncResult<ReplayReport> {
    let pending = ctx.queue.lock().await.pending_for(table);
    let mut replayed = 0;
    let mut halted_by = None;

    for action in &pending {
        match send_action(ctx, action).await {
            Ok(()) => {
                let mut queue = ctx.queue.lock().await;
                queue.acknowledge(&action.id);
                queue.persist(ctx.cache()).await?;
                replayed += 1;
                debug!(table = %table, seq = action.seq, "Replayed pending action");
            }
            Err(e) => {
                warn!(
                    table = %table,
                    seq = action.seq,
                    attempts = action.attempts + 1,
                    error = %e,
                    "Replay halted, entry retained"
                );
                let mut queue = ctx.queue.lock().await;
                queue.record_failure(&action.id, &e.to_string());
                queue.persist(ctx.cache()).await?;
                halted_by = Some(e.to_string());
                break;
            }
        }
    }

    Ok(ReplayReport {
        table,
        replayed,
        remaining: pending.len() - replayed,
        halted_by,
    })
}

/// Replays one table, taking its lock.
pub async fn replay_table(ctx: &SyncContext, table: Table) -> SyncResult<ReplayReport> {
    let _guard = ctx.table_lock(table).lock().await;
    replay_table_locked(ctx, table).await
}

/// Replays every table concurrently.
pub async fn sync_pending(ctx: &SyncContext) -> SyncResult<Vec<ReplayReport>> {
    let results = join_all(Table::ALL.iter().map(|table| replay_table(ctx, *table))).await;
    let reports = results.into_iter().collect::<SyncResult<Vec<_>>>()?;

    let replayed: usize = reports.iter().map(|r| r.replayed).sum();
    let remaining: usize = reports.iter().map(|r| r.remaining).sum();
    if replayed > 0 || remaining > 0 {
        info!(replayed, remaining, "Pending actions replayed");
    }

    Ok(reports)
}
