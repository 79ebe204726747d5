//! # Diagnostics & Forced Resync
//!
//! Compares what the terminal holds with what the remote store holds.
//!
//! ```text
//! ┌──────────────┬─────────────┬─────────────┬─────────┬──────────────┐
//! │ table        │ local_count │ cloud_count │ pending │ status       │
//! ├──────────────┼─────────────┼─────────────┼─────────┼──────────────┤
//! │ products     │ 42          │ 42          │ 0       │ Synced       │
//! │ transactions │ 130         │ 128         │ 2       │ Discrepancy  │
//! │ suppliers    │ 5           │ -1          │ 0       │ Offline      │
//! └──────────────┴─────────────┴─────────────┴─────────┴──────────────┘
//! ```
//!
//! Diagnostics only read. [`force_resync`] is the one destructive action and
//! runs only when an operator asks for it.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tally_core::{CloudCount, SyncDiagnostic, Table};
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::queue::replay_table_locked;
use crate::remote::with_timeout;

/// Diagnoses every table in `tables` concurrently.
pub async fn diagnose(ctx: &SyncContext, business_id: &str, tables: &[Table]) -> Vec<SyncDiagnostic> {
    join_all(tables.iter().map(|table| diagnose_table(ctx, business_id, *table))).await
}

async fn diagnose_table(ctx: &SyncContext, business_id: &str, table: Table) -> SyncDiagnostic {
    let cloud = match with_timeout(ctx.request_timeout(), ctx.remote().count(table, business_id)).await
    {
        Ok(count) => CloudCount::Count(count),
        Err(e) if e.is_network() => {
            warn!(table = %table, error = %e, "Remote unreachable for diagnostics");
            CloudCount::Offline
        }
        Err(e) => {
            warn!(table = %table, error = %e, "Remote count failed");
            CloudCount::Failed
        }
    };

    let local = ctx.collections.read().await.len(table) as i64;
    let pending = ctx.pending_count(table, business_id).await as i64;

    SyncDiagnostic::new(table, local, cloud, pending)
}

/// What a forced resync did to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncReport {
    pub table: Table,
    /// Records now held locally.
    pub records: usize,
    /// Remote records dropped because they failed validation.
    pub rejected: usize,
    /// Queued actions delivered before the snapshot was taken.
    pub replayed: usize,
    /// Queued actions thrown away because they could not be delivered.
    pub discarded: usize,
}

/// Replaces the local copy of `table` with the remote snapshot.
///
/// Queued actions are replayed first. If the snapshot cannot be fetched
/// nothing local changes. Once it is applied, whatever `business_id` still
/// has queued for the table is discarded, since the snapshot supersedes it.
/// Other businesses' queued actions are left alone.
pub async fn force_resync(
    ctx: &SyncContext,
    business_id: &str,
    table: Table,
) -> SyncResult<ResyncReport> {
    let _guard = ctx.table_lock(table).lock().await;

    let replay = replay_table_locked(ctx, table).await?;

    let records = with_timeout(ctx.request_timeout(), ctx.remote().fetch(table, business_id)).await?;

    let (kept, rejected) = ctx
        .collections
        .write()
        .await
        .replace_from_records(table, records);
    ctx.persist_table(business_id, table).await?;

    let discarded = {
        let mut queue = ctx.queue.lock().await;
        let discarded = queue.discard_table(table, business_id);
        if discarded > 0 {
            queue.persist(ctx.cache()).await?;
        }
        discarded
    };
    if discarded > 0 {
        warn!(table = %table, business_id, discarded, "Discarded undeliverable actions on forced resync");
    }

    info!(table = %table, records = kept, replayed = replay.replayed, "Forced resync complete");

    Ok(ResyncReport {
        table,
        records: kept,
        rejected,
        replayed: replay.replayed,
        discarded,
    })
}
