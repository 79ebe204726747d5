//! # Sync Context
//!
//! The state shared by every engine component.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncContext                                    │
//! │                                                                         │
//! │   remote ─────────► Arc<dyn RemoteStore>                               │
//! │   cache ──────────► Arc<dyn LocalCache>                                │
//! │   collections ────► RwLock<Collections>      (working copy)            │
//! │   queue ──────────► Mutex<OfflineQueue>      (durable FIFO)            │
//! │   table_locks ────► one Mutex per table      (serializes writes and    │
//! │                                               replay of that table)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tally_core::Table;
use tally_db::{CacheKey, LocalCache};
use tokio::sync::{Mutex, RwLock};

use crate::collections::Collections;
use crate::error::SyncResult;
use crate::queue::OfflineQueue;
use crate::remote::RemoteStore;

pub struct SyncContext {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) cache: Arc<dyn LocalCache>,
    pub(crate) collections: RwLock<Collections>,
    pub(crate) queue: Mutex<OfflineQueue>,
    table_locks: [Mutex<()>; 3],
    request_timeout: Duration,
}

impl SyncContext {
    /// Builds the context, restoring the offline queue from the cache.
    pub async fn new(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let queue = OfflineQueue::load(cache.as_ref()).await?;

        Ok(SyncContext {
            remote,
            cache,
            collections: RwLock::new(Collections::default()),
            queue: Mutex::new(queue),
            table_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub fn cache(&self) -> &dyn LocalCache {
        self.cache.as_ref()
    }

    /// Held while writing to or replaying `table`.
    pub(crate) fn table_lock(&self, table: Table) -> &Mutex<()> {
        let slot = match table {
            Table::Products => 0,
            Table::Transactions => 1,
            Table::Suppliers => 2,
        };
        &self.table_locks[slot]
    }

    /// Writes the current in-memory copy of `table` to the cache.
    pub async fn persist_table(&self, business_id: &str, table: Table) -> SyncResult<()> {
        let snapshot = self.collections.read().await.snapshot(table)?;
        self.cache
            .put(&CacheKey::table(business_id, table), snapshot)
            .await?;
        Ok(())
    }

    /// Pending entries for `table` and `business_id`.
    pub async fn pending_count(&self, table: Table, business_id: &str) -> usize {
        self.queue.lock().await.count_for(table, business_id)
    }
}
