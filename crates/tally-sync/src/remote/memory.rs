//! In-process [`RemoteStore`] used by tests and demo terminals.
//!
//! It behaves like the real store (business scoping, overwrite-by-id,
//! idempotent deletes, realtime fan-out) and can be degraded on demand:
//!
//! - `set_online(false)`: every call fails with [`SyncError::Network`]
//! - `set_hanging(true)`: every call blocks forever (exercises timeouts)
//! - `set_reject_writes(true)`: writes fail with [`SyncError::Rejected`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tally_core::{record_business_id, record_id, AuthUser, Business, ChangeEvent, ChangeOperation, Table};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{AuthOutcome, ChangeFeed, ChannelHandle, RemoteStore};
use crate::error::{SyncError, SyncResult};

/// Buffer of each realtime feed.
const FEED_CAPACITY: usize = 256;

struct Account {
    password: String,
    user: AuthUser,
    business: Business,
}

struct Subscriber {
    handles: Vec<ChannelHandle>,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
pub struct InMemoryRemote {
    /// Rows keyed by table, in insertion order.
    rows: Mutex<HashMap<Table, Vec<Value>>>,
    accounts: Mutex<HashMap<String, Account>>,
    subscribers: Mutex<Vec<Subscriber>>,
    offline: AtomicBool,
    hanging: AtomicBool,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
    batches: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of accepted upserts and deletes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of accepted `upsert_many` calls.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub async fn add_account(&self, email: &str, password: &str, user: AuthUser, business: Business) {
        self.accounts.lock().await.insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                user,
                business,
            },
        );
    }

    /// Seeds rows without counting writes or notifying subscribers.
    pub async fn seed(&self, table: Table, records: Vec<Value>) {
        let mut rows = self.rows.lock().await;
        let table_rows = rows.entry(table).or_default();
        for record in records {
            upsert_row(table_rows, record);
        }
    }

    /// Current row for `id`, if any.
    pub async fn get(&self, table: Table, id: &str) -> Option<Value> {
        self.rows
            .lock()
            .await
            .get(&table)
            .and_then(|rows| rows.iter().find(|r| record_id(r) == Some(id)).cloned())
    }

    /// Number of live realtime channels.
    pub async fn active_channels(&self) -> usize {
        self.subscribers
            .lock()
            .await
            .iter()
            .filter(|s| !s.sender.is_closed())
            .map(|s| s.handles.len())
            .sum()
    }

    /// Applies a change made by another terminal and broadcasts it.
    pub async fn external_change(&self, table: Table, operation: ChangeOperation, payload: Value) {
        {
            let mut rows = self.rows.lock().await;
            let table_rows = rows.entry(table).or_default();
            match operation {
                ChangeOperation::Delete => {
                    if let Some(id) = record_id(&payload) {
                        let id = id.to_string();
                        table_rows.retain(|r| record_id(r) != Some(id.as_str()));
                    }
                }
                ChangeOperation::Insert | ChangeOperation::Update => {
                    upsert_row(table_rows, payload.clone());
                }
            }
        }
        self.emit(ChangeEvent::new(table, operation, payload)).await;
    }

    /// Delivers an event to every subscriber of its table.
    ///
    /// Events carrying a `business_id` only reach that business's channels.
    pub async fn emit(&self, event: ChangeEvent) {
        let business = record_business_id(&event.payload).map(str::to_string);
        let subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter() {
            let listens = subscriber.handles.iter().any(|h| {
                h.table == event.table
                    && business.as_deref().map_or(true, |b| b == h.business_id)
            });
            if listens && subscriber.sender.send(event.clone()).await.is_err() {
                debug!(table = %event.table, "Dropping event for closed feed");
            }
        }
    }

    /// Fails fast when offline, never returns when hanging.
    async fn gate(&self) -> SyncResult<()> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Network("remote store unreachable".into()));
        }
        Ok(())
    }

    async fn gate_write(&self, table: Table) -> SyncResult<()> {
        self.gate().await?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected {
                table,
                reason: "write rejected by remote policy".into(),
            });
        }
        Ok(())
    }
}

fn upsert_row(rows: &mut Vec<Value>, record: Value) {
    let id = record_id(&record).map(str::to_string);
    match rows
        .iter_mut()
        .find(|r| id.is_some() && record_id(r) == id.as_deref())
    {
        Some(existing) => *existing = record,
        None => rows.push(record),
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch(&self, table: Table, business_id: &str) -> SyncResult<Vec<Value>> {
        self.gate().await?;
        Ok(self
            .rows
            .lock()
            .await
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| record_business_id(r) == Some(business_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, table: Table, mut record: Value, business_id: &str) -> SyncResult<()> {
        self.gate_write(table).await?;
        if record_id(&record).is_none() {
            return Err(SyncError::Rejected {
                table,
                reason: "record has no id".into(),
            });
        }
        if let Some(obj) = record.as_object_mut() {
            obj.entry("business_id")
                .or_insert_with(|| Value::String(business_id.to_string()));
        }
        upsert_row(self.rows.lock().await.entry(table).or_default(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_many(
        &self,
        table: Table,
        records: Vec<Value>,
        business_id: &str,
    ) -> SyncResult<()> {
        self.gate_write(table).await?;
        if records.iter().any(|r| record_id(r).is_none()) {
            return Err(SyncError::Rejected {
                table,
                reason: "batch contains a record without id".into(),
            });
        }

        let count = records.len();
        let mut rows = self.rows.lock().await;
        let table_rows = rows.entry(table).or_default();
        for mut record in records {
            if let Some(obj) = record.as_object_mut() {
                obj.entry("business_id")
                    .or_insert_with(|| Value::String(business_id.to_string()));
            }
            upsert_row(table_rows, record);
        }
        self.writes.fetch_add(count, Ordering::SeqCst);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> SyncResult<()> {
        self.gate_write(table).await?;
        if let Some(rows) = self.rows.lock().await.get_mut(&table) {
            rows.retain(|r| record_id(r) != Some(id));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self, table: Table, business_id: &str) -> SyncResult<i64> {
        Ok(self.fetch(table, business_id).await?.len() as i64)
    }

    async fn subscribe(&self, tables: &[Table], business_id: &str) -> SyncResult<ChangeFeed> {
        self.gate().await?;
        let (sender, events) = mpsc::channel(FEED_CAPACITY);
        let handles: Vec<ChannelHandle> = tables
            .iter()
            .map(|table| ChannelHandle {
                id: Uuid::new_v4().to_string(),
                table: *table,
                business_id: business_id.to_string(),
            })
            .collect();

        self.subscribers.lock().await.push(Subscriber {
            handles: handles.clone(),
            sender,
        });

        Ok(ChangeFeed { handles, events })
    }

    async fn unsubscribe(&self, handle: &ChannelHandle) -> SyncResult<()> {
        let mut subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter_mut() {
            subscriber.handles.retain(|h| h.id != handle.id);
        }
        subscribers.retain(|s| !s.handles.is_empty());
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> AuthOutcome {
        if let Err(e) = self.gate().await {
            return AuthOutcome::failure(e.to_string(), "NETWORK_ERROR");
        }
        match self.accounts.lock().await.get(&email.to_lowercase()) {
            Some(account) if account.password == password => AuthOutcome::Success {
                user: account.user.clone(),
                business: account.business.clone(),
            },
            _ => AuthOutcome::failure("Invalid email or password", "INVALID_CREDENTIALS"),
        }
    }
}
