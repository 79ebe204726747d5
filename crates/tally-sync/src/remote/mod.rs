//! # Remote Store Adapter
//!
//! The seam between the engine and the authoritative remote store.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RemoteStore (trait)                                │
//! │                                                                         │
//! │  fetch(table, business)          → records[]      load, resync, retry  │
//! │  upsert(table, record, business) → ()             write path, replay   │
//! │  upsert_many(table, records)     → ()             lines of one sale    │
//! │  delete(table, id)               → ()             write path, replay   │
//! │  count(table, business)          → i64            diagnostics          │
//! │  subscribe(tables, business)     → ChangeFeed     realtime merge       │
//! │  unsubscribe(handle)             → ()             business switch      │
//! │  authenticate(email, password)   → AuthOutcome    sign-in (never Err)  │
//! │                                                                         │
//! │  Every call made by the engine is wrapped in `with_timeout`.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::{AuthUser, Business, ChangeEvent, Table};
use tokio::sync::mpsc;

use crate::error::{SyncError, SyncResult};

pub use memory::InMemoryRemote;

// =============================================================================
// Realtime Types
// =============================================================================

/// One remote realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub id: String,
    pub table: Table,
    pub business_id: String,
}

/// A live stream of change notifications.
///
/// Single consumer: the receiver is moved into the pump task.
#[derive(Debug)]
pub struct ChangeFeed {
    pub handles: Vec<ChannelHandle>,
    pub events: mpsc::Receiver<ChangeEvent>,
}

// =============================================================================
// Authentication
// =============================================================================

/// Result of a sign-in attempt. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthOutcome {
    Success { user: AuthUser, business: Business },
    Failure { error: String, code: String },
}

impl AuthOutcome {
    pub fn failure(error: impl Into<String>, code: impl Into<String>) -> Self {
        AuthOutcome::Failure {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }
}

// =============================================================================
// RemoteStore Trait
// =============================================================================

/// Client for the remote authoritative store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every record of `table` owned by `business_id`.
    async fn fetch(&self, table: Table, business_id: &str) -> SyncResult<Vec<Value>>;

    /// Full-record overwrite by id.
    async fn upsert(&self, table: Table, record: Value, business_id: &str) -> SyncResult<()>;

    /// Overwrites several records of one table in a single call. Either
    /// every record is stored or none is.
    async fn upsert_many(
        &self,
        table: Table,
        records: Vec<Value>,
        business_id: &str,
    ) -> SyncResult<()>;

    /// Deleting an absent id succeeds.
    async fn delete(&self, table: Table, id: &str) -> SyncResult<()>;

    async fn count(&self, table: Table, business_id: &str) -> SyncResult<i64>;

    async fn subscribe(&self, tables: &[Table], business_id: &str) -> SyncResult<ChangeFeed>;

    async fn unsubscribe(&self, handle: &ChannelHandle) -> SyncResult<()>;

    async fn authenticate(&self, email: &str, password: &str) -> AuthOutcome;
}

/// Bounds a remote call. Expiry becomes [`SyncError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: SyncResult<()> = with_timeout(Duration::from_millis(20), async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: SyncResult<()> = with_timeout(Duration::from_secs(1), async {
            Err(SyncError::Network("down".into()))
        })
        .await;
        assert!(err.unwrap_err().is_network());
    }

    #[test]
    fn test_auth_outcome_wire_shape() {
        let json = serde_json::to_value(AuthOutcome::failure("bad password", "INVALID_CREDENTIALS"))
            .unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["code"], "INVALID_CREDENTIALS");
    }
}
