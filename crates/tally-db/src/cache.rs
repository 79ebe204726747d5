//! # Local Cache
//!
//! Opaque durable storage consumed by the sync engine.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cache_entries                                                          │
//! │                                                                         │
//! │  scope        key               value (JSON)                           │
//! │  ───────────  ────────────────  ──────────────────────────────         │
//! │  <business>   products          [ Product, ... ]                       │
//! │  <business>   transactions      [ Transaction, ... ]                   │
//! │  <business>   suppliers         [ Supplier, ... ]                      │
//! │  terminal     pending_actions   [ PendingAction, ... ]                 │
//! │  terminal     session           Session                                │
//! │  terminal     setup_complete    true                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two implementations: [`Database`] (SQLite) and [`MemoryCache`] (tests and
//! ephemeral terminals).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tally_core::Table;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Scope used for entries that belong to the terminal, not a business.
const TERMINAL_SCOPE: &str = "terminal";

// =============================================================================
// Cache Keys
// =============================================================================

/// Addresses one cached document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Snapshot of one table for one business.
    Table { business_id: String, table: Table },
    /// The offline write queue.
    PendingQueue,
    /// The signed-in session marker.
    Session,
    /// Set once onboarding has finished.
    SetupComplete,
}

impl CacheKey {
    pub fn table(business_id: &str, table: Table) -> Self {
        CacheKey::Table {
            business_id: business_id.to_string(),
            table,
        }
    }

    /// `(scope, key)` row address.
    pub fn parts(&self) -> (&str, &str) {
        match self {
            CacheKey::Table { business_id, table } => (business_id.as_str(), table.as_str()),
            CacheKey::PendingQueue => (TERMINAL_SCOPE, "pending_actions"),
            CacheKey::Session => (TERMINAL_SCOPE, "session"),
            CacheKey::SetupComplete => (TERMINAL_SCOPE, "setup_complete"),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (scope, key) = self.parts();
        write!(f, "{}/{}", scope, key)
    }
}

// =============================================================================
// LocalCache Trait
// =============================================================================

/// Durable get/put by key.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> DbResult<Option<Value>>;

    async fn put(&self, key: &CacheKey, value: Value) -> DbResult<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &CacheKey) -> DbResult<()>;
}

/// Reads and decodes a typed document.
pub async fn load_json<T: DeserializeOwned>(
    cache: &dyn LocalCache,
    key: &CacheKey,
) -> DbResult<Option<T>> {
    match cache.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DbError::serialization(key.to_string(), e)),
        None => Ok(None),
    }
}

/// Encodes and writes a typed document.
pub async fn store_json<T: Serialize + ?Sized>(
    cache: &dyn LocalCache,
    key: &CacheKey,
    value: &T,
) -> DbResult<()> {
    let value =
        serde_json::to_value(value).map_err(|e| DbError::serialization(key.to_string(), e))?;
    cache.put(key, value).await
}

// =============================================================================
// SQLite Implementation
// =============================================================================

#[async_trait]
impl LocalCache for Database {
    async fn get(&self, key: &CacheKey) -> DbResult<Option<Value>> {
        let (scope, name) = key.parts();

        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE scope = ? AND key = ?")
                .bind(scope)
                .bind(name)
                .fetch_optional(self.pool())
                .await?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| DbError::serialization(key.to_string(), e))
        })
        .transpose()
    }

    async fn put(&self, key: &CacheKey, value: Value) -> DbResult<()> {
        let (scope, name) = key.parts();
        let text = value.to_string();

        sqlx::query(
            r#"
            INSERT INTO cache_entries (scope, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope)
        .bind(name)
        .bind(&text)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;

        debug!(key = %key, bytes = text.len(), "Cache entry written");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> DbResult<()> {
        let (scope, name) = key.parts();

        sqlx::query("DELETE FROM cache_entries WHERE scope = ? AND key = ?")
            .bind(scope)
            .bind(name)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Process-local cache. Contents are lost on drop.
///
/// Writes can be switched off to exercise persistence failures.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Value>>,
    read_only: AtomicBool,
    frozen: RwLock<HashSet<CacheKey>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every `put` and `remove` fails with [`DbError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Makes writes to `key` alone fail with [`DbError::ReadOnly`].
    pub async fn freeze(&self, key: CacheKey) {
        self.frozen.write().await.insert(key);
    }

    pub async fn thaw(&self, key: &CacheKey) {
        self.frozen.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn check_writable(&self, key: &CacheKey) -> DbResult<()> {
        if self.read_only.load(Ordering::SeqCst) || self.frozen.read().await.contains(key) {
            return Err(DbError::ReadOnly);
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> DbResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, value: Value) -> DbResult<()> {
        self.check_writable(key).await?;
        self.entries.write().await.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> DbResult<()> {
        self.check_writable(key).await?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use serde_json::json;

    async fn exercise(cache: &dyn LocalCache) {
        let key = CacheKey::table("biz-1", Table::Products);
        assert_eq!(cache.get(&key).await.unwrap(), None);

        cache.put(&key, json!([{ "id": "p1" }])).await.unwrap();
        cache.put(&key, json!([{ "id": "p2" }])).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(json!([{ "id": "p2" }])));

        let other_business = CacheKey::table("biz-2", Table::Products);
        assert_eq!(cache.get(&other_business).await.unwrap(), None);

        cache.remove(&key).await.unwrap();
        cache.remove(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_cache_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        exercise(&db).await;
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        exercise(&MemoryCache::new()).await;
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let cache = MemoryCache::new();
        store_json(&cache, &CacheKey::SetupComplete, &true).await.unwrap();

        let flag: Option<bool> = load_json(&cache, &CacheKey::SetupComplete).await.unwrap();
        assert_eq!(flag, Some(true));

        let wrong: DbResult<Option<Vec<String>>> =
            load_json(&cache, &CacheKey::SetupComplete).await;
        assert!(matches!(wrong, Err(DbError::Serialization { .. })));
    }

    #[tokio::test]
    async fn test_read_only_memory_cache() {
        let cache = MemoryCache::new();
        cache.set_read_only(true);
        let err = cache.put(&CacheKey::Session, json!({})).await.unwrap_err();
        assert!(matches!(err, DbError::ReadOnly));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_frozen_key_refuses_only_that_key() {
        let cache = MemoryCache::new();
        let products = CacheKey::table("biz-1", Table::Products);
        cache.freeze(products.clone()).await;

        assert!(matches!(cache.put(&products, json!([])).await, Err(DbError::ReadOnly)));
        cache.put(&CacheKey::Session, json!({})).await.unwrap();
        assert_eq!(cache.len().await, 1);

        cache.thaw(&products).await;
        cache.put(&products, json!([])).await.unwrap();
    }

    #[test]
    fn test_key_parts() {
        assert_eq!(CacheKey::PendingQueue.parts(), ("terminal", "pending_actions"));
        assert_eq!(
            CacheKey::table("biz-9", Table::Suppliers).to_string(),
            "biz-9/suppliers"
        );
    }
}
