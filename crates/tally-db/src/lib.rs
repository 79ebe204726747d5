//! # tally-db: Persistent Local Cache for Tally
//!
//! Durable storage for everything the terminal must remember across
//! restarts while offline.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  tally-sync (write path, queue, load, session)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  LocalCache   │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│  (cache.rs)   │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │  MemoryCache  │    │ 001_local_   │  │   │
//! │  │   │               │    │               │    │  cache.sql   │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL mode)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use tally_db::{CacheKey, Database, DbConfig, LocalCache};
//!
//! let db = Database::new(DbConfig::new("./cache.db")).await?;
//! db.put(&CacheKey::SetupComplete, serde_json::json!(true)).await?;
//! ```

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;

pub use cache::{load_json, store_json, CacheKey, LocalCache, MemoryCache};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
