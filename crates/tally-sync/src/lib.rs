//! # tally-sync: Sync Engine and Checkout for Tally
//!
//! Keeps a terminal usable offline and consistent with the remote store once
//! it reconnects, and runs the checkout on top of that.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     Engine (coordinator)                         │  │
//! │  │                                                                  │  │
//! │  │  Session, active business, load, reconnect, diagnostics          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   WritePath    │  │  OfflineQueue  │  │  RealtimeSubscription  │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Optimistic     │  │ Durable FIFO,  │  │ Remote change feed     │    │
//! │  │ local apply,   │  │ per-table      │  │ merged into the        │    │
//! │  │ remote attempt │  │ ordered replay │  │ collections            │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ CheckoutSession│  │  StockLedger   │  │  Diagnostics           │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Cart → commit  │  │ Decrement per  │  │ Local vs remote counts │    │
//! │  │ → Receipt      │  │ sale line      │  │ Forced resync          │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Every remote call goes through the RemoteStore trait with a timeout.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `Engine` coordinator and session lifecycle
//! - [`config`] - Terminal configuration (TOML + environment)
//! - [`error`] - Sync error types
//! - [`remote`] - `RemoteStore` seam and the in-process implementation
//! - [`context`] - State shared by every component
//! - [`collections`] - In-memory working copy of each table
//! - [`queue`] - Offline write queue and replay
//! - [`writer`] - The write path every mutation takes
//! - [`merge`] - Realtime change merge
//! - [`subscription`] - Realtime subscription lifecycle
//! - [`ledger`] - Stock decrements
//! - [`checkout`] - Checkout session and sale commit
//! - [`diagnostics`] - Drift report and forced resync
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_sync::{Engine, InMemoryRemote, TallyConfig};
//!
//! let config = TallyConfig::load_or_default(None);
//! let engine = Engine::open(config, Arc::new(InMemoryRemote::new())).await?;
//!
//! if engine.restore_session().await?.is_none() {
//!     engine.sign_in("owner@shop.test", "secret").await?;
//! }
//!
//! for diagnostic in engine.diagnostics().await? {
//!     println!("{}: {:?}", diagnostic.table, diagnostic.status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod collections;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod queue;
pub mod remote;
pub mod subscription;
pub mod telemetry;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::{CheckoutSession, Receipt};
pub use config::TallyConfig;
pub use diagnostics::ResyncReport;
pub use engine::{Engine, LoadReport, LoadSource};
pub use error::{SyncError, SyncResult};
pub use queue::ReplayReport;
pub use remote::{AuthOutcome, ChangeFeed, ChannelHandle, InMemoryRemote, RemoteStore};
pub use writer::WriteOutcome;
