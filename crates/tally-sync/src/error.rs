//! # Sync Error Types
//!
//! Error types for remote, queue, cache and configuration failures.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Cache                  │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Serialization          │ │
//! │  │  ConfigLoad/Save│  │  Rejected       │  │  Validation / Core      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Network + Timeout → the mutation is queued, the diagnostic is Offline │
//! │  Rejected          → the mutation is queued, the diagnostic is Error   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, Table, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote store could not be reached.
    ///
    /// ## When This Occurs
    /// - Terminal is offline
    /// - DNS / TLS / connection reset
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call did not answer within the request timeout.
    #[error("Remote call timed out after {0} ms")]
    Timeout(u64),

    /// The remote answered but refused the operation.
    ///
    /// ## When This Occurs
    /// - Row-level policy denied the write
    /// - Remote schema rejected the record
    #[error("Remote rejected {table} operation: {reason}")]
    Rejected { table: Table, reason: String },

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Local cache error: {0}")]
    Cache(#[from] tally_db::DbError),

    #[error("No {table} record with id {id}")]
    NotFound { table: Table, id: String },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// An operation needs an active business and none is set.
    #[error("No active business. Sign in first.")]
    NoActiveBusiness,

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the remote may accept the same operation later.
    ///
    /// Every retryable failure of a mutation sends it to the offline queue.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Rejected { .. }
        )
    }

    /// Returns true if the remote store was unreachable (offline, not broken).
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout(10_000).is_retryable());
        assert!(SyncError::Rejected {
            table: Table::Products,
            reason: "policy".into()
        }
        .is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::NoActiveBusiness.is_retryable());
    }

    #[test]
    fn test_network_classification() {
        assert!(SyncError::Timeout(10_000).is_network());
        assert!(!SyncError::Rejected {
            table: Table::Suppliers,
            reason: "x".into()
        }
        .is_network());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Rejected {
            table: Table::Transactions,
            reason: "row level security".into(),
        };
        assert_eq!(
            err.to_string(),
            "Remote rejected transactions operation: row level security"
        );
        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
    }
}
