//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input / record validation failures             │
//! │                                                                         │
//! │  tally-db errors                                                       │
//! │  └── DbError          - Local cache failures                           │
//! │                                                                         │
//! │  tally-sync errors                                                     │
//! │  └── SyncError        - Remote, timeout, queue and config failures     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → presentation layer    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::checkout::CheckoutPhase;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found in the known collection.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested quantity exceeds the known stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Commit sale (qty: 5)
    ///      │
    ///      ▼
    /// Re-check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "COKE", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Checkout lands in ERROR (STOCK_SYNC_ERROR)
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The cart has no lines; checkout cannot advance.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cash tendered does not cover the amount due.
    #[error("Insufficient cash tendered: due {due_cents}, tendered {tendered_cents}")]
    InsufficientTender { due_cents: i64, tendered_cents: i64 },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Product is not in the cart.
    #[error("Product {0} not in cart")]
    NotInCart(String),

    /// The checkout machine was asked to take an edge not in its table.
    #[error("Illegal checkout transition from {from} to {to}")]
    IllegalTransition { from: CheckoutPhase, to: CheckoutPhase },

    /// Cart lines can only change while a payment method is being chosen.
    #[error("Cart cannot be edited during {phase}")]
    CartLocked { phase: CheckoutPhase },

    /// A record was asked for a status change it does not allow.
    #[error("Transaction {id} is {current}, cannot become {requested}")]
    InvalidStatusTransition {
        id: String,
        current: String,
        requested: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for errors the cashier resolves by correcting input.
    ///
    /// These are never enqueued and never reach the remote store.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            CoreError::EmptyCart
                | CoreError::InsufficientTender { .. }
                | CoreError::QuantityTooLarge { .. }
                | CoreError::CartTooLarge { .. }
                | CoreError::CartLocked { .. }
                | CoreError::Validation(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised both for cashier input and for records arriving from the remote
/// store that cannot be normalized into a valid entity.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed record).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "COKE-330".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for COKE-330: available 3, requested 5"
        );

        let err = CoreError::IllegalTransition {
            from: CheckoutPhase::Processing,
            to: CheckoutPhase::MethodSelect,
        };
        assert_eq!(
            err.to_string(),
            "Illegal checkout transition from PROCESSING to METHOD_SELECT"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert!(core_err.is_user_correctable());
    }

    #[test]
    fn test_stock_errors_are_not_user_correctable() {
        let err = CoreError::InsufficientStock {
            sku: "A".into(),
            available: 0,
            requested: 1,
        };
        assert!(!err.is_user_correctable());
        assert!(CoreError::EmptyCart.is_user_correctable());
    }
}
