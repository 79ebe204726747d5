//! # tally-core: Pure Business Logic for Tally
//!
//! This crate is the domain heart of the terminal. It holds every rule that
//! can be expressed without touching a disk or a socket: money math, record
//! shapes and their normalization, the cart, and the checkout phase machine.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Presentation layer (external collaborator)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Engine API                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │    tally-sync: queue, merge, ledger, checkout, diagnostics      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  types  │ │  money  │ │  cart   │ │ checkout │ │pricing │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records (Product, Transaction, Supplier), queue and change types
//! - [`money`] - Money type with integer arithmetic and the shared rounding rule
//! - [`pricing`] - Subtotal / discount / tax / total / change computation
//! - [`cart`] - Cart with price snapshots
//! - [`checkout`] - Checkout phases and the validated transition table
//! - [`error`] - Domain error types
//! - [`validation`] - Field validation used at the deserialization boundary
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::pricing::{price, PricingInput};
//! use tally_core::types::{DiscountRate, TaxRate};
//!
//! let input = PricingInput {
//!     tax_rate: TaxRate::from_bps(1200),
//!     discount: DiscountRate::from_bps(0),
//! };
//! let totals = price(&[(Money::from_cents(10_000), 2)], input);
//! assert_eq!(totals.total.cents(), 22_400);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod checkout;
pub mod error;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem};
pub use checkout::{CheckoutErrorKind, CheckoutMachine, CheckoutPhase};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{PricingInput, Totals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in the cart.
///
/// Guards against typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;
