//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  Two terminals computing the same sale in floats can disagree by a     │
//! │  cent. The remote ledger then holds two different totals for what      │
//! │  should be one price.                                                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + One Rounding Rule                       │
//! │    Every percentage is applied as  amount × bps / 10000                │
//! │    and rounded half away from zero, on every node.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(10_000); // 100.00
//! let line = price * 2i64;               // 200.00
//! assert_eq!(line.cents(), 20_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{DiscountRate, TaxRate};

/// Basis points in 100%.
pub const BPS_SCALE: i128 = 10_000;

/// Applies a basis-point rate to an amount in cents, rounding half away
/// from zero.
///
/// This is the single rounding rule of the system. The remote ledger rounds
/// the same way, so locally computed cents never drift from stored ones.
///
/// ```rust
/// use tally_core::money::apply_bps;
///
/// assert_eq!(apply_bps(1000, 825), 83);   // 82.5 → 83
/// assert_eq!(apply_bps(-1000, 825), -83); // -82.5 → -83
/// assert_eq!(apply_bps(20_000, 1200), 2400);
/// ```
pub fn apply_bps(amount_cents: i64, bps: u32) -> i64 {
    let product = amount_cents as i128 * bps as i128;
    let quotient = product / BPS_SCALE;
    let remainder = product % BPS_SCALE;

    let rounded = if remainder.abs() * 2 >= BPS_SCALE {
        quotient + product.signum()
    } else {
        quotient
    };

    rounded as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// Product.price_cents ──► CartItem.unit_price ──► line amount
///                                                     │
/// Totals.subtotal ──► discount ──► taxable ──► tax ──► total ──► change
///                                                     │
///                                     Transaction.amount_cents (frozen)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax on this amount.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let taxable = Money::from_cents(45_000);
    /// assert_eq!(taxable.calculate_tax(TaxRate::from_bps(1200)).cents(), 5_400);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money(apply_bps(self.0, rate.bps()))
    }

    /// Calculates the discount amount on this subtotal.
    ///
    /// The rate is already clamped to 0..=100% by [`DiscountRate`].
    pub fn discount_amount(&self, discount: DiscountRate) -> Money {
        Money(apply_bps(self.0, discount.bps()))
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `self - other`, floored at zero.
    ///
    /// Used for change due: a short tender never produces negative change.
    #[inline]
    pub fn saturating_difference(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering; the presentation layer handles localization.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
