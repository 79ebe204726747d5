//! # Pricing
//!
//! Sale totals computed from cart lines, a discount and a tax rate.
//!
//! ## Computation Order
//! ```text
//! subtotal = Σ (unit price × qty)
//! discount = round(subtotal × discount_bps / 10000)
//! taxable  = subtotal − discount
//! tax      = round(taxable × tax_bps / 10000)
//! total    = taxable + tax
//! change   = max(0, tendered − total)
//! ```
//!
//! Each rounding step uses [`apply_bps`](crate::money::apply_bps), so a
//! terminal and the remote ledger always agree to the cent.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{DiscountRate, TaxRate};

/// Rates applied to a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingInput {
    pub tax_rate: TaxRate,
    pub discount: DiscountRate,
}

/// Computed totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub taxable: Money,
    pub tax: Money,
    pub total: Money,
}

/// Prices a set of `(unit price, quantity)` lines.
///
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::pricing::{price, PricingInput};
/// use tally_core::types::{DiscountRate, TaxRate};
///
/// let totals = price(
///     &[(Money::from_cents(50_000), 1)],
///     PricingInput {
///         tax_rate: TaxRate::from_bps(1200),
///         discount: DiscountRate::from_bps(1000),
///     },
/// );
/// assert_eq!(totals.discount.cents(), 5_000);
/// assert_eq!(totals.taxable.cents(), 45_000);
/// assert_eq!(totals.tax.cents(), 5_400);
/// assert_eq!(totals.total.cents(), 50_400);
/// ```
pub fn price(lines: &[(Money, i64)], input: PricingInput) -> Totals {
    let subtotal: Money = lines
        .iter()
        .map(|(unit, qty)| unit.multiply_quantity(*qty))
        .sum();
    let discount = subtotal.discount_amount(input.discount);
    let taxable = subtotal - discount;
    let tax = taxable.calculate_tax(input.tax_rate);

    Totals {
        subtotal,
        discount,
        taxable,
        tax,
        total: taxable + tax,
    }
}

/// Change owed to the customer; never negative.
pub fn change_due(tendered: Money, total: Money) -> Money {
    tendered.saturating_difference(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tax_bps: u32, discount_bps: u32) -> PricingInput {
        PricingInput {
            tax_rate: TaxRate::from_bps(tax_bps),
            discount: DiscountRate::from_bps(discount_bps),
        }
    }

    #[test]
    fn test_two_units_with_tax_and_cash_change() {
        let totals = price(&[(Money::from_cents(10_000), 2)], input(1200, 0));
        assert_eq!(totals.subtotal.cents(), 20_000);
        assert_eq!(totals.discount.cents(), 0);
        assert_eq!(totals.tax.cents(), 2_400);
        assert_eq!(totals.total.cents(), 22_400);

        let change = change_due(Money::from_cents(30_000), totals.total);
        assert_eq!(change.cents(), 7_600);
    }

    #[test]
    fn test_discount_before_tax() {
        let totals = price(&[(Money::from_cents(50_000), 1)], input(1200, 1000));
        assert_eq!(totals.discount.cents(), 5_000);
        assert_eq!(totals.taxable.cents(), 45_000);
        assert_eq!(totals.tax.cents(), 5_400);
        assert_eq!(totals.total.cents(), 50_400);
    }

    #[test]
    fn test_full_discount_zeroes_total() {
        let totals = price(&[(Money::from_cents(999), 3)], input(1200, 10_000));
        assert_eq!(totals.taxable, Money::zero());
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 10.00 at 8.25% = 0.825 → 0.83
        let totals = price(&[(Money::from_cents(1_000), 1)], input(825, 0));
        assert_eq!(totals.tax.cents(), 83);
        assert_eq!(totals.total.cents(), 1_083);
    }

    #[test]
    fn test_empty_lines() {
        assert_eq!(price(&[], input(1200, 0)), Totals::default());
    }

    #[test]
    fn test_short_tender_gives_no_change() {
        assert_eq!(
            change_due(Money::from_cents(100), Money::from_cents(500)),
            Money::zero()
        );
    }
}
