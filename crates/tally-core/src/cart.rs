//! # Cart
//!
//! The lines of the sale currently being rung up.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Scan / tap product ─────► add_item() ─────────► merge or push line    │
//! │  Change quantity ────────► update_quantity() ──► 0 removes the line    │
//! │  Remove line ────────────► remove_item()                               │
//! │  Discard / sale done ────► clear()                                     │
//! │                                                                         │
//! │  Stock is checked against the *known* stock when a line is added.      │
//! │  The authoritative check happens again at commit time.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Product;
use crate::validation::validate_quantity;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// A line in the cart.
///
/// Name, SKU and unit price are frozen when the line is created so the
/// receipt matches what the cashier saw, even if the product is edited
/// mid-sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartItem {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            added_at: Utc::now(),
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id`
/// - Every quantity is in `1..=MAX_ITEM_QUANTITY`
/// - At most `MAX_CART_ITEMS` lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    items: Vec<CartItem>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product, or raises the quantity of its existing line.
    ///
    /// Fails if the resulting quantity exceeds the product's known stock.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        let existing = self
            .items
            .iter()
            .position(|i| i.product_id == product.id);
        let new_qty = existing
            .map(|idx| self.items[idx].quantity)
            .unwrap_or(0)
            + quantity;

        if new_qty > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: new_qty,
                max: MAX_ITEM_QUANTITY,
            });
        }

        if !product.can_sell(new_qty) {
            return Err(CoreError::InsufficientStock {
                sku: product.sku.clone(),
                available: product.stock,
                requested: new_qty,
            });
        }

        match existing {
            Some(idx) => self.items[idx].quantity = new_qty,
            None => {
                if self.items.len() >= MAX_CART_ITEMS {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_ITEMS,
                    });
                }
                self.items.push(CartItem::from_product(product, quantity));
            }
        }

        Ok(())
    }

    /// Sets the quantity of a line. Zero removes it.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        validate_quantity(quantity)?;

        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::NotInCart(product_id.to_string()))?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.product_id != product_id);

        if self.items.len() == initial_len {
            Err(CoreError::NotInCart(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// `(unit price, quantity)` pairs for [`crate::pricing::price`].
    pub fn lines(&self) -> Vec<(Money, i64)> {
        self.items
            .iter()
            .map(|i| (i.unit_price(), i.quantity))
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product(id: &str, price_cents: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            business_id: "biz-1".to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            category: String::new(),
            price_cents,
            stock,
            supplier_id: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_cart_add_item() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 999, 10), 2).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.lines(), vec![(Money::from_cents(999), 2)]);
    }

    #[test]
    fn test_cart_add_same_product_increases_quantity() {
        let mut cart = Cart::new();
        let product = test_product("1", 999, 10);

        cart.add_item(&product, 2).unwrap();
        cart.add_item(&product, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_cart_rejects_more_than_known_stock() {
        let mut cart = Cart::new();
        let product = test_product("1", 100, 3);

        cart.add_item(&product, 2).unwrap();
        let err = cart.add_item(&product, 2).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 3, requested: 4, .. }
        ));
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn test_cart_price_is_frozen() {
        let mut cart = Cart::new();
        let mut product = test_product("1", 500, 10);
        cart.add_item(&product, 1).unwrap();

        product.price_cents = 900;
        cart.add_item(&product, 1).unwrap();

        assert_eq!(cart.items()[0].unit_price_cents, 500);
        assert_eq!(cart.items()[0].line_total().cents(), 1_000);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 100, 10), 2).unwrap();

        cart.update_quantity("1", 0).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(
            cart.update_quantity("1", 2),
            Err(CoreError::NotInCart(_))
        ));
    }

    #[test]
    fn test_invalid_quantities() {
        let mut cart = Cart::new();
        let product = test_product("1", 100, 5_000);
        assert!(cart.add_item(&product, 0).is_err());
        assert!(cart.add_item(&product, -1).is_err());
        assert!(matches!(
            cart.add_item(&product, 1_000),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_cart_clear() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1", 999, 10), 2).unwrap();
        assert!(!cart.is_empty());

        cart.clear();
        assert!(cart.is_empty());
    }
}
