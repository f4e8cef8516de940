//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::{CartId, Money, ProductId, UserId};

/// One cart per user. Holds at most one line per product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    items: Vec<CartItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured when the product was (last) added.
    pub price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    /// Sum of quantities across lines.
    pub total_items: u32,
    pub total_amount: Money,
    /// Number of distinct lines.
    pub item_count: u32,
}

impl Cart {
    pub fn for_user(user_id: UserId) -> Self {
        let now = Utc::now();
        Self { id: CartId::generate(), user_id, items: vec![], created_at: now, updated_at: now }
    }

    /// Rebuilds a cart from persisted parts.
    pub fn restore(id: CartId, user_id: UserId, items: Vec<CartItem>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, user_id, items, created_at, updated_at }
    }

    pub fn id(&self) -> CartId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Quantity already in the cart for `product_id` (0 when absent).
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.item(product_id).map_or(0, |i| i.quantity)
    }

    /// Adds `quantity` of a product. An existing line grows instead of being
    /// duplicated, and its unit price is refreshed to `price`.
    pub fn add_item(&mut self, product_id: ProductId, quantity: u32, price: Money) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity = existing.quantity.saturating_add(quantity);
            existing.price = price;
        } else {
            self.items.push(CartItem { product_id, quantity, price });
        }
        self.touch();
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: ProductId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    /// Empties the item list; the cart itself survives.
    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    pub fn total_amount(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }

    pub fn summary(&self) -> CartSummary {
        CartSummary {
            total_items: self.items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity)),
            total_amount: self.total_amount(),
            item_count: u32::try_from(self.items.len()).unwrap_or(u32::MAX),
        }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found in cart")]
    ItemNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::for_user(UserId::generate());
        let p1 = ProductId::generate();
        cart.add_item(p1, 2, Money::whole(10));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_amount(), Money::whole(20));
        cart.add_item(p1, 1, Money::whole(10));
        assert_eq!(cart.items()[0].quantity, 3); // Merged
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn test_merge_refreshes_unit_price() {
        let mut cart = Cart::for_user(UserId::generate());
        let p1 = ProductId::generate();
        cart.add_item(p1, 1, Money::whole(10));
        cart.add_item(p1, 1, Money::whole(12));
        assert_eq!(cart.item(p1).map(|i| i.price), Some(Money::whole(12)));
        assert_eq!(cart.total_amount(), Money::whole(24));
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let mut cart = Cart::for_user(UserId::generate());
        let (p1, p2) = (ProductId::generate(), ProductId::generate());
        cart.add_item(p1, 1, Money::whole(5));
        cart.add_item(p2, 4, Money::whole(1));
        cart.update_quantity(p1, 0).unwrap();
        assert!(cart.item(p1).is_none());
        cart.update_quantity(p2, 2).unwrap();
        assert_eq!(cart.quantity_of(p2), 2);
        assert_eq!(cart.update_quantity(p1, 3), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_summary_and_clear() {
        let mut cart = Cart::for_user(UserId::generate());
        cart.add_item(ProductId::generate(), 2, Money::cents(1250));
        cart.add_item(ProductId::generate(), 3, Money::whole(1));
        let summary = cart.summary();
        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.total_amount, Money::whole(28));

        let id = cart.id();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.id(), id);
        assert_eq!(cart.summary(), CartSummary::default());
    }

    #[test]
    fn test_summary_saturates_item_count() {
        let mut cart = Cart::for_user(UserId::generate());
        cart.add_item(ProductId::generate(), u32::MAX, Money::ZERO);
        cart.add_item(ProductId::generate(), 2, Money::ZERO);
        assert_eq!(cart.summary().total_items, u32::MAX);
    }

    #[test]
    fn test_remove_missing_item() {
        let mut cart = Cart::for_user(UserId::generate());
        assert_eq!(cart.remove_item(ProductId::generate()), Err(CartError::ItemNotFound));
    }
}
