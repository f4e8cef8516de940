//! Shopping cart operations. Stock is checked against the live catalog on
//! every mutation but never reserved; placement re-checks it.

use std::collections::HashMap;

use crate::domain::{Cart, CartSummary, Product, ProductId, UserId};
use crate::error::{EcommerceError, Result};
use crate::store::SharedStore;

/// A cart with the catalog entries its lines point at.
#[derive(Debug, Clone)]
pub struct DetailedCart {
    pub cart: Cart,
    pub products: HashMap<ProductId, Product>,
}

pub struct CartService {
    store: SharedStore,
}

impl CartService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Loads the user's cart, creating an empty one on first access.
    pub async fn get_or_create(&self, user: UserId) -> Result<Cart> {
        if let Some(cart) = self.store.find_cart(user).await? {
            return Ok(cart);
        }
        let cart = Cart::for_user(user);
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn detailed(&self, user: UserId) -> Result<DetailedCart> {
        let cart = self.get_or_create(user).await?;
        self.with_products(cart).await
    }

    pub async fn add(&self, user: UserId, product_id: ProductId, quantity: u32) -> Result<DetailedCart> {
        let product = self.available_product(product_id).await?;
        let mut cart = self.get_or_create(user).await?;

        let wanted = cart.quantity_of(product_id).saturating_add(quantity);
        if wanted > product.stock {
            tracing::warn!(%product_id, wanted, stock = product.stock, "cart add exceeds stock");
            return Err(EcommerceError::StockExceeded { available: product.stock });
        }

        cart.add_item(product_id, quantity, product.price);
        self.store.save_cart(&cart).await?;
        self.with_products(cart).await
    }

    /// Sets a line's quantity; zero removes the line.
    pub async fn update(&self, user: UserId, product_id: ProductId, quantity: u32) -> Result<DetailedCart> {
        let mut cart = self.existing(user).await?;
        if quantity > 0 {
            let product = self.available_product(product_id).await?;
            if quantity > product.stock {
                return Err(EcommerceError::StockExceeded { available: product.stock });
            }
        }
        cart.update_quantity(product_id, quantity)?;
        self.store.save_cart(&cart).await?;
        self.with_products(cart).await
    }

    pub async fn remove(&self, user: UserId, product_id: ProductId) -> Result<DetailedCart> {
        let mut cart = self.existing(user).await?;
        cart.remove_item(product_id)?;
        self.store.save_cart(&cart).await?;
        self.with_products(cart).await
    }

    pub async fn clear(&self, user: UserId) -> Result<Cart> {
        let mut cart = self.existing(user).await?;
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Zeros when the user has no cart yet.
    pub async fn summary(&self, user: UserId) -> Result<CartSummary> {
        Ok(self.store.find_cart(user).await?.map(|c| c.summary()).unwrap_or_default())
    }

    async fn existing(&self, user: UserId) -> Result<Cart> {
        self.store.find_cart(user).await?.ok_or(EcommerceError::NotFound("Cart"))
    }

    async fn available_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .find_product(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(EcommerceError::NotFound("Product"))
    }

    async fn with_products(&self, cart: Cart) -> Result<DetailedCart> {
        let ids: Vec<ProductId> = cart.items().iter().map(|i| i.product_id).collect();
        let products = self.store.find_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        Ok(DetailedCart { cart, products })
    }
}
