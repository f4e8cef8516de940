//! Order placement, lookup, cancellation and admin status changes.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::domain::{
    Order, OrderId, OrderItem, OrderNumber, OrderStatus, PaymentInfo, PaymentMethod, Pricing, PricingPolicy,
    ProductId, ShippingAddress, StatusPolicy, User,
};
use crate::error::{EcommerceError, Result};
use crate::pagination::{PageRequest, Pagination};
use crate::store::{OrderFilter, SharedStore, StoreError};

/// How many fresh order numbers are tried before giving up on collisions.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct AddressInput {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Street address is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "ZIP code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

impl From<AddressInput> for ShippingAddress {
    fn from(input: AddressInput) -> Self {
        Self {
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            street: input.street,
            city: input.city,
            state: input.state,
            zip_code: input.zip_code,
            country: input.country,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentInput {
    #[validate(custom = "known_method")]
    pub method: String,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaceOrder {
    #[validate]
    pub shipping_address: AddressInput,
    #[validate]
    pub payment_info: PaymentInput,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

fn known_method(value: &str) -> std::result::Result<(), ValidationError> {
    value.parse::<PaymentMethod>().map(|_| ()).map_err(|_| {
        let mut error = ValidationError::new("method");
        error.message = Some("Invalid payment method".into());
        error
    })
}

pub struct CheckoutService {
    store: SharedStore,
    pricing: PricingPolicy,
    status_policy: StatusPolicy,
}

impl CheckoutService {
    pub fn new(store: SharedStore, pricing: PricingPolicy, status_policy: StatusPolicy) -> Self {
        Self { store, pricing, status_policy }
    }

    /// Turns the user's cart into a pending order. The order insert, the
    /// stock decrements and the cart reset commit together or not at all.
    pub async fn place_order(&self, user: &User, request: PlaceOrder) -> Result<Order> {
        request.validate()?;
        let method = request
            .payment_info
            .method
            .parse::<PaymentMethod>()
            .map_err(|_| EcommerceError::validation("paymentInfo.method", "Invalid payment method"))?;

        let cart = self.store.find_cart(user.id).await?.filter(|c| !c.is_empty()).ok_or(EcommerceError::EmptyCart)?;

        let ids: Vec<ProductId> = cart.items().iter().map(|i| i.product_id).collect();
        let products: HashMap<ProductId, _> =
            self.store.find_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();

        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = match products.get(&line.product_id) {
                Some(p) if p.is_active => p,
                Some(p) => return Err(EcommerceError::ProductUnavailable { name: p.name.clone() }),
                None => return Err(EcommerceError::ProductUnavailable { name: line.product_id.to_string() }),
            };
            if product.stock < line.quantity {
                tracing::warn!(product_id = %product.id, wanted = line.quantity, stock = product.stock, "checkout exceeds stock");
                return Err(EcommerceError::InsufficientStock { name: product.name.clone(), available: product.stock });
            }
            items.push(OrderItem {
                product: product.id,
                name: product.name.clone(),
                image: product.primary_image_url().to_string(),
                price: line.price,
                quantity: line.quantity,
            });
        }

        let now = Utc::now();
        let pricing = Pricing::compute(cart.total_amount(), &self.pricing);
        let payment = PaymentInfo::at_checkout(method, request.payment_info.transaction_id, now);
        let address = ShippingAddress::from(request.shipping_address);
        let notes = request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let number = OrderNumber::generate(Utc::now(), &mut rand::thread_rng());
            let order = Order::place(
                number, user.id, items.clone(), address.clone(), payment.clone(), pricing, notes.clone(), now,
            );
            match self.store.place_order(&order).await {
                Ok(()) => {
                    tracing::info!(
                        order_id = %order.id,
                        order_number = %order.order_number,
                        user_id = %user.id,
                        total = %order.pricing.total_price,
                        "order placed"
                    );
                    return Ok(order);
                }
                Err(StoreError::Conflict(reason)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    tracing::warn!(attempt, %reason, "order number collision, retrying");
                }
                Err(StoreError::InsufficientStock { product_id }) => {
                    return Err(self.stock_race(product_id).await);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Conflict("could not allocate a unique order number".into()).into())
    }

    pub async fn list_for_user(&self, user: &User, page: PageRequest) -> Result<(Vec<Order>, Pagination)> {
        self.list(&OrderFilter { user: Some(user.id), status: None }, page).await
    }

    pub async fn list(&self, filter: &OrderFilter, page: PageRequest) -> Result<(Vec<Order>, Pagination)> {
        let (orders, total) = self.store.list_orders(filter, page).await?;
        Ok((orders, Pagination::new(page, total)))
    }

    /// Owners and admins only.
    pub async fn get(&self, viewer: &User, id: OrderId) -> Result<Order> {
        let order = self.find(id).await?;
        if order.user != viewer.id && !viewer.is_admin() {
            return Err(EcommerceError::Forbidden("Access denied"));
        }
        Ok(order)
    }

    /// Owner-only cancellation; restores stock for every line.
    pub async fn cancel(&self, requester: &User, id: OrderId) -> Result<Order> {
        let order = self.find(id).await?;
        if order.user != requester.id {
            return Err(EcommerceError::Forbidden("Access denied"));
        }
        if !order.can_cancel() {
            return Err(EcommerceError::OrderNotCancellable);
        }

        let cancelled = match self.store.cancel_order(id, Utc::now()).await {
            Ok(order) => order,
            Err(StoreError::InvalidState(reason)) => {
                tracing::warn!(order_id = %id, %reason, "order changed before cancellation");
                return Err(EcommerceError::OrderNotCancellable);
            }
            Err(StoreError::NotFound) => return Err(EcommerceError::NotFound("Order")),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(order_id = %id, user_id = %requester.id, "order cancelled");
        Ok(cancelled)
    }

    /// Admin status change under the configured [`StatusPolicy`]. The write
    /// only lands if the order still has the status the policy was checked
    /// against.
    pub async fn update_status(&self, id: OrderId, status: OrderStatus, tracking_number: Option<String>) -> Result<Order> {
        let mut order = self.find(id).await?;
        let from = order.status;
        let tracking = tracking_number.map(|t| t.trim().to_string());
        order.update_status(status, tracking, self.status_policy, Utc::now())?;
        match self.store.update_order_status(&order, from).await {
            Ok(()) => {}
            Err(StoreError::InvalidState(reason)) => {
                tracing::warn!(order_id = %id, %reason, "order changed before status update");
                let current = self.find(id).await?.status;
                return Err(EcommerceError::InvalidStatusTransition { from: current, to: status });
            }
            Err(StoreError::NotFound) => return Err(EcommerceError::NotFound("Order")),
            Err(err) => return Err(err.into()),
        }
        tracing::info!(order_id = %id, %from, to = %status, "order status updated");
        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Order> {
        self.store.find_order(id).await?.ok_or(EcommerceError::NotFound("Order"))
    }

    /// Names the product whose conditional decrement lost a race.
    async fn stock_race(&self, product_id: ProductId) -> EcommerceError {
        tracing::warn!(%product_id, "stock changed during checkout");
        match self.store.find_product(product_id).await {
            Ok(Some(product)) => EcommerceError::InsufficientStock { name: product.name, available: product.stock },
            Ok(None) => EcommerceError::ProductUnavailable { name: product_id.to_string() },
            Err(err) => err.into(),
        }
    }
}
