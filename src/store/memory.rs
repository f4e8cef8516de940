//! In-process store. Every collection sits behind one `RwLock` so the
//! multi-entity writes are trivially all-or-nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    relevance, CartStore, CatalogStore, OrderFilter, OrderStore, ProductQuery, Store, StoreError, StoreResult,
    UserFilter, UserStore,
};
use crate::domain::{
    Cart, Money, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId, Role, Sku, User, UserId,
};
use crate::pagination::PageRequest;

#[derive(Default)]
struct Collections {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    users: HashMap<UserId, User>,
    tokens: HashMap<String, UserId>,
}

impl Collections {
    fn apply_stock_delta(&mut self, id: ProductId, delta: i64) -> StoreResult<u32> {
        let product = self.products.get_mut(&id).ok_or(StoreError::NotFound)?;
        let next = i64::from(product.stock) + delta;
        if next < 0 {
            return Err(StoreError::InsufficientStock { product_id: id });
        }
        product.stock = u32::try_from(next).map_err(|_| StoreError::DataCorruption(format!("stock overflow for {id}")))?;
        Ok(product.stock)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Vec<T> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    items.iter().skip(offset).take(page.limit as usize).cloned().collect()
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)> {
        let inner = self.inner.read().await;
        let terms = query.search_terms();

        let mut matched: Vec<(u32, &Product)> = inner
            .products
            .values()
            .filter(|p| query.matches(p))
            .map(|p| (relevance(p, &terms), p))
            .filter(|(score, _)| terms.is_empty() || *score > 0)
            .collect();

        matched.sort_by(|(score_a, a), (score_b, b)| {
            if terms.is_empty() {
                query.sort.compare(a, b)
            } else {
                score_b.cmp(score_a).then_with(|| query.sort.compare(a, b))
            }
        });

        let products: Vec<Product> = matched.into_iter().map(|(_, p)| p.clone()).collect();
        let total = products.len() as u64;
        Ok((page_of(&products, query.page), total))
    }

    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn find_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.products.get(id).cloned()).collect())
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>> {
        Ok(self.inner.read().await.products.values().find(|p| &p.sku == sku).cloned())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.products.values().any(|p| p.sku == product.sku && p.id != product.id) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        let stored = inner.products.get_mut(&product.id).ok_or(StoreError::NotFound)?;
        let stock = stored.stock;
        *stored = product.clone();
        stored.stock = stock;
        Ok(())
    }

    async fn set_stock(&self, id: ProductId, stock: u32) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let product = inner.products.get_mut(&id).ok_or(StoreError::NotFound)?;
        product.stock = stock;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<u32> {
        self.inner.write().await.apply_stock_delta(id, delta)
    }

    async fn categories(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut categories: Vec<String> =
            inner.products.values().filter(|p| p.is_active).map(|p| p.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn count_active_products(&self) -> StoreResult<u64> {
        Ok(self.inner.read().await.products.values().filter(|p| p.is_active).count() as u64)
    }

    async fn low_stock_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut low: Vec<Product> =
            inner.products.values().filter(|p| p.is_active && p.is_low_on_stock()).cloned().collect();
        low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        low.truncate(limit as usize);
        Ok(low)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_cart(&self, user: UserId) -> StoreResult<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(&user).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.inner.write().await.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, order: &Order) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict(format!("order number {} already exists", order.order_number)));
        }

        // Check every line before touching anything.
        let mut requested: HashMap<ProductId, u32> = HashMap::new();
        for item in &order.items {
            *requested.entry(item.product).or_default() += item.quantity;
        }
        for (product_id, quantity) in &requested {
            let product = inner.products.get(product_id).ok_or(StoreError::NotFound)?;
            if product.stock < *quantity {
                return Err(StoreError::InsufficientStock { product_id: *product_id });
            }
        }

        for (product_id, quantity) in requested {
            inner.apply_stock_delta(product_id, -i64::from(quantity))?;
        }
        if let Some(cart) = inner.carts.get_mut(&order.user) {
            cart.clear();
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<(Vec<Order>, u64)> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let total = orders.len() as u64;
        Ok((page_of(&orders, page), total))
    }

    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&id).ok_or(StoreError::NotFound)?;
        order
            .cancel(at)
            .map_err(|err| StoreError::InvalidState(err.to_string()))?;
        let cancelled = order.clone();

        for item in &cancelled.items {
            // Products are never hard-deleted; a missing one has nothing to restock.
            if inner.products.contains_key(&item.product) {
                inner.apply_stock_delta(item.product, i64::from(item.quantity))?;
            }
        }
        Ok(cancelled)
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Err(StoreError::InvalidState(format!("order is {}", stored.status)));
        }
        stored.status = order.status;
        stored.tracking_number = order.tracking_number.clone();
        stored.delivered_at = order.delivered_at;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn count_orders(&self) -> StoreResult<u64> {
        Ok(self.inner.read().await.orders.len() as u64)
    }

    async fn completed_revenue(&self) -> StoreResult<Money> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| o.payment_info.status == PaymentStatus::Completed)
            .map(|o| o.pricing.total_price)
            .sum())
    }

    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| o.created_at >= since).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email || u.username == user.username) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.email)));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_token(&self, token: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.tokens.get(token).and_then(|id| inner.users.get(id)).cloned())
    }

    async fn issue_token(&self, user: UserId, token: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user) {
            return Err(StoreError::NotFound);
        }
        inner.tokens.insert(token.to_string(), user);
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<(Vec<User>, u64)> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner.users.values().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let total = users.len() as u64;
        Ok((page_of(&users, page), total))
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn count_users(&self, role: Role) -> StoreResult<u64> {
        Ok(self.inner.read().await.users.values().filter(|u| u.role == role).count() as u64)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        OrderItem, OrderNumber, PaymentInfo, PaymentMethod, Pricing, PricingPolicy, ShippingAddress,
    };
    use crate::store::ProductSort;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn product(sku: &str, price: i64, stock: u32) -> Product {
        Product::create(Sku::new(sku).unwrap(), sku, "", "Electronics", Money::whole(price), stock)
    }

    fn order_for(user: UserId, lines: &[(&Product, u32)], seed: u64) -> Order {
        let now = Utc::now();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|(p, qty)| OrderItem { product: p.id, name: p.name.clone(), image: String::new(), price: p.price, quantity: *qty })
            .collect();
        let items_price = items.iter().map(OrderItem::line_total).sum();
        Order::place(
            OrderNumber::generate(now, &mut StdRng::seed_from_u64(seed)), user, items, ShippingAddress::default(),
            PaymentInfo::at_checkout(PaymentMethod::CreditCard, None, now),
            Pricing::compute(items_price, &PricingPolicy::default()), None, now,
        )
    }

    #[tokio::test]
    async fn adjust_stock_never_goes_negative() {
        let store = MemoryStore::new();
        let p = product("A-1", 10, 3);
        store.insert_product(&p).await.unwrap();

        assert_eq!(store.adjust_stock(p.id, -2).await.unwrap(), 1);
        assert!(matches!(store.adjust_stock(p.id, -2).await, Err(StoreError::InsufficientStock { .. })));
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 1);
        assert!(matches!(store.adjust_stock(ProductId::generate(), 1).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts() {
        let store = MemoryStore::new();
        store.insert_product(&product("A-1", 10, 3)).await.unwrap();
        assert!(matches!(store.insert_product(&product("a-1", 12, 1)).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_product_keeps_stock() {
        let store = MemoryStore::new();
        let mut p = product("A-1", 10, 3);
        store.insert_product(&p).await.unwrap();
        p.stock = 99;
        p.name = "Renamed".into();
        store.update_product(&p).await.unwrap();
        let stored = store.find_product(p.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.stock, 3);
    }

    #[tokio::test]
    async fn place_order_is_all_or_nothing() {
        let store = MemoryStore::new();
        let plenty = product("A-1", 10, 5);
        let scarce = product("B-1", 10, 1);
        store.insert_product(&plenty).await.unwrap();
        store.insert_product(&scarce).await.unwrap();
        let user = UserId::generate();
        let mut cart = Cart::for_user(user);
        cart.add_item(plenty.id, 2, plenty.price);
        store.save_cart(&cart).await.unwrap();

        let failing = order_for(user, &[(&plenty, 2), (&scarce, 2)], 1);
        assert!(matches!(store.place_order(&failing).await, Err(StoreError::InsufficientStock { .. })));
        assert_eq!(store.find_product(plenty.id).await.unwrap().unwrap().stock, 5);
        assert!(store.find_order(failing.id).await.unwrap().is_none());
        assert!(!store.find_cart(user).await.unwrap().unwrap().is_empty());

        let ok = order_for(user, &[(&plenty, 2), (&scarce, 1)], 2);
        store.place_order(&ok).await.unwrap();
        assert_eq!(store.find_product(plenty.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(store.find_product(scarce.id).await.unwrap().unwrap().stock, 0);
        assert!(store.find_cart(user).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_order_number_conflicts() {
        let store = MemoryStore::new();
        let p = product("A-1", 10, 5);
        store.insert_product(&p).await.unwrap();
        let user = UserId::generate();
        let first = order_for(user, &[(&p, 1)], 7);
        let mut second = order_for(user, &[(&p, 1)], 8);
        second.order_number = first.order_number.clone();

        store.place_order(&first).await.unwrap();
        assert!(matches!(store.place_order(&second).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn cancel_restocks_once() {
        let store = MemoryStore::new();
        let p = product("A-1", 10, 5);
        store.insert_product(&p).await.unwrap();
        let order = order_for(UserId::generate(), &[(&p, 2)], 3);
        store.place_order(&order).await.unwrap();

        let cancelled = store.cancel_order(order.id, Utc::now()).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 5);

        assert!(matches!(store.cancel_order(order.id, Utc::now()).await, Err(StoreError::InvalidState(_))));
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn status_write_refused_after_concurrent_cancel() {
        let store = MemoryStore::new();
        let p = product("A-1", 10, 5);
        store.insert_product(&p).await.unwrap();
        let order = order_for(UserId::generate(), &[(&p, 2)], 4);
        store.place_order(&order).await.unwrap();

        let mut stale = store.find_order(order.id).await.unwrap().unwrap();
        store.cancel_order(order.id, Utc::now()).await.unwrap();
        stale.status = OrderStatus::Shipped;

        let err = store.update_order_status(&stale, OrderStatus::Pending).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
        assert_eq!(store.find_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn list_products_filters_sorts_and_pages() {
        let store = MemoryStore::new();
        for (sku, price) in [("A", 30), ("B", 10), ("C", 20)] {
            store.insert_product(&product(sku, price, 1)).await.unwrap();
        }
        let mut hidden = product("D", 5, 1);
        hidden.is_active = false;
        store.insert_product(&hidden).await.unwrap();

        let query = ProductQuery { sort: ProductSort::PriceAsc, page: PageRequest::new(1, 2), ..ProductQuery::default() };
        let (page, total) = store.list_products(&query).await.unwrap();
        assert_eq!(total, 3);
        let prices: Vec<Money> = page.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![Money::whole(10), Money::whole(20)]);
    }

    #[tokio::test]
    async fn search_total_counts_only_matches() {
        let store = MemoryStore::new();
        let mut phone = product("PH", 500, 1);
        phone.name = "Smart Phone".into();
        store.insert_product(&phone).await.unwrap();
        store.insert_product(&product("SH", 50, 1)).await.unwrap();

        let query = ProductQuery { search: Some("phone".into()), ..ProductQuery::default() };
        let (page, total) = store.list_products(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].id, phone.id);
    }

    #[tokio::test]
    async fn token_resolves_user() {
        let store = MemoryStore::new();
        let user = User::register("jane", "jane@example.com", "Jane", "Smith", Role::User);
        store.insert_user(&user).await.unwrap();
        store.issue_token(user.id, "secret").await.unwrap();
        assert_eq!(store.find_user_by_token("secret").await.unwrap().map(|u| u.id), Some(user.id));
        assert!(store.find_user_by_token("other").await.unwrap().is_none());
        assert_eq!(store.count_users(Role::User).await.unwrap(), 1);
        assert_eq!(store.count_users(Role::Admin).await.unwrap(), 0);
    }
}
