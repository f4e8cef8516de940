//! Admin reporting: dashboard totals, sales analytics and account control.
//!
//! Everything here is derived from the stores. The only writes are the
//! user active toggle; order status changes live in the checkout service.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::domain::{
    Money, Order, OrderId, OrderNumber, OrderStatus, PaymentStatus, Product, ProductId, Role, User, UserId,
};
use crate::error::{EcommerceError, Result};
use crate::pagination::{PageRequest, Pagination};
use crate::store::{OrderFilter, SharedStore, UserFilter};

const RECENT_ORDERS: u32 = 5;
const LOW_STOCK_PRODUCTS: u32 = 10;
const TOP_PRODUCTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_products: u64,
    pub total_orders: u64,
    pub total_revenue: Money,
}

/// Contact details of the customer behind a recent order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub total_price: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// `None` when the account no longer exists.
    pub user: Option<Customer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockProduct {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
    pub low_stock_threshold: u32,
}

impl From<Product> for LowStockProduct {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            stock: product.stock,
            low_stock_threshold: product.low_stock_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent_orders: Vec<RecentOrder>,
    pub low_stock_products: Vec<LowStockProduct>,
}

/// Trailing window for sales analytics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Period {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
}

impl Period {
    /// Unknown or missing values fall back to seven days.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("24h") => Period::Day,
            Some("30d") => Period::Month,
            Some("90d") => Period::Quarter,
            _ => Period::Week,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::Quarter => "90d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Quarter => Duration::days(90),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Money,
    pub orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub total_sold: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesAnalytics {
    pub sales_data: Vec<DailySales>,
    pub top_products: Vec<TopProduct>,
    pub orders_by_status: Vec<StatusCount>,
    pub period: Period,
}

impl SalesAnalytics {
    /// Aggregates the orders of one window. Revenue figures only count
    /// orders whose payment completed; status counts cover every order.
    pub fn from_orders(orders: &[Order], period: Period) -> Self {
        let mut daily: BTreeMap<NaiveDate, (Money, u64)> = BTreeMap::new();
        let mut products: HashMap<ProductId, TopProduct> = HashMap::new();
        let mut statuses: BTreeMap<OrderStatus, u64> = BTreeMap::new();

        for order in orders {
            *statuses.entry(order.status).or_default() += 1;
            if order.payment_info.status != PaymentStatus::Completed {
                continue;
            }

            let day = daily.entry(order.created_at.date_naive()).or_insert((Money::ZERO, 0));
            day.0 += order.pricing.total_price;
            day.1 += 1;

            for item in &order.items {
                let entry = products.entry(item.product).or_insert_with(|| TopProduct {
                    product_id: item.product,
                    name: item.name.clone(),
                    total_sold: 0,
                    revenue: Money::ZERO,
                });
                entry.total_sold += u64::from(item.quantity);
                entry.revenue += item.line_total();
            }
        }

        let mut top_products: Vec<TopProduct> = products.into_values().collect();
        top_products.sort_by(|a, b| {
            b.total_sold
                .cmp(&a.total_sold)
                .then_with(|| b.revenue.cmp(&a.revenue))
                .then_with(|| a.name.cmp(&b.name))
        });
        top_products.truncate(TOP_PRODUCTS);

        Self {
            sales_data: daily
                .into_iter()
                .map(|(date, (revenue, orders))| DailySales { date, revenue, orders })
                .collect(),
            top_products,
            orders_by_status: statuses.into_iter().map(|(status, count)| StatusCount { status, count }).collect(),
            period,
        }
    }
}

pub struct ReportingService {
    store: SharedStore,
}

impl ReportingService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let stats = DashboardStats {
            total_users: self.store.count_users(Role::User).await?,
            total_products: self.store.count_active_products().await?,
            total_orders: self.store.count_orders().await?,
            total_revenue: self.store.completed_revenue().await?,
        };

        let (latest, _) = self.store.list_orders(&OrderFilter::default(), PageRequest::new(1, RECENT_ORDERS)).await?;
        let mut recent_orders = Vec::with_capacity(latest.len());
        for order in latest {
            let user = self.store.find_user(order.user).await?.map(|u| Customer {
                first_name: u.first_name,
                last_name: u.last_name,
                email: u.email,
            });
            recent_orders.push(RecentOrder {
                id: order.id,
                order_number: order.order_number,
                total_price: order.pricing.total_price,
                status: order.status,
                created_at: order.created_at,
                user,
            });
        }

        let low_stock_products = self
            .store
            .low_stock_products(LOW_STOCK_PRODUCTS)
            .await?
            .into_iter()
            .map(LowStockProduct::from)
            .collect();

        Ok(Dashboard { stats, recent_orders, low_stock_products })
    }

    pub async fn sales(&self, period: Period) -> Result<SalesAnalytics> {
        self.sales_at(period, Utc::now()).await
    }

    pub async fn sales_at(&self, period: Period, now: DateTime<Utc>) -> Result<SalesAnalytics> {
        let orders = self.store.orders_since(now - period.duration()).await?;
        Ok(SalesAnalytics::from_orders(&orders, period))
    }

    pub async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> Result<(Vec<User>, Pagination)> {
        let (users, total) = self.store.list_users(filter, page).await?;
        Ok((users, Pagination::new(page, total)))
    }

    /// Flips an account's active flag. Admins may toggle themselves and
    /// regular users, never another admin.
    pub async fn toggle_user(&self, actor: &User, id: UserId) -> Result<User> {
        let mut user = self.store.find_user(id).await?.ok_or(EcommerceError::NotFound("User"))?;
        if user.is_admin() && user.id != actor.id {
            tracing::warn!(actor = %actor.id, target = %id, "refused to toggle another admin");
            return Err(EcommerceError::Forbidden("Cannot modify other admin accounts"));
        }
        let active = user.toggle_active();
        self.store.set_user_active(id, active).await?;
        tracing::info!(actor = %actor.id, user_id = %id, active, "user active flag toggled");
        Ok(user)
    }
}
