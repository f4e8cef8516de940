//! End-to-end tests driving the router over the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use luxstore::domain::{Money, Product, ProductId, Role, Sku, User};
use luxstore::store::{CatalogStore, MemoryStore, UserStore};
use luxstore::{router, AppState, Config, SharedStore};

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let shared: SharedStore = store.clone();
        let config = Config { payment_success_rate: 1.0, ..Config::default() };
        Self { app: router(AppState::new(config, shared)), store }
    }

    async fn user(&self, username: &str, role: Role) -> (User, String) {
        let user = User::register(username, format!("{username}@example.com"), "Test", "User", role);
        self.store.insert_user(&user).await.unwrap();
        let token = format!("token-{username}");
        self.store.issue_token(user.id, &token).await.unwrap();
        (user, token)
    }

    async fn product(&self, sku: &str, price: Money, stock: u32) -> Product {
        let product = Product::create(Sku::new(sku).unwrap(), format!("Product {sku}"), "Sample", "Gadgets", price, stock);
        self.store.insert_product(&product).await.unwrap();
        product
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.raw(request).await
    }

    async fn raw(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, json)
    }
}

fn address() -> Value {
    json!({
        "firstName": "Jane",
        "lastName": "Smith",
        "email": "jane@example.com",
        "phone": "555-0100",
        "street": "1 Main St",
        "city": "Springfield",
        "state": "IL",
        "zipCode": "62701",
        "country": "US"
    })
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or_else(|| panic!("not a number: {value}"))
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, _) = app.send(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn product_listing_is_public_and_paginated() {
    let app = TestApp::new();
    for i in 0..3 {
        app.product(&format!("SKU-{i}"), Money::whole(10 + i), 5).await;
    }

    let (status, body) = app.send(Method::GET, "/api/products?limit=2&sort=price_desc", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let products = body["data"]["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert!((number(&products[0]["price"]) - 12.0).abs() < 1e-9);
    assert!(products[0].get("reviews").is_none());
    assert_eq!(body["data"]["pagination"]["total"], 3);
    assert_eq!(body["data"]["pagination"]["pages"], 2);
    assert_eq!(body["data"]["pagination"]["hasNext"], true);

    let (status, body) = app.send(Method::GET, "/api/products?limit=0&rating=9", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);

    let (_, body) = app.send(Method::GET, "/api/products/categories/list", None, None).await;
    assert_eq!(body["data"]["categories"], json!(["Gadgets"]));
}

#[tokio::test]
async fn inactive_products_are_hidden_from_shoppers() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;
    let (_, shopper) = app.user("jane", Role::User).await;
    let product = app.product("LAMP", Money::whole(30), 4).await;
    let uri = format!("/api/products/{}", product.id);

    let (status, body) = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Product deleted successfully");

    let (status, body) = app.send(Method::GET, &uri, Some(&shopper), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product not found");

    let (status, body) = app.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["product"]["isActive"], false);

    let (status, _) = app.send(Method::GET, "/api/products/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authentication_and_roles_are_enforced() {
    let app = TestApp::new();
    let (user, shopper) = app.user("jane", Role::User).await;

    let (status, body) = app.send(Method::GET, "/api/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized");

    let (status, _) = app.send(Method::GET, "/api/cart", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send(Method::GET, "/api/admin/dashboard", Some(&shopper), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    app.store.set_user_active(user.id, false).await.unwrap();
    let (status, body) = app.send(Method::GET, "/api/cart", Some(&shopper), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Account is deactivated");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let (_, shopper) = app.user("jane", Role::User).await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/cart/add")
        .header(header::AUTHORIZATION, format!("Bearer {shopper}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.raw(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid request body");
}

#[tokio::test]
async fn cart_enforces_stock() {
    let app = TestApp::new();
    let (_, shopper) = app.user("jane", Role::User).await;
    let mug = app.product("MUG", Money::whole(8), 3).await;

    let add = |quantity: i64| Some(json!({ "productId": mug.id, "quantity": quantity }));
    let (status, body) = app.send(Method::POST, "/api/cart/add", Some(&shopper), add(2)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Item added to cart successfully");
    assert_eq!(body["data"]["cart"]["totalItems"], 2);

    let (status, body) = app.send(Method::POST, "/api/cart/add", Some(&shopper), add(2)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only 3 items available in stock");

    let (status, body) = app.send(Method::POST, "/api/cart/add", Some(&shopper), add(0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "quantity");

    let unknown = json!({ "productId": ProductId::generate(), "quantity": 1 });
    let (status, _) = app.send(Method::POST, "/api/cart/add", Some(&shopper), Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.send(Method::GET, "/api/cart/summary", Some(&shopper), None).await;
    assert_eq!(body["data"]["totalItems"], 2);
    assert_eq!(body["data"]["itemCount"], 1);
    assert!((number(&body["data"]["totalAmount"]) - 16.0).abs() < 1e-9);

    let uri = format!("/api/cart/remove/{}", mug.id);
    let (status, body) = app.send(Method::DELETE, &uri, Some(&shopper), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cart"]["items"], json!([]));
}

#[tokio::test]
async fn checkout_flow_places_and_cancels_orders() {
    let app = TestApp::new();
    let (_, shopper) = app.user("jane", Role::User).await;
    let (_, stranger) = app.user("joe", Role::User).await;
    let widget = app.product("WIDGET", Money::whole(60), 5).await;

    let (status, body) = app
        .send(Method::POST, "/api/orders", Some(&shopper), Some(json!({ "shippingAddress": address(), "paymentInfo": { "method": "credit_card" } })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cart is empty");

    let line = json!({ "productId": widget.id, "quantity": 2 });
    app.send(Method::POST, "/api/cart/add", Some(&shopper), Some(line)).await;

    let order_body = json!({
        "shippingAddress": address(),
        "paymentInfo": { "method": "credit_card" },
        "notes": "Leave at the door"
    });
    let (status, body) = app.send(Method::POST, "/api/orders", Some(&shopper), Some(order_body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Order created successfully");
    let order = &body["data"]["order"];
    assert!((number(&order["pricing"]["totalPrice"]) - 129.6).abs() < 1e-9);
    assert!((number(&order["pricing"]["shippingPrice"])).abs() < 1e-9);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentInfo"]["status"], "completed");
    assert_eq!(order["summary"]["totalItems"], 2);
    let order_number = order["orderNumber"].as_str().unwrap();
    assert!(order_number.starts_with("LUX") && order_number.len() == 12);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, body) = app.send(Method::GET, &format!("/api/products/{}", widget.id), None, None).await;
    assert_eq!(body["data"]["product"]["stock"], 3);
    let (_, body) = app.send(Method::GET, "/api/cart", Some(&shopper), None).await;
    assert_eq!(body["data"]["cart"]["items"], json!([]));

    let (status, body) = app.send(Method::GET, &format!("/api/orders/{order_id}"), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (_, body) = app.send(Method::GET, "/api/orders", Some(&shopper), None).await;
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let cancel = format!("/api/orders/{order_id}/cancel");
    let (status, body) = app.send(Method::PUT, &cancel, Some(&shopper), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "cancelled");

    let (status, body) = app.send(Method::PUT, &cancel, Some(&shopper), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Order cannot be cancelled");

    let (_, body) = app.send(Method::GET, &format!("/api/products/{}", widget.id), None, None).await;
    assert_eq!(body["data"]["product"]["stock"], 5);
}

#[tokio::test]
async fn order_validation_reports_each_field() {
    let app = TestApp::new();
    let (_, shopper) = app.user("jane", Role::User).await;
    let mut shipping = address();
    shipping["zipCode"] = json!("");
    let body = json!({ "shippingAddress": shipping, "paymentInfo": { "method": "barter" } });

    let (status, body) = app.send(Method::POST, "/api/orders", Some(&shopper), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"].as_array().unwrap().iter().filter_map(|e| e["field"].as_str()).collect();
    assert_eq!(fields, vec!["paymentInfo.method", "shippingAddress.zipCode"]);
}

#[tokio::test]
async fn payment_simulation_rejects_cash_on_delivery() {
    let app = TestApp::new();
    let (_, shopper) = app.user("jane", Role::User).await;

    let card = json!({ "amount": 25.5, "method": "debit_card", "cardNumber": "4111111111111111", "expiryDate": "12/29", "cvv": "123" });
    let (status, body) = app.send(Method::POST, "/api/orders/payment/process", Some(&shopper), Some(card)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment processed successfully");
    assert!(body["data"]["transactionId"].as_str().unwrap().starts_with("TXN"));
    assert_eq!(body["data"]["status"], "completed");

    let cod = json!({ "amount": 25.5, "method": "cod" });
    let (status, _) = app.send(Method::POST, "/api/orders/payment/process", Some(&shopper), Some(cod)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_manages_catalog_orders_and_users() {
    let app = TestApp::new();
    let (admin_user, admin) = app.user("admin", Role::Admin).await;
    let (_, other_admin) = app.user("ops", Role::Admin).await;
    let (shopper_user, shopper) = app.user("jane", Role::User).await;

    let new_product = json!({
        "name": "Desk Lamp",
        "description": "Warm light",
        "price": 45,
        "category": "Home",
        "sku": " lamp-01 ",
        "stock": 4
    });
    let (status, body) = app.send(Method::POST, "/api/products", Some(&admin), Some(new_product.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["product"]["sku"], "LAMP-01");
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::POST, "/api/products", Some(&admin), Some(new_product)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Product with this SKU already exists");

    let review = json!({ "rating": 4, "comment": "Bright enough" });
    let uri = format!("/api/products/{product_id}/reviews");
    let (status, body) = app.send(Method::POST, &uri, Some(&shopper), Some(review.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["totalReviews"], 1);
    let (status, _) = app.send(Method::POST, &uri, Some(&shopper), Some(review)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let line = json!({ "productId": product_id, "quantity": 1 });
    app.send(Method::POST, "/api/cart/add", Some(&shopper), Some(line)).await;
    let order = json!({ "shippingAddress": address(), "paymentInfo": { "method": "paypal" } });
    let (_, body) = app.send(Method::POST, "/api/orders", Some(&shopper), Some(order)).await;
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::GET, "/api/admin/orders?status=pending", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 1);

    let status_uri = format!("/api/admin/orders/{order_id}/status");
    let change = json!({ "status": "shipped", "trackingNumber": "  1Z999  " });
    let (status, body) = app.send(Method::PUT, &status_uri, Some(&admin), Some(change)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "shipped");
    assert_eq!(body["data"]["order"]["trackingNumber"], "1Z999");

    let (status, _) = app.send(Method::PUT, &status_uri, Some(&admin), Some(json!({ "status": "lost" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.send(Method::GET, "/api/admin/dashboard", Some(&admin), None).await;
    let stats = &body["data"]["stats"];
    assert_eq!(stats["totalUsers"], 1);
    assert_eq!(stats["totalOrders"], 1);
    assert!((number(&stats["totalRevenue"]) - 58.6).abs() < 1e-9);
    assert_eq!(body["data"]["recentOrders"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["lowStockProducts"][0]["name"], "Desk Lamp");

    let (_, body) = app.send(Method::GET, "/api/admin/analytics/sales?period=30d", Some(&admin), None).await;
    assert_eq!(body["data"]["period"], "30d");
    assert_eq!(body["data"]["topProducts"][0]["totalSold"], 1);
    assert_eq!(body["data"]["ordersByStatus"][0]["status"], "shipped");

    let (_, body) = app.send(Method::GET, "/api/admin/users?role=admin", Some(&admin), None).await;
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 2);

    let toggle = |id: String| format!("/api/admin/users/{id}/toggle-status");
    let (status, body) = app.send(Method::PUT, &toggle(shopper_user.id.to_string()), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deactivated successfully");
    assert_eq!(body["data"]["user"]["isActive"], false);

    let other = app.store.find_user_by_token(&other_admin).await.unwrap().unwrap();
    let (status, body) = app.send(Method::PUT, &toggle(other.id.to_string()), Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Cannot modify other admin accounts");
    assert!(app.store.find_user(admin_user.id).await.unwrap().unwrap().is_active);
}
