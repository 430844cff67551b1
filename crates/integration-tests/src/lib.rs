//! Integration tests for Cartwheel.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! The tests drive the real `ApiClient` over HTTP against [`FakeShop`], an
//! in-process `axum` server that speaks the shop service's REST contract.
//! No external service is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! let shop = FakeShop::start().await?;
//! let client = ApiClient::new(&shop.config()?)?;
//! let mut state = AppState::new(client, MemoryStore::new())?;
//! state.login(&Credentials::new(EMAIL, PASSWORD)?).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use cartwheel_client::ClientConfig;
use cartwheel_client::config::ConfigError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Email of the seeded account.
pub const EMAIL: &str = "shopper@example.com";

/// Password of the seeded account.
pub const PASSWORD: &str = "correct-horse";

/// Id of the seeded mug (9.99, 3 in stock).
pub const MUG: i64 = 42;

/// Id of the seeded teapot (24.50, 10 in stock).
pub const TEAPOT: i64 = 7;

/// Id of the seeded top-level category holding both products.
pub const KITCHEN: i64 = 1;

/// Id of the seeded child category of [`KITCHEN`].
pub const TEAWARE: i64 = 2;

/// Slug of [`TEAWARE`]. Contains a `/` so it only resolves when sent as
/// one path segment.
pub const TEAWARE_SLUG: &str = "tea/ware";

/// Id of a seeded 3-star teapot review written by another account.
pub const CRITIC_REVIEW: i64 = 1;

// =============================================================================
// Shop State
// =============================================================================

#[derive(Clone)]
struct Account {
    id: i64,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    verified: bool,
}

#[derive(Clone)]
struct CatalogProduct {
    id: i64,
    name: String,
    price: Decimal,
    stock: u32,
    category_id: i64,
}

#[derive(Clone)]
struct Line {
    id: i64,
    product_id: i64,
    quantity: u32,
}

#[derive(Clone)]
struct PlacedOrder {
    id: i64,
    number: String,
    email: String,
    lines: Vec<(CatalogProduct, u32)>,
    status: &'static str,
    payment_method: String,
}

#[derive(Clone)]
struct ShopCategory {
    id: i64,
    name: String,
    slug: String,
    parent_id: Option<i64>,
}

#[derive(Clone)]
struct StoredReview {
    id: i64,
    product_id: i64,
    email: String,
    rating: i64,
    comment: Option<String>,
    votes: HashMap<String, bool>,
}

#[derive(Default)]
struct ShopState {
    accounts: Vec<Account>,
    products: Vec<CatalogProduct>,
    categories: Vec<ShopCategory>,
    reviews: Vec<StoredReview>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    carts: HashMap<String, Vec<Line>>,
    orders: Vec<PlacedOrder>,
    requests: Vec<String>,
    next_id: i64,
    fail_logout: bool,
}

impl ShopState {
    fn seeded() -> Self {
        let mut state = Self {
            next_id: 100,
            ..Self::default()
        };
        state.accounts.push(Account {
            id: 1,
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Pat".to_string(),
            last_name: "Doe".to_string(),
            verified: true,
        });
        state.products.push(CatalogProduct {
            id: MUG,
            name: "Enamel Mug".to_string(),
            price: Decimal::new(999, 2),
            stock: 3,
            category_id: 1,
        });
        state.products.push(CatalogProduct {
            id: TEAPOT,
            name: "Cast Iron Teapot".to_string(),
            price: Decimal::new(2450, 2),
            stock: 10,
            category_id: 1,
        });
        state.accounts.push(Account {
            id: 2,
            email: "critic@example.com".to_string(),
            password: "critic".to_string(),
            first_name: "Cass".to_string(),
            last_name: "Critic".to_string(),
            verified: true,
        });
        state.categories.push(ShopCategory {
            id: KITCHEN,
            name: "Kitchen".to_string(),
            slug: "kitchen".to_string(),
            parent_id: None,
        });
        state.categories.push(ShopCategory {
            id: TEAWARE,
            name: "Teaware".to_string(),
            slug: TEAWARE_SLUG.to_string(),
            parent_id: Some(KITCHEN),
        });
        state.reviews.push(StoredReview {
            id: CRITIC_REVIEW,
            product_id: TEAPOT,
            email: "critic@example.com".to_string(),
            rating: 3,
            comment: Some("Drips when pouring".to_string()),
            votes: HashMap::new(),
        });
        state
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_tokens(&mut self, email: &str) -> (String, String) {
        let n = self.next_id();
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        self.access_tokens.insert(access.clone(), email.to_string());
        self.refresh_tokens.insert(refresh.clone(), email.to_string());
        (access, refresh)
    }

    fn account(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email == email)
    }

    fn product(&self, id: i64) -> Option<&CatalogProduct> {
        self.products.iter().find(|p| p.id == id)
    }

    fn category_json(&self, category: &ShopCategory, nested: bool) -> Value {
        let parent_name = category
            .parent_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(|c| c.name.clone());
        let children: Option<Vec<Value>> = nested.then(|| {
            self.categories
                .iter()
                .filter(|c| c.parent_id == Some(category.id))
                .map(|c| self.category_json(c, true))
                .collect()
        });
        let product_count = self
            .products
            .iter()
            .filter(|p| p.category_id == category.id)
            .count();
        json!({
            "id": category.id,
            "name": category.name,
            "slug": category.slug,
            "parentId": category.parent_id,
            "parentName": parent_name,
            "isActive": true,
            "subCategories": children,
            "productCount": product_count,
        })
    }

    fn review_json(&self, review: &StoredReview, viewer: Option<&str>) -> Value {
        let author = self.account(&review.email);
        let helpful = review.votes.values().filter(|v| **v).count();
        json!({
            "id": review.id,
            "productId": review.product_id,
            "productName": self.product(review.product_id).map(|p| p.name.clone()),
            "userId": author.map(|a| a.id),
            "userName": author.map(|a| format!("{} {}", a.first_name, a.last_name)),
            "rating": review.rating,
            "comment": review.comment,
            "helpfulCount": helpful,
            "unhelpfulCount": review.votes.len() - helpful,
            "currentUserVote": viewer.and_then(|v| review.votes.get(v)),
        })
    }

    fn rating_summary(&self, product_id: i64) -> (Decimal, usize) {
        let ratings: Vec<i64> = self
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        if ratings.is_empty() {
            return (Decimal::ZERO, 0);
        }
        let sum: i64 = ratings.iter().sum();
        let average = (Decimal::from(sum) / Decimal::from(ratings.len())).round_dp(1);
        (average, ratings.len())
    }

    fn auth_body(&mut self, email: &str) -> Value {
        let (access, refresh) = self.issue_tokens(email);
        let user = self.account(email).map_or(Value::Null, user_json);
        json!({ "accessToken": access, "refreshToken": refresh, "user": user })
    }

    fn cart_json(&self, email: &str) -> Value {
        let lines = self.carts.get(email).map_or(&[][..], Vec::as_slice);
        let mut items = Vec::new();
        let mut total_items = 0;
        let mut total_amount = Decimal::ZERO;
        for line in lines {
            let Some(product) = self.product(line.product_id) else {
                continue;
            };
            total_items += line.quantity;
            total_amount += product.price * Decimal::from(line.quantity);
            items.push(json!({
                "id": line.id,
                "productId": product.id,
                "productName": product.name,
                "quantity": line.quantity,
                "unitPrice": money(product.price),
                "stockAvailable": product.stock,
            }));
        }
        json!({
            "cartItems": items,
            "totalItems": total_items,
            "totalAmount": money(total_amount),
        })
    }
}

fn user_json(account: &Account) -> Value {
    json!({
        "id": account.id,
        "email": account.email,
        "firstName": account.first_name,
        "lastName": account.last_name,
        "role": "CUSTOMER",
        "isEmailVerified": account.verified,
    })
}

fn product_json(product: &CatalogProduct) -> Value {
    json!({
        "id": product.id,
        "name": product.name,
        "price": money(product.price),
        "stockQuantity": product.stock,
        "categoryId": product.category_id,
    })
}

fn order_json(order: &PlacedOrder) -> Value {
    let mut total = Decimal::ZERO;
    let items: Vec<Value> = order
        .lines
        .iter()
        .enumerate()
        .map(|(i, (product, quantity))| {
            let subtotal = product.price * Decimal::from(*quantity);
            total += subtotal;
            json!({
                "id": i + 1,
                "productName": product.name,
                "price": money(product.price),
                "quantity": quantity,
                "subtotal": money(subtotal),
            })
        })
        .collect();
    json!({
        "id": order.id,
        "orderNumber": order.number,
        "orderItems": items,
        "totalAmount": money(total),
        "status": order.status,
        "paymentMethod": order.payment_method,
        "paymentStatus": "PENDING",
    })
}

/// Decimal as a JSON number, the way the service sends amounts.
fn money(amount: Decimal) -> Value {
    amount
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

// =============================================================================
// FakeShop
// =============================================================================

type Shared = Arc<Mutex<ShopState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, ShopState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process stand-in for the shop service.
///
/// Seeded with one account ([`EMAIL`]/[`PASSWORD`]), two products
/// ([`MUG`], [`TEAPOT`]), a two-level category tree ([`KITCHEN`],
/// [`TEAWARE`]) and one teapot review by another account
/// ([`CRITIC_REVIEW`]). The server task lives until the runtime shuts down.
pub struct FakeShop {
    addr: SocketAddr,
    state: Shared,
}

impl FakeShop {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state: Shared = Arc::new(Mutex::new(ShopState::seeded()));
        let app = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake shop stopped");
            }
        });

        Ok(Self { addr, state })
    }

    /// Base URL of the REST API.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Client configuration pointing at this server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the base URL is rejected.
    pub fn config(&self) -> Result<ClientConfig, ConfigError> {
        ClientConfig::new(&self.base_url())
    }

    /// Every request received so far, as `"METHOD /path"`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Invalidate every issued access token, as if they expired server-side.
    pub fn revoke_tokens(&self) {
        lock(&self.state).access_tokens.clear();
    }

    /// Make `POST /auth/logout` answer 500.
    pub fn fail_logout(&self) {
        lock(&self.state).fail_logout = true;
    }

    /// Units in the server-side cart of `email`.
    #[must_use]
    pub fn cart_units(&self, email: &str) -> u32 {
        lock(&self.state)
            .carts
            .get(email)
            .map_or(0, |lines| lines.iter().map(|l| l.quantity).sum())
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh-token", post(refresh_token))
        .route("/api/auth/me", get(me))
        .route("/api/auth/verify-email", post(accept))
        .route("/api/auth/resend-verification", post(accept))
        .route("/api/auth/forgot-password", post(accept))
        .route("/api/auth/reset-password", post(accept))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/count", get(cart_count))
        .route("/api/cart/items", post(add_item))
        .route(
            "/api/cart/items/{item_id}",
            put(update_item).delete(remove_item),
        )
        .route("/api/products", get(list_products))
        .route("/api/products/search", get(search_products))
        .route("/api/products/{id}", get(get_product))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/top-level", get(top_level_categories))
        .route("/api/categories/slug/{slug}", get(category_by_slug))
        .route("/api/categories/parent/{id}", get(subcategories))
        .route("/api/categories/{id}", get(get_category))
        .route("/api/categories/{id}/products", get(category_products))
        .route("/api/reviews", post(create_review))
        .route("/api/reviews/my-reviews", get(my_reviews))
        .route("/api/reviews/product/{id}", get(product_reviews))
        .route("/api/reviews/product/{id}/stats", get(review_stats))
        .route("/api/reviews/can-review/{id}", get(can_review))
        .route("/api/reviews/{id}", put(update_review).delete(delete_review))
        .route("/api/reviews/{id}/vote", post(vote_review))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/number/{number}", get(order_by_number))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", put(cancel_order))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(shop): State<Shared>, request: Request, next: Next) -> Response {
    lock(&shop)
        .requests
        .push(format!("{} {}", request.method(), request.uri().path()));
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid or expired token" })),
    )
        .into_response()
}

/// Resolve the bearer token to an account email.
fn caller(state: &ShopState, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    state.access_tokens.get(token).cloned()
}

// =============================================================================
// Auth Handlers
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(shop): State<Shared>, Json(body): Json<LoginBody>) -> Response {
    let mut state = lock(&shop);
    let valid = state
        .account(&body.email)
        .is_some_and(|a| a.password == body.password);
    if !valid {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid email or password" })),
        )
            .into_response();
    }
    Json(state.auth_body(&body.email)).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

async fn register(State(shop): State<Shared>, Json(body): Json<RegisterBody>) -> Response {
    let mut state = lock(&shop);
    if state.account(&body.email).is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email already registered" })),
        )
            .into_response();
    }
    let id = state.next_id();
    state.accounts.push(Account {
        id,
        email: body.email.clone(),
        password: body.password,
        first_name: body.first_name,
        last_name: body.last_name,
        verified: false,
    });
    Json(state.auth_body(&body.email)).into_response()
}

async fn logout(State(shop): State<Shared>) -> Response {
    if lock(&shop).fail_logout {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Logout failed");
    }
    StatusCode::OK.into_response()
}

async fn refresh_token(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shop);
    let email = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| state.refresh_tokens.get(t).cloned());
    match email {
        Some(email) => Json(state.auth_body(&email)).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn me(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    state
        .account(&email)
        .map_or_else(unauthorized, |a| Json(user_json(a)).into_response())
}

async fn accept() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// Cart Handlers
// =============================================================================

async fn get_cart(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    Json(state.cart_json(&email)).into_response()
}

async fn cart_count(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let count: u32 = state
        .carts
        .get(&email)
        .map_or(0, |lines| lines.iter().map(|l| l.quantity).sum());
    Json(json!({ "count": count })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemBody {
    product_id: i64,
    quantity: u32,
}

async fn add_item(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let Some(stock) = state.product(body.product_id).map(|p| p.stock) else {
        return error(StatusCode::BAD_REQUEST, "Product not found");
    };
    let existing = state
        .carts
        .get(&email)
        .and_then(|lines| lines.iter().find(|l| l.product_id == body.product_id))
        .map_or(0, |l| l.quantity);
    if existing + body.quantity > stock {
        return error(StatusCode::BAD_REQUEST, "Insufficient stock");
    }

    let id = state.next_id();
    let lines = state.carts.entry(email.clone()).or_default();
    match lines.iter_mut().find(|l| l.product_id == body.product_id) {
        Some(line) => line.quantity += body.quantity,
        None => lines.push(Line {
            id,
            product_id: body.product_id,
            quantity: body.quantity,
        }),
    }
    Json(state.cart_json(&email)).into_response()
}

#[derive(Deserialize)]
struct QuantityParam {
    quantity: u32,
}

async fn update_item(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
    Query(params): Query<QuantityParam>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let product_id = state
        .carts
        .get(&email)
        .and_then(|lines| lines.iter().find(|l| l.id == item_id))
        .map(|l| l.product_id);
    let Some(stock) = product_id.and_then(|id| state.product(id)).map(|p| p.stock) else {
        return error(StatusCode::BAD_REQUEST, "Cart item not found");
    };
    if params.quantity > stock {
        return error(StatusCode::BAD_REQUEST, "Insufficient stock");
    }
    if let Some(line) = state
        .carts
        .get_mut(&email)
        .and_then(|lines| lines.iter_mut().find(|l| l.id == item_id))
    {
        line.quantity = params.quantity;
    }
    Json(state.cart_json(&email)).into_response()
}

async fn remove_item(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    if let Some(lines) = state.carts.get_mut(&email) {
        lines.retain(|l| l.id != item_id);
    }
    Json(state.cart_json(&email)).into_response()
}

async fn clear_cart(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    state.carts.remove(&email);
    Json(state.cart_json(&email)).into_response()
}

// =============================================================================
// Catalog Handlers
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    page: Option<usize>,
    size: Option<usize>,
    category_id: Option<i64>,
}

async fn list_products(State(shop): State<Shared>, Query(params): Query<ListParams>) -> Response {
    let state = lock(&shop);
    let matching: Vec<&CatalogProduct> = state
        .products
        .iter()
        .filter(|p| params.category_id.is_none_or(|c| p.category_id == c))
        .collect();
    let size = params.size.unwrap_or(12).max(1);
    let page = params.page.unwrap_or(0);
    let products: Vec<Value> = matching
        .iter()
        .skip(page * size)
        .take(size)
        .map(|p| product_json(p))
        .collect();
    Json(json!({
        "products": products,
        "totalPages": matching.len().div_ceil(size).max(1),
        "currentPage": page + 1,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn search_products(
    State(shop): State<Shared>,
    Query(params): Query<SearchParams>,
) -> Response {
    let state = lock(&shop);
    let needle = params.q.to_lowercase();
    let products: Vec<Value> = state
        .products
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .map(product_json)
        .collect();
    Json(products).into_response()
}

async fn get_product(State(shop): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = lock(&shop);
    state.product(id).map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": format!("Product not found with id: {id}") })),
            )
                .into_response()
        },
        |p| {
            let (average, total) = state.rating_summary(p.id);
            let mut body = product_json(p);
            body["averageRating"] = money(average);
            body["totalReviews"] = json!(total);
            Json(body).into_response()
        },
    )
}

async fn category_products(State(shop): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = lock(&shop);
    let products: Vec<Value> = state
        .products
        .iter()
        .filter(|p| p.category_id == id)
        .map(product_json)
        .collect();
    Json(products).into_response()
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
}

async fn list_categories(State(shop): State<Shared>) -> Response {
    let state = lock(&shop);
    let categories: Vec<Value> = state
        .categories
        .iter()
        .map(|c| state.category_json(c, false))
        .collect();
    Json(categories).into_response()
}

async fn top_level_categories(State(shop): State<Shared>) -> Response {
    let state = lock(&shop);
    let categories: Vec<Value> = state
        .categories
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| state.category_json(c, true))
        .collect();
    Json(categories).into_response()
}

async fn get_category(State(shop): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = lock(&shop);
    state.categories.iter().find(|c| c.id == id).map_or_else(
        || not_found(format!("Category not found with id: {id}")),
        |c| Json(state.category_json(c, true)).into_response(),
    )
}

async fn category_by_slug(State(shop): State<Shared>, Path(slug): Path<String>) -> Response {
    let state = lock(&shop);
    state.categories.iter().find(|c| c.slug == slug).map_or_else(
        || not_found(format!("Category not found with slug: {slug}")),
        |c| Json(state.category_json(c, true)).into_response(),
    )
}

async fn subcategories(State(shop): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = lock(&shop);
    let children: Vec<Value> = state
        .categories
        .iter()
        .filter(|c| c.parent_id == Some(id))
        .map(|c| state.category_json(c, false))
        .collect();
    Json(children).into_response()
}

// =============================================================================
// Review Handlers
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewListParams {
    sort_by: Option<String>,
}

async fn product_reviews(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<ReviewListParams>,
) -> Response {
    let state = lock(&shop);
    let viewer = caller(&state, &headers);
    let mut reviews: Vec<&StoredReview> =
        state.reviews.iter().filter(|r| r.product_id == id).collect();
    reviews.sort_by_key(|r| r.id);
    if params.sort_by.as_deref() != Some("oldest") {
        reviews.reverse();
    }
    let body: Vec<Value> = reviews
        .into_iter()
        .map(|r| state.review_json(r, viewer.as_deref()))
        .collect();
    Json(body).into_response()
}

async fn review_stats(State(shop): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = lock(&shop);
    let (average, total) = state.rating_summary(id);
    let mut distribution = serde_json::Map::new();
    for stars in 1..=5_i64 {
        let count = state
            .reviews
            .iter()
            .filter(|r| r.product_id == id && r.rating == stars)
            .count();
        distribution.insert(stars.to_string(), json!(count));
    }
    Json(json!({
        "averageRating": format!("{average:.1}"),
        "totalReviews": total,
        "ratingDistribution": distribution,
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewBody {
    product_id: Option<i64>,
    rating: Option<i64>,
    comment: Option<String>,
}

async fn create_review(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ReviewBody>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let Some(product_id) = body.product_id.filter(|id| state.product(*id).is_some()) else {
        return not_found("Product not found".to_string());
    };
    if state
        .reviews
        .iter()
        .any(|r| r.product_id == product_id && r.email == email)
    {
        return error(StatusCode::BAD_REQUEST, "You have already reviewed this product");
    }
    let Some(rating) = body.rating.filter(|r| (1..=5).contains(r)) else {
        return error(StatusCode::BAD_REQUEST, "Rating must be between 1 and 5");
    };
    let id = state.next_id();
    let review = StoredReview {
        id,
        product_id,
        email: email.clone(),
        rating,
        comment: body.comment,
        votes: HashMap::new(),
    };
    let response = state.review_json(&review, Some(email.as_str()));
    state.reviews.push(review);
    Json(response).into_response()
}

/// Find a review the caller wrote, or the refusal to send back.
fn own_review<'a>(
    state: &'a mut ShopState,
    email: &str,
    id: i64,
    verb: &str,
) -> Result<&'a mut StoredReview, Response> {
    let review = state
        .reviews
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| not_found("Review not found".to_string()))?;
    if review.email != email {
        return Err(error(
            StatusCode::BAD_REQUEST,
            &format!("You can only {verb} your own reviews"),
        ));
    }
    Ok(review)
}

async fn update_review(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    if body.rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return error(StatusCode::BAD_REQUEST, "Rating must be between 1 and 5");
    }
    let review = match own_review(&mut state, &email, id, "update") {
        Ok(review) => review,
        Err(response) => return response,
    };
    if let Some(rating) = body.rating {
        review.rating = rating;
    }
    if let Some(comment) = body.comment {
        review.comment = Some(comment);
    }
    let review = review.clone();
    Json(state.review_json(&review, Some(email.as_str()))).into_response()
}

async fn delete_review(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    if let Err(response) = own_review(&mut state, &email, id, "delete") {
        return response;
    }
    state.reviews.retain(|r| r.id != id);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct VoteParams {
    helpful: bool,
}

async fn vote_review(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(params): Query<VoteParams>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let Some(review) = state.reviews.iter_mut().find(|r| r.id == id) else {
        return not_found("Review not found".to_string());
    };
    if review.email == email {
        return error(StatusCode::BAD_REQUEST, "You cannot vote on your own review");
    }
    if review.votes.get(&email) == Some(&params.helpful) {
        review.votes.remove(&email);
    } else {
        review.votes.insert(email.clone(), params.helpful);
    }
    let review = review.clone();
    Json(state.review_json(&review, Some(email.as_str()))).into_response()
}

async fn my_reviews(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let reviews: Vec<Value> = state
        .reviews
        .iter()
        .filter(|r| r.email == email)
        .map(|r| state.review_json(r, Some(email.as_str())))
        .collect();
    Json(reviews).into_response()
}

async fn can_review(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let reviewed = state
        .reviews
        .iter()
        .any(|r| r.product_id == id && r.email == email);
    Json(json!({
        "canReview": !reviewed,
        "hasReviewed": reviewed,
        "message": if reviewed {
            "You have already reviewed this product"
        } else {
            "You can review this product"
        },
    }))
    .into_response()
}

// =============================================================================
// Order Handlers
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody {
    payment_method: String,
}

async fn create_order(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<OrderBody>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let lines = state.carts.remove(&email).unwrap_or_default();
    if lines.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Your cart is empty or not found");
    }
    let lines: Vec<(CatalogProduct, u32)> = lines
        .iter()
        .filter_map(|l| state.product(l.product_id).map(|p| (p.clone(), l.quantity)))
        .collect();
    let id = state.next_id();
    let order = PlacedOrder {
        id,
        number: format!("ORD-{id:06}"),
        email,
        lines,
        status: "PENDING",
        payment_method: body.payment_method,
    };
    let response = order_json(&order);
    state.orders.push(order);
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn list_orders(State(shop): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let orders: Vec<Value> = state
        .orders
        .iter()
        .filter(|o| o.email == email)
        .map(order_json)
        .collect();
    Json(orders).into_response()
}

fn find_order(
    state: &ShopState,
    headers: &HeaderMap,
    matches: impl Fn(&PlacedOrder) -> bool,
) -> Response {
    let Some(email) = caller(state, headers) else {
        return unauthorized();
    };
    state
        .orders
        .iter()
        .find(|o| o.email == email && matches(o))
        .map_or_else(
            || error(StatusCode::NOT_FOUND, "Order not found"),
            |o| Json(order_json(o)).into_response(),
        )
}

async fn get_order(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    find_order(&lock(&shop), &headers, |o| o.id == id)
}

async fn order_by_number(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(number): Path<String>,
) -> Response {
    find_order(&lock(&shop), &headers, |o| o.number == number)
}

async fn cancel_order(
    State(shop): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&shop);
    let Some(email) = caller(&state, &headers) else {
        return unauthorized();
    };
    let Some(order) = state
        .orders
        .iter_mut()
        .find(|o| o.email == email && o.id == id)
    else {
        return error(StatusCode::NOT_FOUND, "Order not found");
    };
    if order.status != "PENDING" {
        return error(StatusCode::BAD_REQUEST, "Order cannot be cancelled");
    }
    order.status = "CANCELLED";
    Json(order_json(order)).into_response()
}
