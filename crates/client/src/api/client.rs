//! `reqwest` implementation of the gateway traits.

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{CartItemId, CategoryId, Email, OrderId, ProductId, ReviewId};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::cache::{CacheKey, CacheValue};
use super::types::{
    AuthResponse, Category, Credentials, NewReview, Order, OrderRequest, Product, ProductPage,
    ProductQuery, Registration, Review, ReviewEligibility, ReviewSort, ReviewStats, ReviewUpdate,
    UserProfile,
};
use super::{AuthGateway, CartGateway, CatalogGateway, OrderGateway, ReviewGateway};
use crate::cart::CartSnapshot;
use crate::config::ClientConfig;
use crate::error::{AuthError, ClientError, NetworkError, Result};
use crate::token::{AccessToken, RefreshToken};

/// Header carrying a per-request correlation id.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Characters of a response body kept in logs.
const LOG_BODY_LIMIT: usize = 500;

/// Characters of a non-JSON error body surfaced as the error message.
const MESSAGE_BODY_LIMIT: usize = 200;

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the shop service REST API.
///
/// Cheap to clone; clones share the connection pool and catalog cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Transport` if the HTTP client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("cartwheel/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(NetworkError::from)?;

        let cache = Cache::builder()
            .max_capacity(config.catalog_cache.capacity)
            .time_to_live(config.catalog_cache.ttl)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
                cache,
            }),
        })
    }

    /// Base URL every endpoint path is joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Drop every cached catalog response.
    pub fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
    }

    fn url(&self, path: &str) -> Result<Url> {
        endpoint(&self.inner.base_url, path)
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        Ok(self.request_to(method, url, bearer))
    }

    fn request_to(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, %method, path = url.path(), "Sending request");
        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send a request and return the body of a success response.
    async fn send(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder.send().await.map_err(NetworkError::from)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(NetworkError::RateLimited(retry_after).into());
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await.map_err(NetworkError::from)?;

        if status.is_success() {
            return Ok(body);
        }

        tracing::warn!(
            status = %status,
            body = %truncate(&body, LOG_BODY_LIMIT),
            "Shop service returned non-success status"
        );

        let message = error_message(status, &body);
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AuthError::Unauthorized(message).into());
        }
        Err(NetworkError::Status {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    /// Send a request and decode the JSON body.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body, LOG_BODY_LIMIT),
                "Failed to parse shop service response"
            );
            NetworkError::Decode(e).into()
        })
    }

    /// Send a request whose response body is ignored.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        self.send(builder).await.map(drop)
    }

    /// Serve a category listing from the cache, fetching `path` on a miss.
    async fn cached_categories(&self, cache_key: CacheKey, path: &str) -> Result<Vec<Category>> {
        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!(path, "Cache hit for categories");
            return Ok(categories);
        }

        let request = self.request(Method::GET, path, None)?;
        let categories: Vec<Category> = self.send_json(request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }
}

// =============================================================================
// Auth
// =============================================================================

#[async_trait]
impl AuthGateway for ApiClient {
    #[instrument(skip_all, fields(email = %credentials.email()))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let request = self.request(Method::POST, "auth/login", None)?.json(credentials);
        self.send_json(request)
            .await
            .map_err(|e| rejected(e, "Login failed"))
    }

    #[instrument(skip_all, fields(email = %registration.email()))]
    async fn register(&self, registration: &Registration) -> Result<AuthResponse> {
        let request = self
            .request(Method::POST, "auth/register", None)?
            .json(registration);
        self.send_json(request)
            .await
            .map_err(|e| rejected(e, "Registration failed"))
    }

    #[instrument(skip_all)]
    async fn logout(&self, token: &AccessToken) -> Result<()> {
        let request = self.request(Method::POST, "auth/logout", Some(token.expose()))?;
        self.send_empty(request).await
    }

    #[instrument(skip_all)]
    async fn refresh_token(&self, token: &RefreshToken) -> Result<AuthResponse> {
        let request = self.request(Method::POST, "auth/refresh-token", Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip_all)]
    async fn current_user(&self, token: &AccessToken) -> Result<UserProfile> {
        let request = self.request(Method::GET, "auth/me", Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip_all)]
    async fn verify_email(&self, verification_token: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "auth/verify-email", None)?
            .query(&[("token", verification_token)]);
        self.send_empty(request).await
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn resend_verification(&self, email: &Email) -> Result<()> {
        let request = self
            .request(Method::POST, "auth/resend-verification", None)?
            .query(&[("email", email.as_str())]);
        self.send_empty(request).await
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn forgot_password(&self, email: &Email) -> Result<()> {
        let request = self
            .request(Method::POST, "auth/forgot-password", None)?
            .query(&[("email", email.as_str())]);
        self.send_empty(request).await
    }

    #[instrument(skip_all)]
    async fn reset_password(&self, reset_token: &str, new_password: &SecretString) -> Result<()> {
        let request = self
            .request(Method::POST, "auth/reset-password", None)?
            .query(&[
                ("token", reset_token),
                ("newPassword", new_password.expose_secret()),
            ]);
        self.send_empty(request).await
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: Option<u32>,
}

#[async_trait]
impl CartGateway for ApiClient {
    #[instrument(skip_all)]
    async fn get_cart(&self, token: &AccessToken) -> Result<CartSnapshot> {
        let request = self.request(Method::GET, "cart", Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip_all)]
    async fn cart_count(&self, token: &AccessToken) -> Result<u32> {
        let request = self.request(Method::GET, "cart/count", Some(token.expose()))?;
        let response: CountResponse = self.send_json(request).await?;
        Ok(response.count.unwrap_or(0))
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_item(
        &self,
        token: &AccessToken,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        let request = self
            .request(Method::POST, "cart/items", Some(token.expose()))?
            .json(&serde_json::json!({
                "productId": product_id,
                "quantity": quantity,
            }));
        self.send_json(request).await
    }

    #[instrument(skip(self, token), fields(item_id = %item_id))]
    async fn update_item(
        &self,
        token: &AccessToken,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        let request = self
            .request(
                Method::PUT,
                &format!("cart/items/{item_id}"),
                Some(token.expose()),
            )?
            .query(&[("quantity", quantity)]);
        self.send_json(request).await
    }

    #[instrument(skip(self, token), fields(item_id = %item_id))]
    async fn remove_item(&self, token: &AccessToken, item_id: CartItemId) -> Result<CartSnapshot> {
        let request = self.request(
            Method::DELETE,
            &format!("cart/items/{item_id}"),
            Some(token.expose()),
        )?;
        self.send_json(request).await
    }

    #[instrument(skip_all)]
    async fn clear_cart(&self, token: &AccessToken) -> Result<CartSnapshot> {
        let request = self.request(Method::DELETE, "cart", Some(token.expose()))?;
        self.send_json(request).await
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogGateway for ApiClient {
    #[instrument(skip(self))]
    async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage> {
        let cache_key = CacheKey::Products(query.clone());

        if let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product listing");
            return Ok(page);
        }

        let request = self.request(Method::GET, "products", None)?.query(query);
        let page: ProductPage = self.send_json(request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(page.clone()))
            .await;

        Ok(page)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let cache_key = CacheKey::Product(id);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let request = self.request(Method::GET, &format!("products/{id}"), None)?;
        let product: Product = self.send_json(request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    #[instrument(skip(self), fields(category_id = %category_id))]
    async fn products_by_category(&self, category_id: CategoryId) -> Result<Vec<Product>> {
        let cache_key = CacheKey::Category(category_id);

        if let Some(CacheValue::Category(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category");
            return Ok(products);
        }

        let request = self.request(
            Method::GET,
            &format!("categories/{category_id}/products"),
            None,
        )?;
        let products: Vec<Product> = self.send_json(request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Category(products.clone()))
            .await;

        Ok(products)
    }

    #[instrument(skip(self))]
    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let request = self
            .request(Method::GET, "products/search", None)?
            .query(&[("q", query)]);
        self.send_json(request).await
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.cached_categories(CacheKey::Categories, "categories")
            .await
    }

    #[instrument(skip(self))]
    async fn top_level_categories(&self) -> Result<Vec<Category>> {
        self.cached_categories(CacheKey::TopLevelCategories, "categories/top-level")
            .await
    }

    #[instrument(skip(self), fields(category_id = %id))]
    async fn get_category(&self, id: CategoryId) -> Result<Category> {
        let cache_key = CacheKey::CategoryInfo(id);

        if let Some(CacheValue::CategoryInfo(category)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category details");
            return Ok(*category);
        }

        let request = self.request(Method::GET, &format!("categories/{id}"), None)?;
        let category: Category = self.send_json(request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::CategoryInfo(Box::new(category.clone())))
            .await;

        Ok(category)
    }

    #[instrument(skip(self))]
    async fn category_by_slug(&self, slug: &str) -> Result<Category> {
        let url = endpoint_with(&self.inner.base_url, "categories/slug", slug)?;
        let request = self.request_to(Method::GET, url, None);
        self.send_json(request).await
    }

    #[instrument(skip(self), fields(parent_id = %parent_id))]
    async fn subcategories(&self, parent_id: CategoryId) -> Result<Vec<Category>> {
        self.cached_categories(
            CacheKey::Subcategories(parent_id),
            &format!("categories/parent/{parent_id}"),
        )
        .await
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderGateway for ApiClient {
    #[instrument(skip_all, fields(payment_method = %request.payment_method))]
    async fn create_order(&self, token: &AccessToken, request: &OrderRequest) -> Result<Order> {
        let builder = self
            .request(Method::POST, "orders", Some(token.expose()))?
            .json(request);
        self.send_json(builder).await
    }

    #[instrument(skip_all)]
    async fn list_orders(&self, token: &AccessToken) -> Result<Vec<Order>> {
        let request = self.request(Method::GET, "orders", Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip(self, token), fields(order_id = %id))]
    async fn get_order(&self, token: &AccessToken, id: OrderId) -> Result<Order> {
        let request = self.request(Method::GET, &format!("orders/{id}"), Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip(self, token))]
    async fn get_order_by_number(&self, token: &AccessToken, order_number: &str) -> Result<Order> {
        let url = endpoint_with(&self.inner.base_url, "orders/number", order_number)?;
        let request = self.request_to(Method::GET, url, Some(token.expose()));
        self.send_json(request).await
    }

    #[instrument(skip(self, token), fields(order_id = %id))]
    async fn cancel_order(&self, token: &AccessToken, id: OrderId) -> Result<Order> {
        let request = self.request(
            Method::PUT,
            &format!("orders/{id}/cancel"),
            Some(token.expose()),
        )?;
        self.send_json(request).await
    }
}

// =============================================================================
// Reviews
// =============================================================================

#[async_trait]
impl ReviewGateway for ApiClient {
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn product_reviews(
        &self,
        token: Option<&AccessToken>,
        product_id: ProductId,
        sort: ReviewSort,
    ) -> Result<Vec<Review>> {
        let request = self
            .request(
                Method::GET,
                &format!("reviews/product/{product_id}"),
                token.map(AccessToken::expose),
            )?
            .query(&[("sortBy", sort.as_str())]);
        self.send_json(request).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn review_stats(&self, product_id: ProductId) -> Result<ReviewStats> {
        let request = self.request(
            Method::GET,
            &format!("reviews/product/{product_id}/stats"),
            None,
        )?;
        self.send_json(request).await
    }

    #[instrument(skip_all, fields(product_id = %review.product_id, rating = %review.rating))]
    async fn create_review(&self, token: &AccessToken, review: &NewReview) -> Result<Review> {
        let request = self
            .request(Method::POST, "reviews", Some(token.expose()))?
            .json(review);
        let created: Review = self.send_json(request).await?;
        self.invalidate_catalog();
        Ok(created)
    }

    #[instrument(skip(self, token, update), fields(review_id = %id))]
    async fn update_review(
        &self,
        token: &AccessToken,
        id: ReviewId,
        update: &ReviewUpdate,
    ) -> Result<Review> {
        let request = self
            .request(Method::PUT, &format!("reviews/{id}"), Some(token.expose()))?
            .json(update);
        let updated: Review = self.send_json(request).await?;
        self.invalidate_catalog();
        Ok(updated)
    }

    #[instrument(skip(self, token), fields(review_id = %id))]
    async fn delete_review(&self, token: &AccessToken, id: ReviewId) -> Result<()> {
        let request = self.request(Method::DELETE, &format!("reviews/{id}"), Some(token.expose()))?;
        self.send_empty(request).await?;
        self.invalidate_catalog();
        Ok(())
    }

    #[instrument(skip(self, token), fields(review_id = %id))]
    async fn vote_review(
        &self,
        token: &AccessToken,
        id: ReviewId,
        helpful: bool,
    ) -> Result<Review> {
        let request = self
            .request(
                Method::POST,
                &format!("reviews/{id}/vote"),
                Some(token.expose()),
            )?
            .query(&[("helpful", helpful)]);
        self.send_json(request).await
    }

    #[instrument(skip_all)]
    async fn my_reviews(&self, token: &AccessToken) -> Result<Vec<Review>> {
        let request = self.request(Method::GET, "reviews/my-reviews", Some(token.expose()))?;
        self.send_json(request).await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn can_review(
        &self,
        token: &AccessToken,
        product_id: ProductId,
    ) -> Result<ReviewEligibility> {
        let request = self.request(
            Method::GET,
            &format!("reviews/can-review/{product_id}"),
            Some(token.expose()),
        )?;
        self.send_json(request).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Join an endpoint path onto the base URL. The base always ends in `/`.
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| NetworkError::Url(e).into())
}

/// Join `path` onto the base URL and append `segment` as one
/// percent-encoded path segment, so `/`, `?` and `#` in it stay literal.
fn endpoint_with(base: &Url, path: &str, segment: &str) -> Result<Url> {
    let mut url = endpoint(base, path)?;
    url.path_segments_mut()
        .map_err(|()| NetworkError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Extract a human-readable message from an error response body.
///
/// Prefers the JSON `message` field, then `error`, then the raw body, then
/// the status's canonical reason.
fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body)
        && let Some(message) = parsed
            .message
            .or(parsed.error)
            .filter(|m| !m.trim().is_empty())
    {
        return message;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('{') {
        return truncate(trimmed, MESSAGE_BODY_LIMIT);
    }

    status
        .canonical_reason()
        .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
}

/// Recast a failed login/registration as a credential rejection.
///
/// Transport failures stay network errors so the caller can retry.
fn rejected(err: ClientError, fallback: &str) -> ClientError {
    match err {
        ClientError::Auth(AuthError::Unauthorized(message))
        | ClientError::Network(NetworkError::Status { message, .. }) => {
            let message = if message.trim().is_empty() {
                fallback.to_string()
            } else {
                message
            };
            AuthError::Rejected(message).into()
        }
        other => other,
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
