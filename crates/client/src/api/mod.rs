//! REST gateway to the shop service.
//!
//! # Architecture
//!
//! - The gateway is split into traits by concern ([`AuthGateway`],
//!   [`CartGateway`], [`CatalogGateway`], [`OrderGateway`],
//!   [`ReviewGateway`]) so each store depends only on the calls it makes
//! - [`ApiClient`] implements all of them over `reqwest`
//! - The shop service is the source of truth: cart responses replace local
//!   state, nothing is merged or recomputed
//! - Catalog reads are cached in memory via `moka`; nothing else is. A
//!   review write drops the cache, since it moves product ratings
//!
//! Session-scoped calls take the bearer token explicitly. The gateway never
//! holds session state of its own.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_client::api::{ApiClient, CartGateway};
//!
//! let client = ApiClient::new(&config)?;
//! let cart = client.get_cart(session.access_token()).await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::ApiClient;
pub use types::*;

use async_trait::async_trait;
use cartwheel_core::{CartItemId, CategoryId, Email, OrderId, ProductId, ReviewId};
use secrecy::SecretString;

use crate::cart::CartSnapshot;
use crate::error::Result;
use crate::token::{AccessToken, RefreshToken};

/// Authentication and account endpoints (`/auth/*`).
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse>;

    /// `POST /auth/register`.
    async fn register(&self, registration: &Registration) -> Result<AuthResponse>;

    /// `POST /auth/logout`.
    async fn logout(&self, token: &AccessToken) -> Result<()>;

    /// `POST /auth/refresh-token`, authenticated with the refresh token.
    async fn refresh_token(&self, token: &RefreshToken) -> Result<AuthResponse>;

    /// `GET /auth/me`.
    async fn current_user(&self, token: &AccessToken) -> Result<UserProfile>;

    /// `POST /auth/verify-email?token=`.
    async fn verify_email(&self, verification_token: &str) -> Result<()>;

    /// `POST /auth/resend-verification?email=`.
    async fn resend_verification(&self, email: &Email) -> Result<()>;

    /// `POST /auth/forgot-password?email=`.
    async fn forgot_password(&self, email: &Email) -> Result<()>;

    /// `POST /auth/reset-password?token=&newPassword=`.
    async fn reset_password(&self, reset_token: &str, new_password: &SecretString) -> Result<()>;
}

/// Cart endpoints (`/cart*`). Every mutation answers with the full cart.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// `GET /cart`.
    async fn get_cart(&self, token: &AccessToken) -> Result<CartSnapshot>;

    /// `GET /cart/count`.
    async fn cart_count(&self, token: &AccessToken) -> Result<u32>;

    /// `POST /cart/items`.
    async fn add_item(
        &self,
        token: &AccessToken,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot>;

    /// `PUT /cart/items/{itemId}?quantity=N`.
    async fn update_item(
        &self,
        token: &AccessToken,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartSnapshot>;

    /// `DELETE /cart/items/{itemId}`.
    async fn remove_item(&self, token: &AccessToken, item_id: CartItemId) -> Result<CartSnapshot>;

    /// `DELETE /cart`.
    async fn clear_cart(&self, token: &AccessToken) -> Result<CartSnapshot>;
}

/// Public catalog endpoints. No session required.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// `GET /products` with filters and paging.
    async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage>;

    /// `GET /products/{id}`.
    async fn get_product(&self, id: ProductId) -> Result<Product>;

    /// `GET /categories/{id}/products`.
    async fn products_by_category(&self, category_id: CategoryId) -> Result<Vec<Product>>;

    /// `GET /products/search?q=`.
    async fn search_products(&self, query: &str) -> Result<Vec<Product>>;

    /// `GET /categories`.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// `GET /categories/top-level`, children nested.
    async fn top_level_categories(&self) -> Result<Vec<Category>>;

    /// `GET /categories/{id}`.
    async fn get_category(&self, id: CategoryId) -> Result<Category>;

    /// `GET /categories/slug/{slug}`.
    async fn category_by_slug(&self, slug: &str) -> Result<Category>;

    /// `GET /categories/parent/{parentId}`.
    async fn subcategories(&self, parent_id: CategoryId) -> Result<Vec<Category>>;
}

/// Order endpoints (`/orders*`).
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// `POST /orders`.
    async fn create_order(&self, token: &AccessToken, request: &OrderRequest) -> Result<Order>;

    /// `GET /orders`.
    async fn list_orders(&self, token: &AccessToken) -> Result<Vec<Order>>;

    /// `GET /orders/{id}`.
    async fn get_order(&self, token: &AccessToken, id: OrderId) -> Result<Order>;

    /// `GET /orders/number/{orderNumber}`.
    async fn get_order_by_number(&self, token: &AccessToken, order_number: &str) -> Result<Order>;

    /// `PUT /orders/{id}/cancel`.
    async fn cancel_order(&self, token: &AccessToken, id: OrderId) -> Result<Order>;
}

/// Review endpoints (`/reviews*`).
#[async_trait]
pub trait ReviewGateway: Send + Sync {
    /// `GET /reviews/product/{productId}?sortBy=`. With a token the service
    /// fills in the caller's own votes.
    async fn product_reviews(
        &self,
        token: Option<&AccessToken>,
        product_id: ProductId,
        sort: ReviewSort,
    ) -> Result<Vec<Review>>;

    /// `GET /reviews/product/{productId}/stats`.
    async fn review_stats(&self, product_id: ProductId) -> Result<ReviewStats>;

    /// `POST /reviews`.
    async fn create_review(&self, token: &AccessToken, review: &NewReview) -> Result<Review>;

    /// `PUT /reviews/{reviewId}`.
    async fn update_review(
        &self,
        token: &AccessToken,
        id: ReviewId,
        update: &ReviewUpdate,
    ) -> Result<Review>;

    /// `DELETE /reviews/{reviewId}`.
    async fn delete_review(&self, token: &AccessToken, id: ReviewId) -> Result<()>;

    /// `POST /reviews/{reviewId}/vote?helpful=`. Repeating a vote withdraws
    /// it.
    async fn vote_review(&self, token: &AccessToken, id: ReviewId, helpful: bool)
    -> Result<Review>;

    /// `GET /reviews/my-reviews`.
    async fn my_reviews(&self, token: &AccessToken) -> Result<Vec<Review>>;

    /// `GET /reviews/can-review/{productId}`.
    async fn can_review(&self, token: &AccessToken, product_id: ProductId)
    -> Result<ReviewEligibility>;
}
