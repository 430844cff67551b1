//! Application state.
//!
//! [`AppState`] is the one object a front end owns: the gateway, the session
//! store and the cart mirror. It sequences the cross-store rules the stores
//! cannot enforce on their own:
//!
//! - a new session fetches its cart
//! - ending a session resets the cart
//! - a session-scoped call answered with 401/403, or made with an expired
//!   token, signs the user out locally before the error is returned

use cartwheel_core::{CartItemId, CategoryId, OrderId, ProductId, ReviewId};
use tracing::{info, instrument, warn};

use crate::api::{
    AuthGateway, CartGateway, CatalogGateway, Category, Credentials, NewReview, Order,
    OrderGateway, OrderRequest, Product, ProductPage, ProductQuery, Registration, Review,
    ReviewEligibility, ReviewGateway, ReviewSort, ReviewStats, ReviewUpdate, UserProfile,
};
use crate::cart::{CartSnapshot, CartStore};
use crate::error::{AuthError, Result, StorageError, ValidationError};
use crate::session::{Session, SessionState, SessionStore, authorize};
use crate::storage::KeyValueStore;

/// Gateway, session and cart, owned together.
#[derive(Debug)]
pub struct AppState<G, S> {
    gateway: G,
    session: SessionStore<S>,
    cart: CartStore,
}

impl<G, S: KeyValueStore> AppState<G, S> {
    /// Build the state, restoring any persisted session from `storage`.
    ///
    /// The cart starts empty; call [`Self::fetch_cart`] to load it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted session cannot be read.
    pub fn new(gateway: G, storage: S) -> std::result::Result<Self, StorageError> {
        Ok(Self {
            gateway,
            session: SessionStore::restore(storage)?,
            cart: CartStore::new(),
        })
    }

    /// The gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// The session store.
    #[must_use]
    pub const fn session(&self) -> &SessionStore<S> {
        &self.session
    }

    /// The current session, if signed in.
    #[must_use]
    pub const fn current_session(&self) -> Option<&Session> {
        self.session.current()
    }

    /// Anonymous or Authenticated.
    #[must_use]
    pub const fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// The last cart snapshot received from the server.
    #[must_use]
    pub const fn cart(&self) -> &CartSnapshot {
        self.cart.snapshot()
    }

    /// Sign out locally: drop credentials and forget the cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted mirror could not be removed.
    /// Memory is cleared regardless.
    pub fn clear_credentials(&mut self) -> std::result::Result<(), StorageError> {
        self.cart.reset();
        self.session.clear_credentials()
    }

    /// Pass `result` through, signing out first if it says the session is
    /// no longer usable.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.requires_sign_out()
            && self.session.is_authenticated()
        {
            warn!(error = %e, "Session rejected, signing out");
            if let Err(storage) = self.clear_credentials() {
                warn!(error = %storage, "Could not clear stored credentials");
            }
        }
        result
    }
}

// =============================================================================
// Session
// =============================================================================

impl<G, S> AppState<G, S>
where
    G: AuthGateway + CartGateway,
    S: KeyValueStore,
{
    /// Sign in, then load the new session's cart.
    ///
    /// A failed cart load is logged and does not undo the sign-in, unless
    /// the service rejects the new token.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::login`]. Also returns the auth error that signed
    /// the fresh session out.
    #[instrument(skip_all, fields(email = %credentials.email()))]
    pub async fn login(&mut self, credentials: &Credentials) -> Result<&Session> {
        self.session.login(&self.gateway, credentials).await?;
        self.load_cart_after_sign_in().await?;
        self.session
            .current()
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Create an account, sign in with it, then load its cart.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::register`].
    #[instrument(skip_all, fields(email = %registration.email()))]
    pub async fn register(&mut self, registration: &Registration) -> Result<&Session> {
        self.session.register(&self.gateway, registration).await?;
        self.load_cart_after_sign_in().await?;
        self.session
            .current()
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Sign out and forget the cart. The state is Anonymous afterwards even
    /// when this returns an error.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::logout`].
    #[instrument(skip_all)]
    pub async fn logout(&mut self) -> Result<()> {
        let result = self.session.logout(&self.gateway).await;
        self.cart.reset();
        result
    }

    async fn load_cart_after_sign_in(&mut self) -> Result<()> {
        self.cart.reset();
        let result = self
            .cart
            .fetch_cart(&self.gateway, self.session.current())
            .await
            .map(drop);
        match self.settle(result) {
            Err(e) if e.requires_sign_out() => Err(e),
            Err(e) => {
                warn!(error = %e, "Signed in but could not load cart");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

impl<G, S> AppState<G, S>
where
    G: AuthGateway,
    S: KeyValueStore,
{
    /// Exchange the refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::refresh`]. A rejected refresh token signs out.
    pub async fn refresh_session(&mut self) -> Result<&Session> {
        let result = self.session.refresh(&self.gateway).await.map(drop);
        self.settle(result)?;
        self.session
            .current()
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Reload the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::refresh_profile`].
    pub async fn refresh_profile(&mut self) -> Result<&UserProfile> {
        let result = self.session.refresh_profile(&self.gateway).await.map(drop);
        self.settle(result)?;
        self.session
            .current()
            .map(Session::user)
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Confirm an email address.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::verify_email`].
    pub async fn verify_email(&mut self, verification_token: &str) -> Result<()> {
        self.session
            .verify_email(&self.gateway, verification_token)
            .await
    }

    /// Request another verification mail.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::resend_verification`].
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        self.session.resend_verification(&self.gateway, email).await
    }

    /// Start a password reset.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::forgot_password`].
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        self.session.forgot_password(&self.gateway, email).await
    }

    /// Finish a password reset.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::reset_password`].
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: impl Into<String>,
    ) -> Result<()> {
        self.session
            .reset_password(&self.gateway, reset_token, new_password)
            .await
    }
}

// =============================================================================
// Cart
// =============================================================================

impl<G, S> AppState<G, S>
where
    G: CartGateway,
    S: KeyValueStore,
{
    /// Replace the cart with the server's.
    ///
    /// # Errors
    ///
    /// See [`CartStore::fetch_cart`].
    pub async fn fetch_cart(&mut self) -> Result<&CartSnapshot> {
        let result = self
            .cart
            .fetch_cart(&self.gateway, self.session.current())
            .await
            .map(drop);
        self.settle(result)?;
        Ok(self.cart.snapshot())
    }

    /// Add units of a product to the cart.
    ///
    /// # Errors
    ///
    /// See [`CartStore::add_item`].
    pub async fn add_item(&mut self, product_id: ProductId, quantity: i64) -> Result<&CartSnapshot> {
        let result = self
            .cart
            .add_item(&self.gateway, self.session.current(), product_id, quantity)
            .await
            .map(drop);
        self.settle(result)?;
        Ok(self.cart.snapshot())
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// See [`CartStore::update_item`].
    pub async fn update_item(
        &mut self,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<&CartSnapshot> {
        let result = self
            .cart
            .update_item(&self.gateway, self.session.current(), item_id, quantity)
            .await
            .map(drop);
        self.settle(result)?;
        Ok(self.cart.snapshot())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// See [`CartStore::remove_item`].
    pub async fn remove_item(&mut self, item_id: CartItemId) -> Result<&CartSnapshot> {
        let result = self
            .cart
            .remove_item(&self.gateway, self.session.current(), item_id)
            .await
            .map(drop);
        self.settle(result)?;
        Ok(self.cart.snapshot())
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// See [`CartStore::clear_cart`].
    pub async fn clear_cart(&mut self) -> Result<&CartSnapshot> {
        let result = self
            .cart
            .clear_cart(&self.gateway, self.session.current())
            .await
            .map(drop);
        self.settle(result)?;
        Ok(self.cart.snapshot())
    }

    /// Units in the server cart, without touching the snapshot.
    ///
    /// # Errors
    ///
    /// See [`CartStore::item_count`].
    pub async fn cart_count(&mut self) -> Result<u32> {
        let result = self
            .cart
            .item_count(&self.gateway, self.session.current())
            .await;
        self.settle(result)
    }
}

// =============================================================================
// Catalog
// =============================================================================

impl<G, S> AppState<G, S>
where
    G: CatalogGateway,
    S: KeyValueStore,
{
    /// One page of the catalog.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage> {
        self.gateway.list_products(query).await
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        self.gateway.get_product(id).await
    }

    /// Every product in a category.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn products_by_category(&self, category_id: CategoryId) -> Result<Vec<Product>> {
        self.gateway.products_by_category(category_id).await
    }

    /// Full-text product search.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for a blank query, or the
    /// gateway's error.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyField("search query").into());
        }
        self.gateway.search_products(query).await
    }

    /// Every category.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.gateway.list_categories().await
    }

    /// Top-level categories with their children nested.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn top_level_categories(&self) -> Result<Vec<Category>> {
        self.gateway.top_level_categories().await
    }

    /// A single category.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn category(&self, id: CategoryId) -> Result<Category> {
        self.gateway.get_category(id).await
    }

    /// A category by its URL slug.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for a blank slug, or the
    /// gateway's error.
    pub async fn category_by_slug(&self, slug: &str) -> Result<Category> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(ValidationError::EmptyField("category slug").into());
        }
        self.gateway.category_by_slug(slug).await
    }

    /// Direct children of a category.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn subcategories(&self, parent_id: CategoryId) -> Result<Vec<Category>> {
        self.gateway.subcategories(parent_id).await
    }
}

// =============================================================================
// Orders
// =============================================================================

impl<G, S> AppState<G, S>
where
    G: OrderGateway + CartGateway,
    S: KeyValueStore,
{
    /// Check out the current cart.
    ///
    /// The service builds the order from the server cart and empties it, so
    /// the cart is reloaded afterwards. A failed reload is logged and does
    /// not fail the order.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Address` for an incomplete address, an auth
    /// error without a usable session, or the gateway's error.
    #[instrument(skip_all, fields(payment_method = %request.payment_method))]
    pub async fn place_order(&mut self, request: &OrderRequest) -> Result<Order> {
        request.validate()?;
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .create_order(session.access_token(), request)
                    .await
            }
            Err(e) => Err(e),
        };
        let order = self.settle(result)?;
        info!(order_number = %order.order_number, "Order placed");

        if let Err(e) = self.fetch_cart().await {
            warn!(error = %e, "Order placed but could not reload cart");
        }
        Ok(order)
    }

    /// The signed-in user's orders.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn orders(&mut self) -> Result<Vec<Order>> {
        let result = match authorize(self.session.current()) {
            Ok(session) => self.gateway.list_orders(session.access_token()).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// One order by id.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn order(&mut self, id: OrderId) -> Result<Order> {
        let result = match authorize(self.session.current()) {
            Ok(session) => self.gateway.get_order(session.access_token(), id).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// One order by its human-facing number.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for a blank number, an auth
    /// error without a usable session, or the gateway's error.
    pub async fn order_by_number(&mut self, order_number: &str) -> Result<Order> {
        let order_number = order_number.trim();
        if order_number.is_empty() {
            return Err(ValidationError::EmptyField("order number").into());
        }
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .get_order_by_number(session.access_token(), order_number)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Cancel an order that has not shipped.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn cancel_order(&mut self, id: OrderId) -> Result<Order> {
        let result = match authorize(self.session.current()) {
            Ok(session) => self.gateway.cancel_order(session.access_token(), id).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }
}

// =============================================================================
// Reviews
// =============================================================================

impl<G, S> AppState<G, S>
where
    G: ReviewGateway,
    S: KeyValueStore,
{
    /// A product's reviews. Sent with the session's token when it is
    /// usable, so the caller's votes come back filled in; anonymous
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn product_reviews(
        &mut self,
        product_id: ProductId,
        sort: ReviewSort,
    ) -> Result<Vec<Review>> {
        let token = authorize(self.session.current())
            .ok()
            .map(Session::access_token);
        let result = self.gateway.product_reviews(token, product_id, sort).await;
        self.settle(result)
    }

    /// Rating summary for a product.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn review_stats(&self, product_id: ProductId) -> Result<ReviewStats> {
        self.gateway.review_stats(product_id).await
    }

    /// Post a review.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    #[instrument(skip_all, fields(product_id = %review.product_id))]
    pub async fn create_review(&mut self, review: &NewReview) -> Result<Review> {
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .create_review(session.access_token(), review)
                    .await
            }
            Err(e) => Err(e),
        };
        let review = self.settle(result)?;
        info!(review_id = %review.id, "Review posted");
        Ok(review)
    }

    /// Edit one of the user's reviews.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn update_review(&mut self, id: ReviewId, update: &ReviewUpdate) -> Result<Review> {
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .update_review(session.access_token(), id, update)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Delete one of the user's reviews.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn delete_review(&mut self, id: ReviewId) -> Result<()> {
        let result = match authorize(self.session.current()) {
            Ok(session) => self.gateway.delete_review(session.access_token(), id).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Mark someone else's review helpful or unhelpful. Repeating the same
    /// vote withdraws it.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn vote_review(&mut self, id: ReviewId, helpful: bool) -> Result<Review> {
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .vote_review(session.access_token(), id, helpful)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Reviews written by the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn my_reviews(&mut self) -> Result<Vec<Review>> {
        let result = match authorize(self.session.current()) {
            Ok(session) => self.gateway.my_reviews(session.access_token()).await,
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Whether the signed-in user may still review a product.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    pub async fn can_review(&mut self, product_id: ProductId) -> Result<ReviewEligibility> {
        let result = match authorize(self.session.current()) {
            Ok(session) => {
                self.gateway
                    .can_review(session.access_token(), product_id)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use cartwheel_core::{Address, Email, OrderStatus, PaymentMethod, UserId, UserRole};
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::*;
    use crate::api::{AuthResponse, Rating};
    use crate::error::{ClientError, NetworkError};
    use crate::session::keys;
    use crate::storage::MemoryStore;
    use crate::token::{AccessToken, RefreshToken};

    /// In-memory shop answering every gateway trait.
    #[derive(Default)]
    struct FakeShop {
        access_token: Mutex<String>,
        cart: Mutex<CartSnapshot>,
        reject_tokens: AtomicBool,
        cart_fails: AtomicBool,
        logout_fails: AtomicBool,
        calls: AtomicUsize,
        review_tokens: Mutex<Vec<Option<String>>>,
    }

    impl FakeShop {
        fn with_cart(cart: &str) -> Self {
            let shop = Self::default();
            *shop.cart.lock().unwrap() = serde_json::from_str(cart).unwrap();
            *shop.access_token.lock().unwrap() = "access".to_string();
            shop
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_tokens.load(Ordering::SeqCst) {
                return Err(AuthError::Unauthorized("Invalid token".to_string()).into());
            }
            Ok(())
        }

        fn cart(&self) -> Result<CartSnapshot> {
            self.check()?;
            if self.cart_fails.load(Ordering::SeqCst) {
                return Err(NetworkError::Status {
                    status: 500,
                    message: "Failed to fetch cart".to_string(),
                }
                .into());
            }
            Ok(self.cart.lock().unwrap().clone())
        }
    }

    fn user() -> UserProfile {
        UserProfile {
            id: UserId::new(7),
            email: "shopper@example.com".to_string(),
            first_name: Some("Pat".to_string()),
            last_name: None,
            phone: None,
            role: UserRole::Customer,
            is_email_verified: Some(true),
            profile_image_url: None,
            created_at: None,
        }
    }

    #[async_trait]
    impl AuthGateway for FakeShop {
        async fn login(&self, _: &Credentials) -> Result<AuthResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AuthResponse {
                access_token: self.access_token.lock().unwrap().clone(),
                refresh_token: Some("refresh".to_string()),
                user: user(),
            })
        }

        async fn register(&self, _: &Registration) -> Result<AuthResponse> {
            self.login(&Credentials::new("shopper@example.com", "pw").unwrap())
                .await
        }

        async fn logout(&self, _: &AccessToken) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.logout_fails.load(Ordering::SeqCst) {
                return Err(NetworkError::Status {
                    status: 502,
                    message: "Bad Gateway".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn refresh_token(&self, _: &RefreshToken) -> Result<AuthResponse> {
            self.check()?;
            self.login(&Credentials::new("shopper@example.com", "pw").unwrap())
                .await
        }

        async fn current_user(&self, _: &AccessToken) -> Result<UserProfile> {
            self.check()?;
            Ok(user())
        }

        async fn verify_email(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn resend_verification(&self, _: &Email) -> Result<()> {
            Ok(())
        }

        async fn forgot_password(&self, _: &Email) -> Result<()> {
            Ok(())
        }

        async fn reset_password(&self, _: &str, _: &SecretString) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CartGateway for FakeShop {
        async fn get_cart(&self, _: &AccessToken) -> Result<CartSnapshot> {
            self.cart()
        }

        async fn cart_count(&self, _: &AccessToken) -> Result<u32> {
            self.cart().map(|c| c.total_items)
        }

        async fn add_item(&self, _: &AccessToken, _: ProductId, _: u32) -> Result<CartSnapshot> {
            self.cart()
        }

        async fn update_item(
            &self,
            _: &AccessToken,
            _: CartItemId,
            _: u32,
        ) -> Result<CartSnapshot> {
            self.cart()
        }

        async fn remove_item(&self, _: &AccessToken, _: CartItemId) -> Result<CartSnapshot> {
            self.cart()
        }

        async fn clear_cart(&self, _: &AccessToken) -> Result<CartSnapshot> {
            self.check()?;
            let mut cart = self.cart.lock().unwrap();
            *cart = CartSnapshot::default();
            Ok(cart.clone())
        }
    }

    #[async_trait]
    impl CatalogGateway for FakeShop {
        async fn list_products(&self, _: &ProductQuery) -> Result<ProductPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProductPage {
                products: vec![],
                total_pages: 1,
                current_page: 1,
            })
        }

        async fn get_product(&self, id: ProductId) -> Result<Product> {
            Err(NetworkError::Status {
                status: 404,
                message: format!("Product not found with id: {id}"),
            }
            .into())
        }

        async fn products_by_category(&self, _: CategoryId) -> Result<Vec<Product>> {
            Ok(vec![])
        }

        async fn search_products(&self, _: &str) -> Result<Vec<Product>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn list_categories(&self) -> Result<Vec<Category>> {
            Ok(vec![])
        }

        async fn top_level_categories(&self) -> Result<Vec<Category>> {
            Ok(vec![])
        }

        async fn get_category(&self, id: CategoryId) -> Result<Category> {
            Err(NetworkError::Status {
                status: 404,
                message: format!("Category not found with id: {id}"),
            }
            .into())
        }

        async fn category_by_slug(&self, _: &str) -> Result<Category> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.get_category(CategoryId::new(0)).await
        }

        async fn subcategories(&self, _: CategoryId) -> Result<Vec<Category>> {
            Ok(vec![])
        }
    }

    fn review(id: i64, product_id: ProductId, rating: Rating) -> Review {
        Review {
            id: ReviewId::new(id),
            product_id,
            product_name: None,
            user_id: Some(UserId::new(7)),
            user_name: Some("Pat".to_string()),
            rating,
            comment: None,
            created_at: None,
            helpful_count: Some(0),
            unhelpful_count: Some(0),
            current_user_vote: None,
        }
    }

    #[async_trait]
    impl ReviewGateway for FakeShop {
        async fn product_reviews(
            &self,
            token: Option<&AccessToken>,
            _: ProductId,
            _: ReviewSort,
        ) -> Result<Vec<Review>> {
            self.review_tokens
                .lock()
                .unwrap()
                .push(token.map(|t| t.expose().to_string()));
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn review_stats(&self, _: ProductId) -> Result<ReviewStats> {
            Ok(ReviewStats::default())
        }

        async fn create_review(&self, _: &AccessToken, new: &NewReview) -> Result<Review> {
            self.check()?;
            Ok(review(1, new.product_id, new.rating))
        }

        async fn update_review(
            &self,
            _: &AccessToken,
            id: ReviewId,
            update: &ReviewUpdate,
        ) -> Result<Review> {
            self.check()?;
            let rating = update.rating.unwrap_or(Rating::new(3).unwrap());
            Ok(review(id.as_i64(), ProductId::new(42), rating))
        }

        async fn delete_review(&self, _: &AccessToken, _: ReviewId) -> Result<()> {
            self.check()
        }

        async fn vote_review(&self, _: &AccessToken, id: ReviewId, _: bool) -> Result<Review> {
            self.check()?;
            Ok(review(id.as_i64(), ProductId::new(42), Rating::new(4).unwrap()))
        }

        async fn my_reviews(&self, _: &AccessToken) -> Result<Vec<Review>> {
            self.check()?;
            Ok(vec![])
        }

        async fn can_review(&self, _: &AccessToken, _: ProductId) -> Result<ReviewEligibility> {
            self.check()?;
            Ok(ReviewEligibility {
                can_review: true,
                has_reviewed: false,
                message: None,
            })
        }
    }

    #[async_trait]
    impl OrderGateway for FakeShop {
        async fn create_order(&self, _: &AccessToken, request: &OrderRequest) -> Result<Order> {
            let cart = self.cart()?;
            *self.cart.lock().unwrap() = CartSnapshot::default();
            Ok(Order {
                id: OrderId::new(1),
                order_number: "ORD-1".to_string(),
                order_items: vec![],
                total_amount: cart.total_amount,
                subtotal: None,
                tax_amount: None,
                shipping_amount: None,
                discount_amount: None,
                shipping_address: Some(request.shipping_address.clone()),
                billing_address: Some(request.billing_address.clone()),
                status: OrderStatus::Pending,
                payment_method: Some(request.payment_method),
                payment_status: None,
                tracking_number: None,
                notes: None,
                created_at: None,
            })
        }

        async fn list_orders(&self, _: &AccessToken) -> Result<Vec<Order>> {
            self.check()?;
            Ok(vec![])
        }

        async fn get_order(&self, _: &AccessToken, _: OrderId) -> Result<Order> {
            Err(NetworkError::Status {
                status: 404,
                message: "Order not found".to_string(),
            }
            .into())
        }

        async fn get_order_by_number(&self, token: &AccessToken, _: &str) -> Result<Order> {
            self.get_order(token, OrderId::new(0)).await
        }

        async fn cancel_order(&self, token: &AccessToken, id: OrderId) -> Result<Order> {
            self.get_order(token, id).await
        }
    }

    const ONE_MUG: &str = r#"{"cartItems":[{"id":1,"productId":42,"quantity":1,"unitPrice":9.99,"stockAvailable":5}],"totalItems":1,"totalAmount":9.99}"#;

    fn address() -> Address {
        Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            country: "US".to_string(),
            phone: None,
            recipient_name: "Pat Doe".to_string(),
        }
    }

    fn expired_jwt() -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"shopper@example.com","exp":1000}"#);
        format!("{header}.{payload}.sig")
    }

    async fn signed_in(shop: FakeShop) -> AppState<FakeShop, MemoryStore> {
        let mut state = AppState::new(shop, MemoryStore::new()).unwrap();
        let credentials = Credentials::new("shopper@example.com", "hunter2").unwrap();
        state.login(&credentials).await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_login_loads_cart() {
        let state = signed_in(FakeShop::with_cart(ONE_MUG)).await;

        assert_eq!(state.session_state(), SessionState::Authenticated);
        assert_eq!(state.cart().total_items, 1);
        assert_eq!(state.cart().total_amount, Decimal::new(999, 2));
    }

    #[tokio::test]
    async fn test_login_survives_cart_failure() {
        let shop = FakeShop::with_cart(ONE_MUG);
        shop.cart_fails.store(true, Ordering::SeqCst);
        let state = signed_in(shop).await;

        assert_eq!(state.session_state(), SessionState::Authenticated);
        assert!(state.cart().is_empty());
    }

    #[tokio::test]
    async fn test_login_rejected_on_cart_load_signs_out() {
        let shop = FakeShop::with_cart(ONE_MUG);
        shop.reject_tokens.store(true, Ordering::SeqCst);
        let mut state = AppState::new(shop, MemoryStore::new()).unwrap();
        let credentials = Credentials::new("shopper@example.com", "hunter2").unwrap();

        let err = state.login(&credentials).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::Unauthorized(_))));
        assert_eq!(state.session_state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_unauthorized_forces_sign_out() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;
        state.gateway().reject_tokens.store(true, Ordering::SeqCst);

        let err = state.fetch_cart().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::Unauthorized(_))));
        assert_eq!(state.session_state(), SessionState::Anonymous);
        assert!(state.cart().is_empty());
        assert_eq!(state.session().storage().get(keys::ACCESS_TOKEN).unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_token_signs_out_without_request() {
        let mut storage = MemoryStore::new();
        storage.set(keys::ACCESS_TOKEN, &expired_jwt()).unwrap();
        storage
            .set(keys::USER, &serde_json::to_string(&user()).unwrap())
            .unwrap();
        let mut state = AppState::new(FakeShop::with_cart(ONE_MUG), storage).unwrap();
        assert_eq!(state.session_state(), SessionState::Authenticated);

        let err = state.orders().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::SessionExpired)));
        assert_eq!(state.gateway().calls(), 0);
        assert_eq!(state.session_state(), SessionState::Anonymous);
        assert!(state.session().storage().is_empty());
    }

    #[tokio::test]
    async fn test_update_with_expired_token_signs_out() {
        let mut storage = MemoryStore::new();
        storage.set(keys::ACCESS_TOKEN, &expired_jwt()).unwrap();
        storage
            .set(keys::USER, &serde_json::to_string(&user()).unwrap())
            .unwrap();
        let mut state = AppState::new(FakeShop::with_cart(ONE_MUG), storage).unwrap();

        let err = state.update_item(CartItemId::new(1), 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::SessionExpired)));
        assert_eq!(state.gateway().calls(), 0);
        assert_eq!(state.session_state(), SessionState::Anonymous);

        let err = state.update_item(CartItemId::new(1), 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_logout_resets_cart_even_when_notify_fails() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;
        state.gateway().logout_fails.store(true, Ordering::SeqCst);

        let err = state.logout().await.unwrap_err();
        assert!(matches!(err, ClientError::Network(NetworkError::Status { status: 502, .. })));
        assert_eq!(state.session_state(), SessionState::Anonymous);
        assert!(state.cart().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_validates_then_reloads_cart() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;

        let mut request = OrderRequest {
            shipping_address: address(),
            billing_address: address(),
            payment_method: PaymentMethod::CreditCard,
            notes: None,
        };
        request.billing_address.city = "  ".to_string();
        let calls = state.gateway().calls();
        let err = state.place_order(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(ValidationError::Address(_))));
        assert_eq!(state.gateway().calls(), calls);
        assert_eq!(state.cart().total_items, 1);

        request.billing_address = address();
        let order = state.place_order(&request).await.unwrap();
        assert_eq!(order.total_amount, Decimal::new(999, 2));
        assert!(state.cart().is_empty());
    }

    #[tokio::test]
    async fn test_blank_search_rejected_locally() {
        let state = AppState::new(FakeShop::default(), MemoryStore::new()).unwrap();

        let err = state.search_products("   ").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyField("search query"))
        ));
        assert_eq!(state.gateway().calls(), 0);
        assert!(state.list_products(&ProductQuery::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_catalog_errors_do_not_sign_out() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;

        assert!(state.product(ProductId::new(99)).await.is_err());
        assert!(state.order(OrderId::new(99)).await.is_err());
        assert_eq!(state.session_state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_review_actions_require_session() {
        let mut state = AppState::new(FakeShop::default(), MemoryStore::new()).unwrap();
        let new = NewReview::new(ProductId::new(42), 5, None).unwrap();

        let err = state.create_review(&new).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
        let err = state.vote_review(ReviewId::new(1), true).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
        let err = state.can_review(ProductId::new(42)).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
        assert_eq!(state.gateway().calls(), 0);

        assert!(state.review_stats(ProductId::new(42)).await.is_ok());
    }

    #[tokio::test]
    async fn test_review_actions_run_with_session() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;

        let new = NewReview::new(ProductId::new(42), 5, Some("Great mug".to_string())).unwrap();
        let posted = state.create_review(&new).await.unwrap();
        assert_eq!(posted.product_id, ProductId::new(42));
        assert_eq!(posted.rating.stars(), 5);

        let update = ReviewUpdate::new(Some(2), None).unwrap();
        let edited = state.update_review(posted.id, &update).await.unwrap();
        assert_eq!(edited.rating.stars(), 2);

        assert!(state.can_review(ProductId::new(42)).await.unwrap().can_review);
        assert!(state.my_reviews().await.unwrap().is_empty());
        state.delete_review(posted.id).await.unwrap();
        assert_eq!(state.session_state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_review_rejected_token_signs_out() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;
        state.gateway().reject_tokens.store(true, Ordering::SeqCst);

        let err = state.vote_review(ReviewId::new(3), false).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::Unauthorized(_))));
        assert_eq!(state.session_state(), SessionState::Anonymous);
        assert!(state.cart().is_empty());
    }

    #[tokio::test]
    async fn test_product_reviews_send_token_only_when_usable() {
        let mut state = signed_in(FakeShop::with_cart(ONE_MUG)).await;
        state
            .product_reviews(ProductId::new(42), ReviewSort::Newest)
            .await
            .unwrap();

        let mut storage = MemoryStore::new();
        storage.set(keys::ACCESS_TOKEN, &expired_jwt()).unwrap();
        storage
            .set(keys::USER, &serde_json::to_string(&user()).unwrap())
            .unwrap();
        let mut expired = AppState::new(FakeShop::default(), storage).unwrap();
        expired
            .product_reviews(ProductId::new(42), ReviewSort::Oldest)
            .await
            .unwrap();

        assert_eq!(
            *state.gateway().review_tokens.lock().unwrap(),
            vec![Some("access".to_string())]
        );
        assert_eq!(*expired.gateway().review_tokens.lock().unwrap(), vec![None]);
        assert_eq!(expired.session_state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_blank_category_slug_rejected_locally() {
        let state = AppState::new(FakeShop::default(), MemoryStore::new()).unwrap();

        let err = state.category_by_slug("  ").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyField("category slug"))
        ));
        assert_eq!(state.gateway().calls(), 0);

        let err = state.category(CategoryId::new(9)).await.unwrap_err();
        assert_eq!(err.user_message(), "Category not found with id: 9");
    }
}
