//! Request and response types for the shop service REST API.
//!
//! Field names follow the service's camelCase JSON. Where the service has
//! shipped more than one spelling of a field, the alternatives are accepted
//! as serde aliases.

use std::collections::BTreeMap;

use cartwheel_core::{
    Address, CategoryId, Email, OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentStatus,
    ProductId, ReviewId, UserId, UserRole,
};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ValidationError;

// =============================================================================
// Auth Types
// =============================================================================

/// Email/password pair for `POST /auth/login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    email: Email,
    password: SecretString,
}

impl Credentials {
    /// Validate and wrap login input.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a malformed email or an empty password.
    pub fn new(email: &str, password: impl Into<String>) -> Result<Self, ValidationError> {
        let email = Email::parse(email)?;
        let password = password.into();
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        Ok(Self {
            email,
            password: SecretString::from(password),
        })
    }

    /// The login email.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Body<'a> {
            email: &'a str,
            password: &'a str,
        }

        Body {
            email: self.email.as_str(),
            password: self.password.expose_secret(),
        }
        .serialize(serializer)
    }
}

/// New account details for `POST /auth/register`.
#[derive(Debug, Clone)]
pub struct Registration {
    first_name: String,
    last_name: String,
    email: Email,
    password: SecretString,
    phone: Option<String>,
}

impl Registration {
    /// Validate and wrap registration input.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for blank names, a malformed email or an
    /// empty password.
    pub fn new(
        first_name: &str,
        last_name: &str,
        email: &str,
        password: impl Into<String>,
        phone: Option<String>,
    ) -> Result<Self, ValidationError> {
        let first_name = non_blank(first_name, "first name")?;
        let last_name = non_blank(last_name, "last name")?;
        let email = Email::parse(email)?;
        let password = password.into();
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        Ok(Self {
            first_name,
            last_name,
            email,
            password: SecretString::from(password),
            phone: phone.filter(|p| !p.trim().is_empty()),
        })
    }

    /// The account email.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }
}

impl Serialize for Registration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            first_name: &'a str,
            last_name: &'a str,
            email: &'a str,
            password: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            phone: Option<&'a str>,
        }

        Body {
            first_name: &self.first_name,
            last_name: &self.last_name,
            email: self.email.as_str(),
            password: self.password.expose_secret(),
            phone: self.phone.as_deref(),
        }
        .serialize(serializer)
    }
}

/// Token pair and profile returned by login, registration and refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer token for session-scoped calls.
    #[serde(alias = "access_token")]
    pub access_token: String,
    /// Token used to obtain a new access token.
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    /// The signed-in user.
    pub user: UserProfile,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_email_verified: Option<bool>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl UserProfile {
    /// Get the user's full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => String::new(),
        }
    }

    /// Whether the account's email address has been verified.
    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.is_email_verified.unwrap_or(false)
    }
}

// =============================================================================
// Catalog Types
// =============================================================================

/// A product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub average_rating: Option<Decimal>,
    #[serde(default)]
    pub total_reviews: Option<u32>,
}

impl Product {
    /// Price the customer pays: the discount price when it undercuts the
    /// list price, otherwise the list price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        match self.discount_price {
            Some(discount) if discount < self.price => discount,
            _ => self.price,
        }
    }

    /// Whether at least one unit is in stock.
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.stock_quantity.is_some_and(|q| q > 0)
    }
}

/// Sort direction for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Filters and paging for `GET /products`. Unset fields are omitted from
/// the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_dir: Option<SortDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Decimal>,
}

/// One page of products.
///
/// The service answers either with `{products, totalPages, currentPage}` or
/// with a bare array; a bare array is a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ProductPageWire", rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total_pages: u32,
    pub current_page: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProductPageWire {
    Paged {
        products: Vec<Product>,
        #[serde(default, rename = "totalPages")]
        total_pages: Option<u32>,
        #[serde(default, rename = "currentPage")]
        current_page: Option<u32>,
    },
    Bare(Vec<Product>),
}

impl From<ProductPageWire> for ProductPage {
    fn from(wire: ProductPageWire) -> Self {
        match wire {
            ProductPageWire::Paged {
                products,
                total_pages,
                current_page,
            } => Self {
                products,
                total_pages: total_pages.unwrap_or(1),
                current_page: current_page.unwrap_or(1),
            },
            ProductPageWire::Bare(products) => Self {
                products,
                total_pages: 1,
                current_page: 1,
            },
        }
    }
}

/// A catalog category. Top-level listings nest their children under
/// `subCategories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i32>,
    #[serde(default)]
    pub sub_categories: Option<Vec<Category>>,
    #[serde(default)]
    pub product_count: Option<u32>,
}

impl Category {
    /// Child categories, empty when the service sent none.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        self.sub_categories.as_deref().unwrap_or_default()
    }

    /// Whether this category sits at the top of the tree.
    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

// =============================================================================
// Review Types
// =============================================================================

/// A star rating from 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest rating.
    pub const MIN: u8 = 1;
    /// Highest rating.
    pub const MAX: u8 = 5;

    /// Validate a star count.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::RatingOutOfRange` outside 1..=5.
    pub fn new(stars: i64) -> Result<Self, ValidationError> {
        u8::try_from(stars)
            .ok()
            .filter(|s| (Self::MIN..=Self::MAX).contains(s))
            .map(Self)
            .ok_or(ValidationError::RatingOutOfRange(stars))
    }

    /// Number of stars.
    #[must_use]
    pub const fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ValidationError;

    fn try_from(stars: i64) -> Result<Self, Self::Error> {
        Self::new(stars)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Order of a product's review listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSort {
    #[default]
    Newest,
    Oldest,
}

impl ReviewSort {
    /// Value of the `sortBy` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
        }
    }
}

/// A customer review of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub rating: Rating,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub helpful_count: Option<u32>,
    #[serde(default)]
    pub unhelpful_count: Option<u32>,
    /// The signed-in user's vote: `true` helpful, `false` unhelpful.
    #[serde(default)]
    pub current_user_vote: Option<bool>,
}

/// Aggregate ratings for one product.
///
/// The service formats `averageRating` as a one-decimal string; both that
/// and a bare number are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    #[serde(default)]
    pub average_rating: Decimal,
    #[serde(default)]
    pub total_reviews: u64,
    /// Review count per star value.
    #[serde(default)]
    pub rating_distribution: BTreeMap<u8, u64>,
}

impl ReviewStats {
    /// Reviews that gave exactly `stars`.
    #[must_use]
    pub fn count_for(&self, stars: u8) -> u64 {
        self.rating_distribution.get(&stars).copied().unwrap_or(0)
    }
}

/// Whether the signed-in user may review a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEligibility {
    pub can_review: bool,
    #[serde(default)]
    pub has_reviewed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /reviews`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub product_id: ProductId,
    pub rating: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl NewReview {
    /// Validate review input. A blank comment is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::RatingOutOfRange` outside 1..=5.
    pub fn new(
        product_id: ProductId,
        stars: i64,
        comment: Option<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            product_id,
            rating: Rating::new(stars)?,
            comment: trimmed(comment),
        })
    }
}

/// Body of `PUT /reviews/{id}`. Unset fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ReviewUpdate {
    /// Validate an edit.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::RatingOutOfRange` for a bad rating, or
    /// `ValidationError::EmptyReviewUpdate` when nothing would change.
    pub fn new(stars: Option<i64>, comment: Option<String>) -> Result<Self, ValidationError> {
        let rating = stars.map(Rating::new).transpose()?;
        let comment = trimmed(comment);
        if rating.is_none() && comment.is_none() {
            return Err(ValidationError::EmptyReviewUpdate);
        }
        Ok(Self { rating, comment })
    }
}

// =============================================================================
// Order Types
// =============================================================================

/// Checkout input for `POST /orders`. The server builds the order lines
/// from the session's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderRequest {
    /// Check that both addresses are complete.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Address` naming the first blank field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.shipping_address.validate()?;
        self.billing_address.validate()?;
        Ok(())
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    #[serde(default)]
    pub order_items: Vec<OrderLine>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub shipping_amount: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A line on a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: OrderItemId,
    pub product_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
}

// =============================================================================
// Helpers
// =============================================================================

fn non_blank(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(trimmed.to_owned())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
