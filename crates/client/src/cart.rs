//! Cart mirror.
//!
//! The shop service owns the cart. Every action here is one round trip whose
//! response replaces the local [`CartSnapshot`] wholesale; totals are never
//! recomputed or patched client-side. A failed action leaves the last good
//! snapshot exactly as it was.
//!
//! Quantity checks that the server would reject anyway are done locally so
//! they never cost a request.

use cartwheel_core::{CartId, CartItemId, ProductId, line_total};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};

use crate::api::CartGateway;
use crate::error::{Result, ValidationError};
use crate::session::{Session, authorize};

/// Stock ceiling assumed for a line whose stock the service did not report.
pub const DEFAULT_STOCK_LIMIT: u32 = 99;

// =============================================================================
// Snapshot Types
// =============================================================================

/// One line of the server's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, alias = "stock", skip_serializing_if = "Option::is_none")]
    pub stock_available: Option<u32>,
}

impl CartLine {
    /// Highest quantity this line may be set to.
    #[must_use]
    pub fn stock_limit(&self) -> u32 {
        self.stock_available.unwrap_or(DEFAULT_STOCK_LIMIT)
    }

    /// `quantity * unitPrice`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }
}

/// The server's cart as of the last successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CartId>,
    #[serde(
        rename = "cartItems",
        default,
        deserialize_with = "null_as_default"
    )]
    pub items: Vec<CartLine>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_items: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_amount: Decimal,
}

impl CartSnapshot {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by id.
    #[must_use]
    pub fn line(&self, item_id: CartItemId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.id == item_id)
    }

    /// Whether the server-reported totals match the lines.
    ///
    /// The client never corrects a mismatch; this exists for diagnostics.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let items: u64 = self.items.iter().map(|l| u64::from(l.quantity)).sum();
        let amount: Decimal = self.items.iter().map(CartLine::line_total).sum();
        items == u64::from(self.total_items) && amount == self.total_amount
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// CartStore
// =============================================================================

/// Holds the last server cart for the signed-in user.
///
/// Actions take the current session explicitly; calling one while signed
/// out fails with `AuthError::NotAuthenticated` before any request is made.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    snapshot: CartSnapshot,
}

impl CartStore {
    /// Create a store holding an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last snapshot received from the server.
    #[must_use]
    pub const fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }

    /// Forget the mirrored cart. Called when the session ends.
    pub fn reset(&mut self) {
        self.snapshot = CartSnapshot::default();
    }

    /// Replace the snapshot with the server's current cart.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a session, otherwise whatever the
    /// gateway returns. The snapshot is untouched on error.
    #[instrument(skip_all)]
    pub async fn fetch_cart<G>(
        &mut self,
        gateway: &G,
        session: Option<&Session>,
    ) -> Result<&CartSnapshot>
    where
        G: CartGateway + ?Sized,
    {
        let session = authorize(session)?;
        let snapshot = gateway.get_cart(session.access_token()).await?;
        Ok(self.replace(snapshot))
    }

    /// Add `quantity` units of a product. The server merges into an existing
    /// line for the same product.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::QuantityTooLow` for a quantity below one,
    /// an auth error without a session, or the gateway's error.
    #[instrument(skip(self, gateway, session), fields(product_id = %product_id))]
    pub async fn add_item<G>(
        &mut self,
        gateway: &G,
        session: Option<&Session>,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<&CartSnapshot>
    where
        G: CartGateway + ?Sized,
    {
        let quantity = positive(quantity)?;
        let session = authorize(session)?;
        let snapshot = gateway
            .add_item(session.access_token(), product_id, quantity)
            .await?;
        Ok(self.replace(snapshot))
    }

    /// Set a line's quantity.
    ///
    /// The quantity must be at least one and no more than the line's stock.
    /// Both are checked against the current snapshot, after the session,
    /// before any request.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for an out-of-range quantity or a line not
    /// in the snapshot, an auth error without a session, or the gateway's
    /// error.
    #[instrument(skip(self, gateway, session), fields(item_id = %item_id))]
    pub async fn update_item<G>(
        &mut self,
        gateway: &G,
        session: Option<&Session>,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<&CartSnapshot>
    where
        G: CartGateway + ?Sized,
    {
        let requested = positive(quantity)?;
        let session = authorize(session)?;
        let line = self
            .snapshot
            .line(item_id)
            .ok_or(ValidationError::UnknownCartItem(item_id))?;
        let available = line.stock_limit();
        if requested > available {
            return Err(ValidationError::QuantityExceedsStock {
                quantity,
                available,
            }
            .into());
        }

        let snapshot = gateway
            .update_item(session.access_token(), item_id, requested)
            .await?;
        Ok(self.replace(snapshot))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a session, or the gateway's error.
    #[instrument(skip(self, gateway, session), fields(item_id = %item_id))]
    pub async fn remove_item<G>(
        &mut self,
        gateway: &G,
        session: Option<&Session>,
        item_id: CartItemId,
    ) -> Result<&CartSnapshot>
    where
        G: CartGateway + ?Sized,
    {
        let session = authorize(session)?;
        let snapshot = gateway.remove_item(session.access_token(), item_id).await?;
        Ok(self.replace(snapshot))
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a session, or the gateway's error.
    #[instrument(skip_all)]
    pub async fn clear_cart<G>(
        &mut self,
        gateway: &G,
        session: Option<&Session>,
    ) -> Result<&CartSnapshot>
    where
        G: CartGateway + ?Sized,
    {
        let session = authorize(session)?;
        let snapshot = gateway.clear_cart(session.access_token()).await?;
        Ok(self.replace(snapshot))
    }

    /// Ask the server how many units are in the cart. Does not touch the
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a session, or the gateway's error.
    pub async fn item_count<G>(&self, gateway: &G, session: Option<&Session>) -> Result<u32>
    where
        G: CartGateway + ?Sized,
    {
        let session = authorize(session)?;
        gateway.cart_count(session.access_token()).await
    }

    fn replace(&mut self, snapshot: CartSnapshot) -> &CartSnapshot {
        if !snapshot.is_consistent() {
            tracing::warn!(
                total_items = snapshot.total_items,
                total_amount = %snapshot.total_amount,
                lines = snapshot.items.len(),
                "Cart totals do not match its lines"
            );
        }
        debug!(
            lines = snapshot.items.len(),
            total_items = snapshot.total_items,
            "Cart snapshot replaced"
        );
        self.snapshot = snapshot;
        &self.snapshot
    }
}

fn positive(quantity: i64) -> std::result::Result<u32, ValidationError> {
    if quantity < 1 {
        return Err(ValidationError::QuantityTooLow { quantity });
    }
    // Anything past u32::MAX exceeds every stock limit; saturate and let the
    // stock check reject it.
    Ok(u32::try_from(quantity).unwrap_or(u32::MAX))
}
