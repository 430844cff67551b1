//! Cart commands.

use cartwheel_client::CartSnapshot;
use cartwheel_core::{CartItemId, ProductId, format_amount};

use super::{CliError, Shop};

fn render(cart: &CartSnapshot) {
    if cart.is_empty() {
        tracing::info!("Your cart is empty");
        return;
    }
    for line in &cart.items {
        tracing::info!(
            "#{:<4} {:<32} {:>3} x {:>10} = {:>10}  (product {}, {} in stock)",
            line.id,
            line.product_name.as_deref().unwrap_or("(unnamed)"),
            line.quantity,
            format_amount(line.unit_price),
            format_amount(line.line_total()),
            line.product_id,
            line.stock_limit()
        );
    }
    tracing::info!(
        "{} item(s), total {}",
        cart.total_items,
        format_amount(cart.total_amount)
    );
}

/// Show the cart.
pub async fn show(shop: &mut Shop) -> Result<(), CliError> {
    render(shop.fetch_cart().await?);
    Ok(())
}

/// Add a product.
pub async fn add(shop: &mut Shop, product_id: ProductId, quantity: i64) -> Result<(), CliError> {
    let cart = shop.add_item(product_id, quantity).await?;
    tracing::info!("Added product {product_id}");
    render(cart);
    Ok(())
}

/// Set a line's quantity.
///
/// The cart is loaded first so the quantity can be checked against the
/// line's stock before anything is sent.
pub async fn update(shop: &mut Shop, item_id: CartItemId, quantity: i64) -> Result<(), CliError> {
    shop.fetch_cart().await?;
    let cart = shop.update_item(item_id, quantity).await?;
    render(cart);
    Ok(())
}

/// Remove a line.
pub async fn remove(shop: &mut Shop, item_id: CartItemId) -> Result<(), CliError> {
    let cart = shop.remove_item(item_id).await?;
    tracing::info!("Removed item {item_id}");
    render(cart);
    Ok(())
}

/// Empty the cart.
pub async fn clear(shop: &mut Shop) -> Result<(), CliError> {
    shop.clear_cart().await?;
    tracing::info!("Cart cleared");
    Ok(())
}

/// Show the number of units in the cart.
pub async fn count(shop: &mut Shop) -> Result<(), CliError> {
    let count = shop.cart_count().await?;
    tracing::info!("{count} item(s) in your cart");
    Ok(())
}
