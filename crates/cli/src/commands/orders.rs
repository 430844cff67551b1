//! Order commands.

use cartwheel_client::api::{Order, OrderRequest};
use cartwheel_core::{OrderId, format_amount};

use super::{CliError, Shop};

fn render_summary(order: &Order) {
    tracing::info!(
        "{:<16} {:<12} {:>10}  {}",
        order.order_number,
        order.status,
        format_amount(order.total_amount),
        order.created_at.as_deref().unwrap_or("")
    );
}

fn render(order: &Order) {
    render_summary(order);
    for line in &order.order_items {
        tracing::info!(
            "  {:<32} {:>3} x {:>10}",
            line.product_name,
            line.quantity,
            format_amount(line.price)
        );
    }
    if let Some(payment) = order.payment_method {
        tracing::info!("Payment: {payment}");
    }
    if let Some(tracking) = &order.tracking_number {
        tracing::info!("Tracking: {tracking}");
    }
}

/// Check out the current cart.
pub async fn place(shop: &mut Shop, request: &OrderRequest) -> Result<(), CliError> {
    let order = shop.place_order(request).await?;
    tracing::info!("Order {} placed", order.order_number);
    render(&order);
    Ok(())
}

/// List the user's orders.
pub async fn list(shop: &mut Shop) -> Result<(), CliError> {
    let orders = shop.orders().await?;
    if orders.is_empty() {
        tracing::info!("No orders yet");
    }
    for order in &orders {
        render_summary(order);
    }
    Ok(())
}

/// Show one order. Numeric input is an order id, anything else an order
/// number.
pub async fn show(shop: &mut Shop, order: &str) -> Result<(), CliError> {
    let order = match order.parse::<OrderId>() {
        Ok(id) => shop.order(id).await?,
        Err(_) => shop.order_by_number(order).await?,
    };
    render(&order);
    Ok(())
}

/// Cancel an order.
pub async fn cancel(shop: &mut Shop, id: OrderId) -> Result<(), CliError> {
    let order = shop.cancel_order(id).await?;
    tracing::info!("Order {} is now {}", order.order_number, order.status);
    Ok(())
}
