//! Catalog commands.

use cartwheel_client::api::{Category, Product, ProductQuery};
use cartwheel_core::{CategoryId, ProductId, format_amount};

use super::{CliError, Shop};

fn render_row(product: &Product) {
    let price = if product.effective_price() < product.price {
        format!(
            "{} (was {})",
            format_amount(product.effective_price()),
            format_amount(product.price)
        )
    } else {
        format_amount(product.price)
    };
    tracing::info!(
        "#{:<5} {:<40} {:>22}  {}",
        product.id,
        product.name,
        price,
        if product.in_stock() { "in stock" } else { "out of stock" }
    );
}

fn render_list(products: &[Product]) {
    if products.is_empty() {
        tracing::info!("No products found");
    }
    for product in products {
        render_row(product);
    }
}

/// List one page of products.
pub async fn list(shop: &Shop, query: &ProductQuery) -> Result<(), CliError> {
    let page = shop.list_products(query).await?;
    render_list(&page.products);
    tracing::info!("Page {} of {}", page.current_page, page.total_pages);
    Ok(())
}

/// Show one product.
pub async fn show(shop: &Shop, id: ProductId) -> Result<(), CliError> {
    let product = shop.product(id).await?;
    render_row(&product);
    if let Some(category) = &product.category_name {
        tracing::info!("Category: {category}");
    }
    if let Some(sku) = &product.sku {
        tracing::info!("SKU: {sku}");
    }
    if let (Some(rating), Some(reviews)) = (product.average_rating, product.total_reviews) {
        tracing::info!("Rated {rating} from {reviews} review(s)");
    }
    if let Some(description) = &product.description {
        tracing::info!("{description}");
    }
    Ok(())
}

/// Search products.
pub async fn search(shop: &Shop, query: &str) -> Result<(), CliError> {
    render_list(&shop.search_products(query).await?);
    Ok(())
}

/// List the products in a category.
pub async fn category(shop: &Shop, id: CategoryId) -> Result<(), CliError> {
    render_list(&shop.products_by_category(id).await?);
    Ok(())
}

fn render_category(category: &Category, depth: usize) {
    let count = category
        .product_count
        .map(|n| format!("  ({n} products)"))
        .unwrap_or_default();
    tracing::info!(
        "{:indent$}#{:<5} {}{}",
        "",
        category.id,
        category.name,
        count,
        indent = depth * 2
    );
    for child in category.children() {
        render_category(child, depth + 1);
    }
}

/// List categories. `top` shows only the top level with children nested.
pub async fn categories(shop: &Shop, top: bool) -> Result<(), CliError> {
    let categories = if top {
        shop.top_level_categories().await?
    } else {
        shop.categories().await?
    };
    if categories.is_empty() {
        tracing::info!("No categories found");
    }
    for category in &categories {
        render_category(category, 0);
    }
    Ok(())
}

/// Show one category. Numeric input is a category id, anything else a slug.
pub async fn show_category(shop: &Shop, category: &str) -> Result<(), CliError> {
    let category = match category.parse::<CategoryId>() {
        Ok(id) => shop.category(id).await?,
        Err(_) => shop.category_by_slug(category).await?,
    };
    render_category(&category, 0);
    if let Some(parent) = &category.parent_name {
        tracing::info!("Parent: {parent}");
    }
    if let Some(description) = &category.description {
        tracing::info!("{description}");
    }
    Ok(())
}

/// List a category's direct children.
pub async fn subcategories(shop: &Shop, parent_id: CategoryId) -> Result<(), CliError> {
    let children = shop.subcategories(parent_id).await?;
    if children.is_empty() {
        tracing::info!("No subcategories");
    }
    for child in &children {
        render_category(child, 0);
    }
    Ok(())
}
