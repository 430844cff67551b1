//! Cache types for catalog responses.

use cartwheel_core::{CategoryId, ProductId};

use super::types::{Category, Product, ProductPage, ProductQuery};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
    Category(CategoryId),
    Categories,
    TopLevelCategories,
    CategoryInfo(CategoryId),
    Subcategories(CategoryId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(ProductPage),
    Category(Vec<Product>),
    Categories(Vec<Category>),
    CategoryInfo(Box<Category>),
}
