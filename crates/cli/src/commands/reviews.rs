//! Review commands.

use cartwheel_client::api::{NewReview, Rating, Review, ReviewSort, ReviewUpdate};
use cartwheel_core::{ProductId, ReviewId};

use super::{CliError, Shop};

fn render(review: &Review) {
    let vote = match review.current_user_vote {
        Some(true) => "  (you: helpful)",
        Some(false) => "  (you: unhelpful)",
        None => "",
    };
    tracing::info!(
        "#{:<5} {:<7} {:<20} {} helpful / {} not{}",
        review.id,
        stars(review.rating),
        review.user_name.as_deref().unwrap_or("anonymous"),
        review.helpful_count.unwrap_or(0),
        review.unhelpful_count.unwrap_or(0),
        vote
    );
    if let Some(comment) = &review.comment {
        tracing::info!("       {comment}");
    }
}

fn stars(rating: Rating) -> String {
    let filled = usize::from(rating.stars());
    let empty = usize::from(Rating::MAX) - filled;
    format!("{}{}", "*".repeat(filled), ".".repeat(empty))
}

/// List a product's reviews.
pub async fn list(shop: &mut Shop, product_id: ProductId, sort: ReviewSort) -> Result<(), CliError> {
    let reviews = shop.product_reviews(product_id, sort).await?;
    if reviews.is_empty() {
        tracing::info!("No reviews yet");
    }
    for review in &reviews {
        render(review);
    }
    Ok(())
}

/// Show a product's rating summary.
pub async fn stats(shop: &Shop, product_id: ProductId) -> Result<(), CliError> {
    let stats = shop.review_stats(product_id).await?;
    tracing::info!(
        "Average {} from {} review(s)",
        stats.average_rating,
        stats.total_reviews
    );
    for value in (Rating::MIN..=Rating::MAX).rev() {
        tracing::info!("  {value} stars: {}", stats.count_for(value));
    }
    Ok(())
}

/// Post a review.
pub async fn add(shop: &mut Shop, review: &NewReview) -> Result<(), CliError> {
    let review = shop.create_review(review).await?;
    tracing::info!("Review #{} posted", review.id);
    render(&review);
    Ok(())
}

/// Edit a review.
pub async fn edit(shop: &mut Shop, id: ReviewId, update: &ReviewUpdate) -> Result<(), CliError> {
    let review = shop.update_review(id, update).await?;
    tracing::info!("Review #{} updated", review.id);
    render(&review);
    Ok(())
}

/// Delete a review.
pub async fn delete(shop: &mut Shop, id: ReviewId) -> Result<(), CliError> {
    shop.delete_review(id).await?;
    tracing::info!("Review #{id} deleted");
    Ok(())
}

/// Vote on a review.
pub async fn vote(shop: &mut Shop, id: ReviewId, helpful: bool) -> Result<(), CliError> {
    let review = shop.vote_review(id, helpful).await?;
    render(&review);
    Ok(())
}

/// List the user's own reviews.
pub async fn mine(shop: &mut Shop) -> Result<(), CliError> {
    let reviews = shop.my_reviews().await?;
    if reviews.is_empty() {
        tracing::info!("You have not written any reviews");
    }
    for review in &reviews {
        if let Some(product) = &review.product_name {
            tracing::info!("{product}");
        }
        render(review);
    }
    Ok(())
}

/// Check whether the user may review a product.
pub async fn can_review(shop: &mut Shop, product_id: ProductId) -> Result<(), CliError> {
    let eligibility = shop.can_review(product_id).await?;
    let fallback = if eligibility.can_review {
        "You can review this product"
    } else {
        "You cannot review this product"
    };
    tracing::info!("{}", eligibility.message.as_deref().unwrap_or(fallback));
    Ok(())
}
