//! Category browsing and product reviews against the fake shop.
//!
//! Run with: cargo test -p cartwheel-integration-tests

use cartwheel_client::api::{Credentials, NewReview, ReviewSort, ReviewUpdate};
use cartwheel_client::{
    ApiClient, AppState, AuthError, ClientError, MemoryStore, SessionState, ValidationError,
};
use cartwheel_core::{CategoryId, ProductId, ReviewId};
use cartwheel_integration_tests::{
    CRITIC_REVIEW, EMAIL, FakeShop, KITCHEN, MUG, PASSWORD, TEAPOT, TEAWARE, TEAWARE_SLUG,
};
use rust_decimal::Decimal;

type Shop = AppState<ApiClient, MemoryStore>;

fn anonymous(shop: &FakeShop) -> Shop {
    let config = shop.config().expect("Failed to build config");
    let client = ApiClient::new(&config).expect("Failed to build client");
    AppState::new(client, MemoryStore::new()).expect("Failed to build state")
}

async fn signed_in(shop: &FakeShop) -> Shop {
    let mut state = anonymous(shop);
    let credentials = Credentials::new(EMAIL, PASSWORD).expect("Valid credentials");
    state.login(&credentials).await.expect("Login failed");
    state
}

fn count_of(shop: &FakeShop, request: &str) -> usize {
    shop.requests().iter().filter(|r| *r == request).count()
}

// ============================================================================
// Categories
// ============================================================================

#[tokio::test]
async fn test_category_tree_is_cached() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let state = anonymous(&shop);

    let top = state.top_level_categories().await.expect("Top level failed");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, CategoryId::new(KITCHEN));
    assert_eq!(top[0].product_count, Some(2));
    let children = top[0].children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, CategoryId::new(TEAWARE));

    state.top_level_categories().await.expect("Top level failed");
    assert_eq!(count_of(&shop, "GET /api/categories/top-level"), 1);

    let all = state.categories().await.expect("List failed");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|c| c.children().is_empty()));

    let sub = state
        .subcategories(CategoryId::new(KITCHEN))
        .await
        .expect("Subcategories failed");
    assert_eq!(sub.len(), 1);
    assert_eq!(sub[0].parent_name.as_deref(), Some("Kitchen"));
}

#[tokio::test]
async fn test_category_lookup_by_id_and_slug() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let state = anonymous(&shop);

    let teaware = state
        .category(CategoryId::new(TEAWARE))
        .await
        .expect("Category failed");
    assert_eq!(teaware.name, "Teaware");
    assert!(!teaware.is_top_level());

    let by_slug = state
        .category_by_slug(TEAWARE_SLUG)
        .await
        .expect("Slug lookup failed");
    assert_eq!(by_slug.id, teaware.id);
    assert_eq!(count_of(&shop, "GET /api/categories/slug/tea%2Fware"), 1);

    let err = state
        .category(CategoryId::new(99))
        .await
        .expect_err("Missing category should fail");
    assert_eq!(err.user_message(), "Category not found with id: 99");
}

// ============================================================================
// Reviews
// ============================================================================

#[tokio::test]
async fn test_reviews_and_stats_are_public() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let mut state = anonymous(&shop);

    let reviews = state
        .product_reviews(ProductId::new(TEAPOT), ReviewSort::Newest)
        .await
        .expect("Reviews failed");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].id, ReviewId::new(CRITIC_REVIEW));
    assert_eq!(reviews[0].rating.stars(), 3);
    assert_eq!(reviews[0].current_user_vote, None);

    let stats = state
        .review_stats(ProductId::new(TEAPOT))
        .await
        .expect("Stats failed");
    assert_eq!(stats.average_rating, Decimal::new(3, 0));
    assert_eq!(stats.total_reviews, 1);
    assert_eq!(stats.count_for(3), 1);
    assert_eq!(stats.count_for(5), 0);

    let empty = state
        .review_stats(ProductId::new(MUG))
        .await
        .expect("Stats failed");
    assert_eq!(empty.total_reviews, 0);
}

#[tokio::test]
async fn test_review_lifecycle_refreshes_product_rating() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let mut state = signed_in(&shop).await;
    let teapot = ProductId::new(TEAPOT);

    let before = state.product(teapot).await.expect("Product failed");
    assert_eq!(before.total_reviews, Some(1));
    assert!(state.can_review(teapot).await.expect("Eligibility failed").can_review);

    let new = NewReview::new(teapot, 5, Some("Pours cleanly".to_string())).expect("Valid review");
    let posted = state.create_review(&new).await.expect("Create failed");
    assert_eq!(posted.rating.stars(), 5);
    assert_eq!(posted.user_name.as_deref(), Some("Pat Doe"));

    let after = state.product(teapot).await.expect("Product failed");
    assert_eq!(after.total_reviews, Some(2));
    assert_eq!(after.average_rating, Some(Decimal::new(4, 0)));
    assert_eq!(count_of(&shop, "GET /api/products/7"), 2);

    let eligibility = state.can_review(teapot).await.expect("Eligibility failed");
    assert!(!eligibility.can_review);
    assert!(eligibility.has_reviewed);

    let err = state
        .create_review(&new)
        .await
        .expect_err("Second review should fail");
    assert_eq!(
        err.to_string(),
        "Network error: HTTP 400: You have already reviewed this product"
    );
    assert_eq!(state.session_state(), SessionState::Authenticated);

    let update = ReviewUpdate::new(Some(4), None).expect("Valid update");
    let edited = state
        .update_review(posted.id, &update)
        .await
        .expect("Update failed");
    assert_eq!(edited.rating.stars(), 4);
    assert_eq!(edited.comment.as_deref(), Some("Pours cleanly"));

    let newest = state
        .product_reviews(teapot, ReviewSort::Newest)
        .await
        .expect("Reviews failed");
    assert_eq!(newest[0].id, posted.id);
    let oldest = state
        .product_reviews(teapot, ReviewSort::Oldest)
        .await
        .expect("Reviews failed");
    assert_eq!(oldest[0].id, ReviewId::new(CRITIC_REVIEW));

    assert_eq!(state.my_reviews().await.expect("Mine failed").len(), 1);
    state.delete_review(posted.id).await.expect("Delete failed");
    assert!(state.my_reviews().await.expect("Mine failed").is_empty());
}

#[tokio::test]
async fn test_repeated_vote_is_withdrawn() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let mut state = signed_in(&shop).await;
    let critic = ReviewId::new(CRITIC_REVIEW);

    let voted = state.vote_review(critic, true).await.expect("Vote failed");
    assert_eq!(voted.helpful_count, Some(1));
    assert_eq!(voted.current_user_vote, Some(true));

    let listed = state
        .product_reviews(ProductId::new(TEAPOT), ReviewSort::Newest)
        .await
        .expect("Reviews failed");
    assert_eq!(listed[0].current_user_vote, Some(true));

    let withdrawn = state.vote_review(critic, true).await.expect("Vote failed");
    assert_eq!(withdrawn.helpful_count, Some(0));
    assert_eq!(withdrawn.current_user_vote, None);

    let flipped = state.vote_review(critic, false).await.expect("Vote failed");
    assert_eq!(flipped.unhelpful_count, Some(1));
    assert_eq!(flipped.current_user_vote, Some(false));

    let mine = NewReview::new(ProductId::new(MUG), 4, None).expect("Valid review");
    let mine = state.create_review(&mine).await.expect("Create failed");
    let err = state
        .vote_review(mine.id, true)
        .await
        .expect_err("Voting on own review should fail");
    assert_eq!(err.user_message(), "You cannot vote on your own review");
}

#[tokio::test]
async fn test_review_writes_need_a_session() {
    let shop = FakeShop::start().await.expect("Failed to start fake shop");
    let mut state = anonymous(&shop);

    let new = NewReview::new(ProductId::new(MUG), 4, None).expect("Valid review");
    let err = state.create_review(&new).await.expect_err("Anonymous write");
    assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
    let err = state.my_reviews().await.expect_err("Anonymous read");
    assert!(matches!(err, ClientError::Auth(AuthError::NotAuthenticated)));
    assert_eq!(shop.request_count(), 0);

    assert_eq!(
        NewReview::new(ProductId::new(MUG), 6, None).expect_err("Out of range"),
        ValidationError::RatingOutOfRange(6)
    );

    let mut state = signed_in(&shop).await;
    shop.revoke_tokens();
    let err = state.create_review(&new).await.expect_err("Revoked token");
    assert!(matches!(err, ClientError::Auth(AuthError::Unauthorized(_))));
    assert_eq!(state.session_state(), SessionState::Anonymous);
}
