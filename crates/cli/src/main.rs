//! Cartwheel CLI - a terminal storefront for the shop service.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept in CARTWHEEL_STATE_FILE)
//! cartwheel login -e shopper@example.com -p hunter2
//!
//! # Browse and fill the cart
//! cartwheel products list --size 12 --sort-by price --sort-dir asc
//! cartwheel cart add 42 -q 2
//! cartwheel cart update 1 3
//!
//! # Read and write reviews
//! cartwheel reviews list 42 --sort oldest
//! cartwheel reviews add 42 --rating 5 --comment "Keeps coffee hot"
//!
//! # Check out
//! cartwheel orders place --street "1 Main St" --city Springfield --state IL \
//!     --zip-code 62701 --country US --recipient-name "Pat Doe" --payment-method credit-card
//!
//! cartwheel logout
//! ```
//!
//! # Environment Variables
//!
//! - `CARTWHEEL_API_URL` - Base URL of the shop service (required)
//! - `CARTWHEEL_LOG_FORMAT` - `json` for JSON log lines (default: human)
//! - `SENTRY_DSN` - Enables Sentry error reporting when set
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate, 0.0 to 1.0 (default: 1.0)
//!
//! See `cartwheel_client::config` for the remaining client settings.

#![cfg_attr(not(test), forbid(unsafe_code))]

use cartwheel_core::{CartItemId, CategoryId, OrderId, PaymentMethod, ProductId, ReviewId};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "cartwheel")]
#[command(author, version, about = "Cartwheel storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "CARTWHEEL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        /// First name
        #[arg(long)]
        first_name: String,

        /// Last name
        #[arg(long)]
        last_name: String,

        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "CARTWHEEL_PASSWORD", hide_env_values = true)]
        password: String,

        /// Phone number
        #[arg(long)]
        phone: Option<String>,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Reload the profile from the shop service
        #[arg(long)]
        refresh: bool,
    },
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Confirm an email address with the token from the verification mail
    VerifyEmail {
        /// Verification token
        token: String,
    },
    /// Send another verification mail
    ResendVerification {
        /// Account email address
        email: String,
    },
    /// Start a password reset
    ForgotPassword {
        /// Account email address
        email: String,
    },
    /// Finish a password reset
    ResetPassword {
        /// Token from the reset mail
        #[arg(long)]
        token: String,

        /// New password
        #[arg(short, long, env = "CARTWHEEL_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Browse the catalog
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Place and manage orders
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Browse categories
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Read and write product reviews
    Reviews {
        #[command(subcommand)]
        action: ReviewAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        /// Product ID
        product_id: ProductId,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Set a line's quantity
    Update {
        /// Cart line ID
        item_id: CartItemId,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Cart line ID
        item_id: CartItemId,
    },
    /// Empty the cart
    Clear,
    /// Show the number of units in the cart
    Count,
}

#[derive(Subcommand)]
enum ProductAction {
    /// List products
    List(ProductListArgs),
    /// Show one product
    Show {
        /// Product ID
        id: ProductId,
    },
    /// Search products
    Search {
        /// Search text
        query: String,
    },
    /// List the products in a category
    Category {
        /// Category ID
        id: CategoryId,
    },
}

#[derive(Args)]
struct ProductListArgs {
    /// Page number, starting at 0
    #[arg(long)]
    page: Option<u32>,

    /// Products per page
    #[arg(long)]
    size: Option<u32>,

    /// Field to sort by (e.g. `name`, `price`, `createdAt`)
    #[arg(long)]
    sort_by: Option<String>,

    /// Sort direction
    #[arg(long, value_enum)]
    sort_dir: Option<SortArg>,

    /// Only products in this category
    #[arg(long)]
    category: Option<CategoryId>,

    /// Only products matching this text
    #[arg(long)]
    search: Option<String>,

    /// Minimum price
    #[arg(long)]
    min_price: Option<Decimal>,

    /// Maximum price
    #[arg(long)]
    max_price: Option<Decimal>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Asc,
    Desc,
}

#[derive(Subcommand)]
enum CategoryAction {
    /// List categories
    List {
        /// Only top-level categories, with children nested
        #[arg(long)]
        top: bool,
    },
    /// Show one category by ID or slug
    Show {
        /// Category ID or slug
        category: String,
    },
    /// List a category's direct children
    Children {
        /// Parent category ID
        id: CategoryId,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// List a product's reviews
    List {
        /// Product ID
        product_id: ProductId,

        /// Review order
        #[arg(long, value_enum, default_value = "newest")]
        sort: ReviewSortArg,
    },
    /// Show a product's rating summary
    Stats {
        /// Product ID
        product_id: ProductId,
    },
    /// Review a product
    Add {
        /// Product ID
        product_id: ProductId,

        /// Stars, 1 to 5
        #[arg(short, long, allow_negative_numbers = true)]
        rating: i64,

        /// Review text
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Edit one of your reviews
    Edit {
        /// Review ID
        id: ReviewId,

        /// New star rating, 1 to 5
        #[arg(short, long, allow_negative_numbers = true)]
        rating: Option<i64>,

        /// New review text
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Delete one of your reviews
    Delete {
        /// Review ID
        id: ReviewId,
    },
    /// Vote on a review; repeating a vote withdraws it
    Vote {
        /// Review ID
        id: ReviewId,

        /// Your vote
        #[arg(value_enum)]
        vote: VoteArg,
    },
    /// List your reviews
    Mine,
    /// Check whether you can review a product
    CanReview {
        /// Product ID
        product_id: ProductId,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReviewSortArg {
    Newest,
    Oldest,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteArg {
    Helpful,
    Unhelpful,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Check out the current cart
    Place(PlaceOrderArgs),
    /// List your orders
    List,
    /// Show one order by ID or order number
    Show {
        /// Order ID or order number
        order: String,
    },
    /// Cancel an order
    Cancel {
        /// Order ID
        id: OrderId,
    },
}

#[derive(Args)]
struct PlaceOrderArgs {
    #[command(flatten)]
    address: AddressArgs,

    /// Payment method (`credit-card`, `debit-card`, `paypal`, `stripe`,
    /// `cash-on-delivery`, `bank-transfer`)
    #[arg(long, default_value = "credit-card")]
    payment_method: PaymentMethod,

    /// Note for the order
    #[arg(long)]
    notes: Option<String>,
}

/// Shipping address, also used for billing.
#[derive(Args)]
struct AddressArgs {
    #[arg(long)]
    street: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    zip_code: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    recipient_name: String,
}

/// Initialize Sentry when `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;
    let environment = std::env::var("SENTRY_ENVIRONMENT").ok();
    let sample_rate = std::env::var("SENTRY_SAMPLE_RATE")
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(1.0);

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: environment.map(std::borrow::Cow::Owned),
            sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Log filter used when `RUST_LOG` is unset. Events from this binary are
/// targeted at its crate name, `cartwheel`.
const DEFAULT_LOG_FILTER: &str = concat!(
    env!("CARGO_CRATE_NAME"),
    "=info,cartwheel_client=warn"
);

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("CARTWHEEL_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Load .env before reading any settings
    let _ = dotenvy::dotenv();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e.user_message());
        tracing::debug!(error = ?e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut shop = commands::open()?;

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&mut shop, &email, password).await?;
        }
        Commands::Register {
            first_name,
            last_name,
            email,
            password,
            phone,
        } => {
            commands::account::register(
                &mut shop,
                &commands::account::NewAccount {
                    first_name: &first_name,
                    last_name: &last_name,
                    email: &email,
                    phone,
                },
                password,
            )
            .await?;
        }
        Commands::Logout => commands::account::logout(&mut shop).await?,
        Commands::Whoami { refresh } => commands::account::whoami(&mut shop, refresh).await?,
        Commands::Refresh => commands::account::refresh(&mut shop).await?,
        Commands::VerifyEmail { token } => commands::account::verify_email(&mut shop, &token).await?,
        Commands::ResendVerification { email } => {
            commands::account::resend_verification(&shop, &email).await?;
        }
        Commands::ForgotPassword { email } => {
            commands::account::forgot_password(&shop, &email).await?;
        }
        Commands::ResetPassword { token, password } => {
            commands::account::reset_password(&shop, &token, password).await?;
        }
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&mut shop).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&mut shop, product_id, quantity).await?,
            CartAction::Update { item_id, quantity } => {
                commands::cart::update(&mut shop, item_id, quantity).await?;
            }
            CartAction::Remove { item_id } => commands::cart::remove(&mut shop, item_id).await?,
            CartAction::Clear => commands::cart::clear(&mut shop).await?,
            CartAction::Count => commands::cart::count(&mut shop).await?,
        },
        Commands::Products { action } => match action {
            ProductAction::List(args) => {
                let query = args.into_query();
                commands::catalog::list(&shop, &query).await?;
            }
            ProductAction::Show { id } => commands::catalog::show(&shop, id).await?,
            ProductAction::Search { query } => commands::catalog::search(&shop, &query).await?,
            ProductAction::Category { id } => commands::catalog::category(&shop, id).await?,
        },
        Commands::Orders { action } => match action {
            OrderAction::Place(args) => {
                let request = args.into_request();
                commands::orders::place(&mut shop, &request).await?;
            }
            OrderAction::List => commands::orders::list(&mut shop).await?,
            OrderAction::Show { order } => commands::orders::show(&mut shop, &order).await?,
            OrderAction::Cancel { id } => commands::orders::cancel(&mut shop, id).await?,
        },
        Commands::Categories { action } => match action {
            CategoryAction::List { top } => commands::catalog::categories(&shop, top).await?,
            CategoryAction::Show { category } => {
                commands::catalog::show_category(&shop, &category).await?;
            }
            CategoryAction::Children { id } => {
                commands::catalog::subcategories(&shop, id).await?;
            }
        },
        Commands::Reviews { action } => run_review(&mut shop, action).await?,
    }
    Ok(())
}

async fn run_review(shop: &mut commands::Shop, action: ReviewAction) -> Result<(), CliError> {
    use cartwheel_client::api::{NewReview, ReviewUpdate};

    match action {
        ReviewAction::List { product_id, sort } => {
            commands::reviews::list(shop, product_id, sort.into()).await
        }
        ReviewAction::Stats { product_id } => commands::reviews::stats(shop, product_id).await,
        ReviewAction::Add {
            product_id,
            rating,
            comment,
        } => {
            let review = NewReview::new(product_id, rating, comment)
                .map_err(cartwheel_client::ClientError::from)?;
            commands::reviews::add(shop, &review).await
        }
        ReviewAction::Edit {
            id,
            rating,
            comment,
        } => {
            let update =
                ReviewUpdate::new(rating, comment).map_err(cartwheel_client::ClientError::from)?;
            commands::reviews::edit(shop, id, &update).await
        }
        ReviewAction::Delete { id } => commands::reviews::delete(shop, id).await,
        ReviewAction::Vote { id, vote } => {
            commands::reviews::vote(shop, id, matches!(vote, VoteArg::Helpful)).await
        }
        ReviewAction::Mine => commands::reviews::mine(shop).await,
        ReviewAction::CanReview { product_id } => {
            commands::reviews::can_review(shop, product_id).await
        }
    }
}

impl From<ReviewSortArg> for cartwheel_client::api::ReviewSort {
    fn from(sort: ReviewSortArg) -> Self {
        match sort {
            ReviewSortArg::Newest => Self::Newest,
            ReviewSortArg::Oldest => Self::Oldest,
        }
    }
}

impl ProductListArgs {
    fn into_query(self) -> cartwheel_client::api::ProductQuery {
        use cartwheel_client::api::{ProductQuery, SortDirection};

        ProductQuery {
            page: self.page,
            size: self.size,
            sort_by: self.sort_by,
            sort_dir: self.sort_dir.map(|d| match d {
                SortArg::Asc => SortDirection::Asc,
                SortArg::Desc => SortDirection::Desc,
            }),
            category_id: self.category,
            search: self.search,
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

impl PlaceOrderArgs {
    fn into_request(self) -> cartwheel_client::api::OrderRequest {
        let address = cartwheel_core::Address {
            street: self.address.street,
            city: self.address.city,
            state: self.address.state,
            zip_code: self.address.zip_code,
            country: self.address.country,
            phone: self.address.phone,
            recipient_name: self.address.recipient_name,
        };
        cartwheel_client::api::OrderRequest {
            billing_address: address.clone(),
            shipping_address: address,
            payment_method: self.payment_method,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}
