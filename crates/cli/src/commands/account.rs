//! Account commands: sign-in, sign-out and account recovery.

use cartwheel_client::api::{Credentials, Registration};
use cartwheel_client::{ClientError, ValidationError};

use super::{CliError, Shop};

/// Registration details other than the password.
pub struct NewAccount<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub phone: Option<String>,
}

fn invalid(err: ValidationError) -> CliError {
    CliError::Client(ClientError::Validation(err))
}

/// Sign in.
pub async fn login(shop: &mut Shop, email: &str, password: String) -> Result<(), CliError> {
    let credentials = Credentials::new(email, password).map_err(invalid)?;
    let session = shop.login(&credentials).await?;
    let name = session.user().full_name();
    tracing::info!(
        "Signed in as {} ({})",
        if name.is_empty() { &session.user().email } else { &name },
        session.role()
    );
    let cart = shop.cart();
    if !cart.is_empty() {
        tracing::info!("Your cart has {} item(s)", cart.total_items);
    }
    Ok(())
}

/// Create an account and sign in.
pub async fn register(
    shop: &mut Shop,
    account: &NewAccount<'_>,
    password: String,
) -> Result<(), CliError> {
    let registration = Registration::new(
        account.first_name,
        account.last_name,
        account.email,
        password,
        account.phone.clone(),
    )
    .map_err(invalid)?;
    let session = shop.register(&registration).await?;
    tracing::info!("Account created for {}", session.user().email);
    if !session.user().email_verified() {
        tracing::info!("Check your inbox for a verification email");
    }
    Ok(())
}

/// Sign out. The local session is always removed.
pub async fn logout(shop: &mut Shop) -> Result<(), CliError> {
    if shop.current_session().is_none() {
        tracing::info!("Not signed in");
        return Ok(());
    }
    match shop.logout().await {
        Ok(()) => tracing::info!("Signed out"),
        Err(ClientError::Network(e)) => {
            tracing::warn!("Signed out locally; the shop could not be notified ({e})");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Show the signed-in user.
pub async fn whoami(shop: &mut Shop, refresh: bool) -> Result<(), CliError> {
    if refresh {
        shop.refresh_profile().await?;
    }
    let Some(session) = shop.current_session() else {
        tracing::info!("Not signed in");
        return Ok(());
    };
    let user = session.user();
    tracing::info!(
        "{} <{}> id={} role={} verified={}",
        user.full_name(),
        user.email,
        user.id,
        user.role,
        user.email_verified()
    );
    if let Some(expires_at) = session.access_token().expires_at() {
        tracing::info!("Session expires at {}", expires_at.to_rfc3339());
    }
    Ok(())
}

/// Exchange the refresh token for a new access token.
pub async fn refresh(shop: &mut Shop) -> Result<(), CliError> {
    let session = shop.refresh_session().await?;
    match session.access_token().expires_at() {
        Some(expires_at) => tracing::info!("Session renewed until {}", expires_at.to_rfc3339()),
        None => tracing::info!("Session renewed"),
    }
    Ok(())
}

/// Confirm an email address.
pub async fn verify_email(shop: &mut Shop, token: &str) -> Result<(), CliError> {
    shop.verify_email(token).await?;
    tracing::info!("Email verified");
    Ok(())
}

/// Send another verification mail.
pub async fn resend_verification(shop: &Shop, email: &str) -> Result<(), CliError> {
    shop.resend_verification(email).await?;
    tracing::info!("Verification email sent to {email}");
    Ok(())
}

/// Start a password reset.
pub async fn forgot_password(shop: &Shop, email: &str) -> Result<(), CliError> {
    shop.forgot_password(email).await?;
    tracing::info!("If {email} has an account, a reset link is on its way");
    Ok(())
}

/// Finish a password reset.
pub async fn reset_password(shop: &Shop, token: &str, password: String) -> Result<(), CliError> {
    shop.reset_password(token, password).await?;
    tracing::info!("Password updated, sign in with your new password");
    Ok(())
}
