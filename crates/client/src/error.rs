//! Client error taxonomy.
//!
//! Every store action either resolves with updated state or rejects with a
//! [`ClientError`]. The variants split by who is at fault and what the front
//! end should do about it:
//!
//! - [`ValidationError`] - bad input caught locally; nothing was sent
//! - [`AuthError`] - no usable session; the front end signs the user out
//! - [`NetworkError`] - the call failed in transit or the server refused it
//! - [`StorageError`] - the persisted session mirror could not be read/written

use cartwheel_core::{AddressError, CartItemId, EmailError};
use thiserror::Error;

/// Top-level error returned by stores and the gateway.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing, expired or server-rejected session.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Transport failure or non-success response.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Persisted session storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input that can never succeed, caught without a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Cart quantities start at one.
    #[error("quantity must be at least 1 (got {quantity})")]
    QuantityTooLow {
        /// Requested quantity.
        quantity: i64,
    },

    /// Requested quantity exceeds what the line has in stock.
    #[error("only {available} items available (requested {quantity})")]
    QuantityExceedsStock {
        /// Requested quantity.
        quantity: i64,
        /// Stock ceiling for the line.
        available: u32,
    },

    /// The cart line is not part of the current snapshot.
    #[error("cart item {0} is not in the cart")]
    UnknownCartItem(CartItemId),

    /// Malformed email address.
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    /// Blank password.
    #[error("password cannot be empty")]
    EmptyPassword,

    /// Blank required text field (name, verification token, search query...).
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// Review ratings run from one to five stars.
    #[error("rating must be between 1 and 5 (got {0})")]
    RatingOutOfRange(i64),

    /// A review update that changes nothing.
    #[error("review update must change the rating or the comment")]
    EmptyReviewUpdate,

    /// Incomplete shipping or billing address.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
}

/// Session problems. All of these end in the Anonymous state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A session-scoped action was called while signed out.
    #[error("not signed in")]
    NotAuthenticated,

    /// The access token's expiry has passed.
    #[error("session expired, please sign in again")]
    SessionExpired,

    /// The server answered 401/403 to a session-scoped call.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server rejected the login/registration credentials.
    #[error("{0}")]
    Rejected(String),
}

/// Failures on the wire.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The request never produced a response (DNS, connect, timeout...).
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The server is throttling this client.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An endpoint path could not be joined onto the base URL.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Failures reading or writing the persisted session mirror.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored data is not valid JSON.
    #[error("corrupt session file {path}: {source}")]
    Corrupt {
        /// File being read.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error("could not encode session data: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ClientError {
    /// Whether this error means the session is no longer usable and the
    /// front end must sign the user out.
    #[must_use]
    pub const fn requires_sign_out(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::Unauthorized(_) | AuthError::SessionExpired)
        )
    }

    /// Whether the error was raised locally without touching the network.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Auth(AuthError::NotAuthenticated | AuthError::SessionExpired)
                | Self::Storage(_)
        )
    }

    /// Short message suitable for a toast or inline error.
    ///
    /// Server messages are passed through; transport internals are not.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Auth(AuthError::NotAuthenticated) => "Please sign in to continue".to_string(),
            Self::Auth(AuthError::SessionExpired | AuthError::Unauthorized(_)) => {
                "Your session has expired, please sign in again".to_string()
            }
            Self::Auth(AuthError::Rejected(message))
            | Self::Network(NetworkError::Status { message, .. }) => message.clone(),
            Self::Network(NetworkError::RateLimited(secs)) => {
                format!("Too many requests, try again in {secs} seconds")
            }
            Self::Network(
                NetworkError::Transport(_) | NetworkError::Decode(_) | NetworkError::Url(_),
            ) => {
                "Could not reach the shop, please try again".to_string()
            }
            Self::Storage(_) => "Could not save your session locally".to_string(),
        }
    }
}

/// Result type alias for [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
