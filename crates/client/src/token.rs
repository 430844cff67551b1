//! Bearer token wrappers.
//!
//! Tokens are kept in [`SecretString`] so they never leak through `Debug`
//! output or tracing fields. The access token is usually a JWT; when it is,
//! its `exp` claim lets the client notice an expired session before making a
//! call the server would reject anyway.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Seconds before `exp` at which a token is already treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

macro_rules! define_token {
    ($name:ident, $label:literal) => {
        #[derive(Clone)]
        pub struct $name(SecretString);

        impl $name {
            /// Wrap a raw token string.
            #[must_use]
            pub fn new(token: impl Into<String>) -> Self {
                Self(SecretString::from(token.into()))
            }

            /// The raw token, for building an `Authorization` header or
            /// persisting the session.
            #[must_use]
            pub fn expose(&self) -> &str {
                self.0.expose_secret()
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(concat!($label, "([REDACTED])"))
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.expose() == other.expose()
            }
        }

        impl Eq for $name {}
    };
}

define_token!(AccessToken, "AccessToken");
define_token!(RefreshToken, "RefreshToken");

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
}

impl AccessToken {
    /// Expiry from the JWT `exp` claim.
    ///
    /// Returns `None` when the token is not a JWT or carries no `exp`.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let payload = self.expose().split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(claims.exp?, 0)
    }

    /// Check if the token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against an explicit clock.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .is_some_and(|exp| now.timestamp() >= exp.timestamp() - EXPIRY_SKEW_SECS)
    }
}
