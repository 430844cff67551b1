//! Session store.
//!
//! Holds the process-wide authentication state and mirrors it to a
//! [`KeyValueStore`] so a restart resumes the session. There are two states:
//!
//! ```text
//! Anonymous --login/register--> Authenticated
//! Authenticated --logout/clear/forced sign-out--> Anonymous
//! ```
//!
//! Every mutation persists before it updates memory, so a failed write leaves
//! the in-memory state as it was.

use cartwheel_core::{Email, UserId, UserRole};
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};

use crate::api::{AuthGateway, AuthResponse, Credentials, Registration, UserProfile};
use crate::error::{AuthError, Result, StorageError, ValidationError};
use crate::storage::{Change, KeyValueStore};
use crate::token::{AccessToken, RefreshToken};

/// Storage keys of the persisted session mirror.
pub mod keys {
    /// Bearer token for session-scoped calls.
    pub const ACCESS_TOKEN: &str = "accessToken";
    /// Token used to obtain a new access token.
    pub const REFRESH_TOKEN: &str = "refreshToken";
    /// JSON-encoded user profile.
    pub const USER: &str = "user";

    /// Every key the session owns.
    pub const ALL: [&str; 3] = [ACCESS_TOKEN, REFRESH_TOKEN, USER];
}

// =============================================================================
// Session
// =============================================================================

/// An authenticated session: a token pair and the profile it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: UserProfile,
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
}

impl Session {
    /// Build a session from its parts.
    #[must_use]
    pub const fn new(
        user: UserProfile,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) -> Self {
        Self {
            user,
            access_token,
            refresh_token,
        }
    }

    fn from_response(response: AuthResponse) -> Self {
        Self {
            user: response.user,
            access_token: AccessToken::new(response.access_token),
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(RefreshToken::new),
        }
    }

    /// The signed-in user's profile.
    #[must_use]
    pub const fn user(&self) -> &UserProfile {
        &self.user
    }

    /// The signed-in user's id.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// The signed-in user's role.
    #[must_use]
    pub const fn role(&self) -> UserRole {
        self.user.role
    }

    /// Bearer token for session-scoped calls.
    #[must_use]
    pub const fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Refresh token, if the service issued one.
    #[must_use]
    pub const fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }
}

/// Which side of the session state machine the store is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

/// Check that a session-scoped call can be made.
///
/// # Errors
///
/// Returns `AuthError::NotAuthenticated` without a session and
/// `AuthError::SessionExpired` once the access token's expiry has passed.
pub fn authorize(session: Option<&Session>) -> Result<&Session> {
    let session = session.ok_or(AuthError::NotAuthenticated)?;
    if session.access_token.is_expired() {
        return Err(AuthError::SessionExpired.into());
    }
    Ok(session)
}

// =============================================================================
// SessionStore
// =============================================================================

/// Owns the current session and its persisted mirror.
#[derive(Debug)]
pub struct SessionStore<S> {
    storage: S,
    session: Option<Session>,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Rehydrate the session from storage.
    ///
    /// A session is restored only when both the access token and a readable
    /// user profile are present. Anything less is treated as a torn write:
    /// the leftovers are removed and the store starts Anonymous.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the storage cannot be read or cleaned up.
    pub fn restore(mut storage: S) -> std::result::Result<Self, StorageError> {
        let access_token = storage.get(keys::ACCESS_TOKEN)?.filter(|t| !t.is_empty());
        let refresh_token = storage.get(keys::REFRESH_TOKEN)?.filter(|t| !t.is_empty());
        let user = storage
            .get(keys::USER)?
            .filter(|u| !u.is_empty() && u != "undefined")
            .and_then(|u| match serde_json::from_str::<UserProfile>(&u) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Stored user profile is unreadable");
                    None
                }
            });

        let session = match (access_token, user) {
            (Some(token), Some(user)) => Some(Session::new(
                user,
                AccessToken::new(token),
                refresh_token.map(RefreshToken::new),
            )),
            (None, None) if refresh_token.is_none() => None,
            _ => {
                warn!("Discarding incomplete stored session");
                storage.apply(&CLEAR_ALL)?;
                None
            }
        };

        if let Some(session) = &session {
            debug!(user_id = %session.user_id(), "Restored session");
        }

        Ok(Self { storage, session })
    }

    /// The current session, if signed in.
    #[must_use]
    pub const fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Anonymous or Authenticated.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    /// Whether a session is held.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// The backing storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Sign in.
    ///
    /// On failure the prior state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` with the server's message for bad
    /// credentials, a network error, or a storage error if the new session
    /// could not be persisted.
    #[instrument(skip_all, fields(email = %credentials.email()))]
    pub async fn login<G>(&mut self, gateway: &G, credentials: &Credentials) -> Result<&Session>
    where
        G: AuthGateway + ?Sized,
    {
        let response = gateway.login(credentials).await?;
        let session = Session::from_response(response);
        self.establish(session)?;
        info!("Signed in");
        self.current().ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Create an account and sign in with it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::login`].
    #[instrument(skip_all, fields(email = %registration.email()))]
    pub async fn register<G>(
        &mut self,
        gateway: &G,
        registration: &Registration,
    ) -> Result<&Session>
    where
        G: AuthGateway + ?Sized,
    {
        let response = gateway.register(registration).await?;
        let session = Session::from_response(response);
        self.establish(session)?;
        info!("Registered and signed in");
        self.current().ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Sign out.
    ///
    /// The service is notified first; local state and storage are then
    /// cleared whatever the outcome. Signing out while Anonymous makes no
    /// request.
    ///
    /// # Errors
    ///
    /// Returns the notify error if the service could not be told, or a
    /// storage error if the mirror could not be cleared. The store is
    /// Anonymous in every case.
    #[instrument(skip_all)]
    pub async fn logout<G>(&mut self, gateway: &G) -> Result<()>
    where
        G: AuthGateway + ?Sized,
    {
        let notified = match &self.session {
            Some(session) => gateway.logout(session.access_token()).await,
            None => Ok(()),
        };
        if let Err(e) = &notified {
            warn!(error = %e, "Logout notification failed, clearing local session anyway");
        }
        let cleared = self.clear_credentials();
        notified?;
        cleared?;
        info!("Signed out");
        Ok(())
    }

    /// Drop the session locally without contacting the service.
    ///
    /// Memory is cleared even if storage fails.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted mirror could not be removed.
    pub fn clear_credentials(&mut self) -> std::result::Result<(), StorageError> {
        self.session = None;
        self.storage.apply(&CLEAR_ALL)?;
        debug!("Cleared stored credentials");
        Ok(())
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` while Anonymous,
    /// `AuthError::SessionExpired` if no refresh token was issued, or the
    /// gateway's error.
    #[instrument(skip_all)]
    pub async fn refresh<G>(&mut self, gateway: &G) -> Result<&Session>
    where
        G: AuthGateway + ?Sized,
    {
        let session = self.session.as_ref().ok_or(AuthError::NotAuthenticated)?;
        let refresh_token = session
            .refresh_token()
            .cloned()
            .ok_or(AuthError::SessionExpired)?;

        let response = gateway.refresh_token(&refresh_token).await?;
        let mut renewed = Session::from_response(response);
        if renewed.refresh_token.is_none() {
            renewed.refresh_token = Some(refresh_token);
        }
        self.establish(renewed)?;
        debug!("Refreshed access token");
        self.current().ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Reload the user profile from the service.
    ///
    /// # Errors
    ///
    /// Returns an auth error without a usable session, or the gateway's
    /// error.
    #[instrument(skip_all)]
    pub async fn refresh_profile<G>(&mut self, gateway: &G) -> Result<&UserProfile>
    where
        G: AuthGateway + ?Sized,
    {
        let session = authorize(self.session.as_ref())?;
        let user = gateway.current_user(session.access_token()).await?;
        let updated = Session {
            user,
            ..session.clone()
        };
        self.establish(updated)?;
        self.current()
            .map(Session::user)
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Confirm an email address with the token from the verification mail.
    ///
    /// If signed in, the stored profile is marked verified.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for a blank token, or the
    /// gateway's error.
    #[instrument(skip_all)]
    pub async fn verify_email<G>(&mut self, gateway: &G, verification_token: &str) -> Result<()>
    where
        G: AuthGateway + ?Sized,
    {
        let verification_token = verification_token.trim();
        if verification_token.is_empty() {
            return Err(ValidationError::EmptyField("verification token").into());
        }
        gateway.verify_email(verification_token).await?;

        if let Some(session) = &self.session
            && !session.user.email_verified()
        {
            let mut updated = session.clone();
            updated.user.is_email_verified = Some(true);
            self.establish(updated)?;
        }
        info!("Email verified");
        Ok(())
    }

    /// Ask the service to send another verification mail.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Email` for a malformed address, or the
    /// gateway's error.
    pub async fn resend_verification<G>(&self, gateway: &G, email: &str) -> Result<()>
    where
        G: AuthGateway + ?Sized,
    {
        let email = Email::parse(email).map_err(ValidationError::from)?;
        gateway.resend_verification(&email).await
    }

    /// Start a password reset.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Email` for a malformed address, or the
    /// gateway's error.
    pub async fn forgot_password<G>(&self, gateway: &G, email: &str) -> Result<()>
    where
        G: AuthGateway + ?Sized,
    {
        let email = Email::parse(email).map_err(ValidationError::from)?;
        gateway.forgot_password(&email).await
    }

    /// Finish a password reset with the token from the reset mail.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a blank token or password, or the
    /// gateway's error.
    pub async fn reset_password<G>(
        &self,
        gateway: &G,
        reset_token: &str,
        new_password: impl Into<String>,
    ) -> Result<()>
    where
        G: AuthGateway + ?Sized,
    {
        let reset_token = reset_token.trim();
        if reset_token.is_empty() {
            return Err(ValidationError::EmptyField("reset token").into());
        }
        let new_password = new_password.into();
        if new_password.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }
        gateway
            .reset_password(reset_token, &SecretString::from(new_password))
            .await
    }

    /// Persist `session` as one unit, then make it current.
    fn establish(&mut self, session: Session) -> std::result::Result<(), StorageError> {
        let user = serde_json::to_string(&session.user).map_err(StorageError::Encode)?;
        self.storage.apply(&[
            (keys::ACCESS_TOKEN, Some(session.access_token.expose())),
            (
                keys::REFRESH_TOKEN,
                session.refresh_token.as_ref().map(RefreshToken::expose),
            ),
            (keys::USER, Some(user.as_str())),
        ])?;
        self.session = Some(session);
        Ok(())
    }
}

/// Removal of every persisted session key.
const CLEAR_ALL: [Change<'static>; 3] = [
    (keys::ACCESS_TOKEN, None),
    (keys::REFRESH_TOKEN, None),
    (keys::USER, None),
];

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ClientError, NetworkError};
    use crate::storage::MemoryStore;

    /// Auth gateway answering login/refresh from fixed responses.
    #[derive(Default)]
    struct FakeAuth {
        login: Mutex<Option<Result<AuthResponse>>>,
        logout_fails: bool,
        logout_calls: Mutex<usize>,
    }

    impl FakeAuth {
        fn accepting(response: AuthResponse) -> Self {
            Self {
                login: Mutex::new(Some(Ok(response))),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AuthGateway for FakeAuth {
        async fn login(&self, _: &Credentials) -> Result<AuthResponse> {
            self.login
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(AuthError::Rejected("Login failed".into()).into()))
        }

        async fn register(&self, registration: &Registration) -> Result<AuthResponse> {
            Ok(response(registration.email().as_str(), Some("refresh")))
        }

        async fn logout(&self, _: &AccessToken) -> Result<()> {
            *self.logout_calls.lock().unwrap() += 1;
            if self.logout_fails {
                return Err(NetworkError::Status {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn refresh_token(&self, token: &RefreshToken) -> Result<AuthResponse> {
            assert_eq!(token.expose(), "refresh");
            let mut renewed = response("shopper@example.com", None);
            renewed.access_token = "renewed".to_string();
            Ok(renewed)
        }

        async fn current_user(&self, _: &AccessToken) -> Result<UserProfile> {
            let mut user = response("shopper@example.com", None).user;
            user.first_name = Some("Pat".to_string());
            Ok(user)
        }

        async fn verify_email(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn resend_verification(&self, _: &Email) -> Result<()> {
            Ok(())
        }

        async fn forgot_password(&self, _: &Email) -> Result<()> {
            Ok(())
        }

        async fn reset_password(&self, _: &str, _: &SecretString) -> Result<()> {
            Ok(())
        }
    }

    /// Storage whose writes always fail.
    #[derive(Default)]
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set(&mut self, _: &str, _: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::Io {
                path: "session.json".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }

        fn remove(&mut self, key: &str) -> std::result::Result<(), StorageError> {
            self.0.remove(key)
        }
    }

    fn response(email: &str, refresh: Option<&str>) -> AuthResponse {
        AuthResponse {
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            user: UserProfile {
                id: UserId::new(7),
                email: email.to_string(),
                first_name: None,
                last_name: None,
                phone: None,
                role: UserRole::Customer,
                is_email_verified: Some(false),
                profile_image_url: None,
                created_at: None,
            },
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("shopper@example.com", "hunter2").unwrap()
    }

    async fn signed_in(gateway: &FakeAuth) -> SessionStore<MemoryStore> {
        let mut store = SessionStore::restore(MemoryStore::new()).unwrap();
        store.login(gateway, &credentials()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_login_persists_session() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", Some("refresh")));
        let store = signed_in(&gateway).await;

        assert_eq!(store.state(), SessionState::Authenticated);
        let session = store.current().unwrap();
        assert_eq!(session.user_id(), UserId::new(7));
        assert_eq!(session.role(), UserRole::Customer);

        let storage = store.storage();
        assert_eq!(
            storage.get(keys::ACCESS_TOKEN).unwrap().as_deref(),
            Some("access")
        );
        assert_eq!(
            storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(),
            Some("refresh")
        );
        let user: UserProfile =
            serde_json::from_str(&storage.get(keys::USER).unwrap().unwrap()).unwrap();
        assert_eq!(user.email, "shopper@example.com");
    }

    #[tokio::test]
    async fn test_failed_login_keeps_prior_state() {
        let gateway = FakeAuth::default();
        let mut store = SessionStore::restore(MemoryStore::new()).unwrap();

        let err = store.login(&gateway, &credentials()).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::Rejected(ref m)) if m == "Login failed"));
        assert_eq!(store.state(), SessionState::Anonymous);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_unpersistable_login_keeps_prior_state() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", None));
        let mut store = SessionStore::restore(ReadOnlyStore::default()).unwrap();

        let err = store.login(&gateway, &credentials()).await.unwrap_err();
        assert!(matches!(err, ClientError::Storage(StorageError::Io { .. })));
        assert_eq!(store.state(), SessionState::Anonymous);
    }

    /// Storage that can be told to refuse writes of the user profile.
    struct ProfileRefusingStore {
        inner: MemoryStore,
        refuse: Arc<AtomicBool>,
    }

    impl KeyValueStore for ProfileRefusingStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            if key == keys::USER && self.refuse.load(Ordering::SeqCst) {
                return Err(StorageError::Io {
                    path: "session.json".to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> std::result::Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_partially_persisted_login_is_rolled_back() {
        let mut alice = response("alice@example.com", Some("refresh-a"));
        alice.access_token = "token-a".to_string();
        let mut bob = response("bob@example.com", Some("refresh-b"));
        bob.access_token = "token-b".to_string();

        let refuse = Arc::new(AtomicBool::new(false));
        let storage = ProfileRefusingStore {
            inner: MemoryStore::new(),
            refuse: Arc::clone(&refuse),
        };
        let mut store = SessionStore::restore(storage).unwrap();
        store
            .login(&FakeAuth::accepting(alice), &credentials())
            .await
            .unwrap();

        refuse.store(true, Ordering::SeqCst);
        let err = store
            .login(&FakeAuth::accepting(bob), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Storage(StorageError::Io { .. })));
        assert_eq!(store.current().unwrap().access_token().expose(), "token-a");

        let restored = SessionStore::restore(store.storage).unwrap();
        let session = restored.current().unwrap();
        assert_eq!(session.user().email, "alice@example.com");
        assert_eq!(session.access_token().expose(), "token-a");
        assert_eq!(session.refresh_token().unwrap().expose(), "refresh-a");
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_notify_fails() {
        let gateway = FakeAuth {
            logout_fails: true,
            ..FakeAuth::accepting(response("shopper@example.com", Some("refresh")))
        };
        let mut store = signed_in(&gateway).await;

        let err = store.logout(&gateway).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(NetworkError::Status { status: 503, .. })));
        assert_eq!(store.state(), SessionState::Anonymous);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_logout_while_anonymous_makes_no_request() {
        let gateway = FakeAuth::default();
        let mut store = SessionStore::restore(MemoryStore::new()).unwrap();

        store.logout(&gateway).await.unwrap();
        assert_eq!(*gateway.logout_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_round_trips_through_storage() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", Some("refresh")));
        let store = signed_in(&gateway).await;
        let storage = store.storage().clone();

        let restored = SessionStore::restore(storage).unwrap();
        assert_eq!(restored.current(), store.current());
    }

    #[test]
    fn test_restore_discards_incomplete_session() {
        let mut storage = MemoryStore::new();
        storage.set(keys::ACCESS_TOKEN, "access").unwrap();
        storage.set(keys::USER, "undefined").unwrap();

        let store = SessionStore::restore(storage).unwrap();
        assert_eq!(store.state(), SessionState::Anonymous);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", Some("refresh")));
        let mut store = signed_in(&gateway).await;

        let session = store.refresh(&gateway).await.unwrap();
        assert_eq!(session.access_token().expose(), "renewed");
        assert_eq!(session.refresh_token().unwrap().expose(), "refresh");
        assert_eq!(
            store.storage().get(keys::ACCESS_TOKEN).unwrap().as_deref(),
            Some("renewed")
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", None));
        let mut store = signed_in(&gateway).await;

        let err = store.refresh(&gateway).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_verify_email_marks_profile_verified() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", None));
        let mut store = signed_in(&gateway).await;
        assert!(!store.current().unwrap().user().email_verified());

        store.verify_email(&gateway, "abc123").await.unwrap();
        assert!(store.current().unwrap().user().email_verified());

        let err = store.verify_email(&gateway, "  ").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyField("verification token"))
        ));
    }

    #[tokio::test]
    async fn test_refresh_profile_updates_user() {
        let gateway = FakeAuth::accepting(response("shopper@example.com", None));
        let mut store = signed_in(&gateway).await;

        let user = store.refresh_profile(&gateway).await.unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Pat"));
    }

    #[tokio::test]
    async fn test_account_recovery_validates_input() {
        let gateway = FakeAuth::default();
        let store = SessionStore::restore(MemoryStore::new()).unwrap();

        assert!(store.forgot_password(&gateway, "a@example.com").await.is_ok());
        assert!(matches!(
            store.forgot_password(&gateway, "nope").await.unwrap_err(),
            ClientError::Validation(ValidationError::Email(_))
        ));
        assert!(matches!(
            store.reset_password(&gateway, "tok", "").await.unwrap_err(),
            ClientError::Validation(ValidationError::EmptyPassword)
        ));
    }

    #[test]
    fn test_authorize() {
        assert!(matches!(
            authorize(None).unwrap_err(),
            ClientError::Auth(AuthError::NotAuthenticated)
        ));
    }
}
