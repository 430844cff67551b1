//! Subcommand implementations.
//!
//! Every command runs against one [`Shop`]: the REST client plus the
//! session persisted in `CARTWHEEL_STATE_FILE`. Output goes through
//! `tracing` at info level.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod reviews;

use cartwheel_client::config::ConfigError;
use cartwheel_client::{ApiClient, AppState, ClientConfig, ClientError, FileStore, StorageError};
use thiserror::Error;

/// Application state as the CLI uses it.
pub type Shop = AppState<ApiClient, FileStore>;

/// Errors that can end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A client action failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        Self::Client(ClientError::Storage(err))
    }
}

impl CliError {
    /// Message shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.to_string(),
            Self::Client(e) => e.user_message(),
        }
    }
}

/// Load configuration and restore the persisted session.
///
/// # Errors
///
/// Returns an error if configuration is missing or the session file is
/// unreadable.
pub fn open() -> Result<Shop, CliError> {
    let config = ClientConfig::from_env()?;
    let client = ApiClient::new(&config)?;
    let storage = FileStore::open(&config.state_file)?;
    tracing::debug!(
        api_url = %config.api_url,
        state_file = %config.state_file.display(),
        "Opened shop"
    );
    Ok(AppState::new(client, storage)?)
}
