//! Cartwheel client library.
//!
//! Keeps a front end's view of the shop service in sync: the signed-in
//! session (mirrored to durable storage) and the server-owned cart (mirrored
//! in memory, replaced by every response).
//!
//! # Modules
//!
//! - [`api`] - REST gateway traits and the `reqwest` client
//! - [`session`] - Session store and its persisted mirror
//! - [`cart`] - Cart snapshot and cart store
//! - [`state`] - [`AppState`], the object a front end owns
//! - [`storage`] - Key-value backends for the session mirror
//! - [`config`] - Environment configuration
//! - [`error`] - Error taxonomy

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;

pub use api::ApiClient;
pub use cart::{CartLine, CartSnapshot, CartStore};
pub use config::ClientConfig;
pub use error::{AuthError, ClientError, NetworkError, StorageError, ValidationError};
pub use session::{Session, SessionState, SessionStore};
pub use state::AppState;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::{AccessToken, RefreshToken};
