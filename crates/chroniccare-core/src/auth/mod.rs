//! Authentication module for session persistence.
//!
//! This module provides:
//! - `TokenStore`: Durable storage for the access token, refresh token and
//!   user snapshot, with keychain, encrypted-file and in-memory backends
//! - `Session`: The session object built on a token store
//!
//! A session is authenticated exactly when an access token is stored.

pub mod encrypted;
pub mod session;
pub mod store;

pub use encrypted::EncryptedFileStore;
pub use session::{CredentialPair, Session, SessionState};
pub use store::{KeyringTokenStore, MemoryTokenStore, StoreError, StoreKey, TokenStore};
