use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::store::{StoreError, StoreKey, TokenStore};
use crate::models::User;

/// The access/refresh token pair issued by the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Keep tokens out of logs
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

/// Session state persisted in a [`TokenStore`].
///
/// This is the only place that writes the three session keys. Cloning shares
/// the underlying store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Derive the session state from the store. Called at startup.
    pub fn load(&self) -> SessionState {
        let state = self.state();
        debug!(?state, "Session loaded");
        state
    }

    pub fn state(&self) -> SessionState {
        if self.access_token().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(StoreKey::AccessToken)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(StoreKey::RefreshToken)
    }

    /// Replace the stored pair. Access token is written first.
    pub fn save_credentials(&self, credentials: &CredentialPair) -> Result<(), StoreError> {
        self.store
            .set(StoreKey::AccessToken, &credentials.access_token)?;
        self.store
            .set(StoreKey::RefreshToken, &credentials.refresh_token)?;
        Ok(())
    }

    /// Replace the access token after a refresh.
    pub fn update_access_token(&self, access_token: &str) -> Result<(), StoreError> {
        self.store.set(StoreKey::AccessToken, access_token)
    }

    /// Overwrite the cached user snapshot.
    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(user)?;
        self.store.set(StoreKey::UserData, &encoded)
    }

    /// The cached user snapshot, if one is stored and readable.
    pub fn user(&self) -> Option<User> {
        let encoded = self.store.get(StoreKey::UserData)?;
        match serde_json::from_str(&encoded) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable user snapshot");
                None
            }
        }
    }

    /// Delete both tokens, keeping the user snapshot.
    pub fn clear_tokens(&self) -> Result<(), StoreError> {
        self.delete_all(&[StoreKey::AccessToken, StoreKey::RefreshToken])
    }

    /// Delete every session key.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.delete_all(&StoreKey::ALL)
    }

    /// Attempt every delete even if one fails, then report the first failure.
    fn delete_all(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.store.delete(*key) {
                warn!(key = %key, error = %e, "Failed to delete session value");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
