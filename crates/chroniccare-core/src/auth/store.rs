use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Default keyring service name
pub const DEFAULT_SERVICE: &str = "chroniccare";

/// The closed set of values the session persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    UserData,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [
        StoreKey::AccessToken,
        StoreKey::RefreshToken,
        StoreKey::UserData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "access_token",
            StoreKey::RefreshToken => "refresh_token",
            StoreKey::UserData => "user_data",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode stored values: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to encrypt stored values")]
    Encrypt,

    #[error("Failed to decrypt stored values (wrong passphrase or corrupted file)")]
    Decrypt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Durable key-value storage for session secrets.
///
/// Reads never fail: a backend error is logged and reported as absent, so
/// startup can always decide between anonymous and authenticated. Writes are
/// single-key and report their errors. Deleting an absent key succeeds.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Option<String>;

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    fn delete(&self, key: StoreKey) -> Result<(), StoreError>;
}

/// Token store backed by the OS keychain.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: StoreKey) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key.as_str())?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        let entry = match self.entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to open keyring entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read from keychain");
                None
            }
        }
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        debug!(key = %key, "Stored value in keychain");
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = %key, "Deleted value from keychain");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process token store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&key).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(&key);
        Ok(())
    }
}
