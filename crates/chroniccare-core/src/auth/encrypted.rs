//! Passphrase-encrypted single-file token store.
//!
//! Used where no OS keychain is available. The whole key-value map is
//! serialized as JSON and sealed with ChaCha20-Poly1305 under a key derived
//! from the passphrase with Argon2.
//!
//! File layout: `salt (16) || nonce (12) || ciphertext`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use super::store::{StoreError, StoreKey, TokenStore};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

type Salt = [u8; SALT_LEN];

pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: String,
    /// Derived key for the salt currently on disk. Argon2 is slow on purpose,
    /// so it runs once per salt rather than once per operation.
    derived: Mutex<Option<(Salt, [u8; KEY_LEN])>>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl EncryptedFileStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passphrase: passphrase.into(),
            derived: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_for(&self, salt: &Salt) -> Result<[u8; KEY_LEN], StoreError> {
        let mut derived = self.derived.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_salt, key)) = derived.as_ref() {
            if cached_salt == salt {
                return Ok(*key);
            }
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;
        *derived = Some((*salt, key));
        Ok(key)
    }

    /// Load the stored map. A missing file is an empty map with no salt yet.
    fn load(&self) -> Result<(Option<Salt>, HashMap<String, String>), StoreError> {
        if !self.path.exists() {
            return Ok((None, HashMap::new()));
        }

        let bytes = std::fs::read(&self.path)?;
        if bytes.len() < SALT_LEN + NONCE_LEN {
            return Err(StoreError::Decrypt);
        }

        let (salt_bytes, rest) = bytes.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);

        let key = self.key_for(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StoreError::Decrypt)?;

        let values = serde_json::from_slice(&plaintext)?;
        Ok((Some(salt), values))
    }

    fn save(&self, salt: Salt, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let key = self.key_for(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let plaintext = serde_json::to_vec(values)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| StoreError::Encrypt)?;

        let mut contents = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        contents.extend_from_slice(&salt);
        contents.extend_from_slice(&nonce);
        contents.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let (salt, mut values) = self.load()?;
        let salt = salt.unwrap_or_else(|| {
            let mut fresh = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut fresh);
            fresh
        });
        apply(&mut values);
        self.save(salt, &values)
    }
}

impl TokenStore for EncryptedFileStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        match self.load() {
            Ok((_, mut values)) => values.remove(key.as_str()),
            Err(e) => {
                warn!(key = %key, path = ?self.path, error = %e, "Failed to read encrypted store");
                None
            }
        }
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
        })?;
        debug!(key = %key, "Stored value in encrypted file");
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|values| {
            values.remove(key.as_str());
        })?;
        debug!(key = %key, "Deleted value from encrypted file");
        Ok(())
    }
}
