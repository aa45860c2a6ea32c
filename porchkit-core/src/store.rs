//! Secure on-device key-value storage seam.
//!
//! The host platform backs this with its keychain/keystore facility.
//! Only the identity client's internal persistence touches the store;
//! screens and the session manager never access it directly, which keeps
//! credential-storage logic in exactly one place.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::PorchkitResult;

/// Secure key-value storage provided by the host platform.
///
/// All operations are asynchronous and may fail; keys are opaque strings
/// namespaced by the caller.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store cannot be read.
    async fn get(&self, key: &str) -> PorchkitResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store refuses the write.
    async fn set(&self, key: &str, value: Vec<u8>) -> PorchkitResult<()>;

    /// Deletes the value stored under `key`. Deleting a missing key is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store refuses the delete.
    async fn delete(&self, key: &str) -> PorchkitResult<()>;
}

/// In-memory secure store backed by a `HashMap`.
///
/// **FOR TESTING ONLY** — nothing is encrypted or persisted. Designed to
/// test session persistence without a device keychain.
#[derive(Default)]
pub struct MemorySecureStore {
    /// Stored values, keyed by name.
    values: RwLock<HashMap<String, Vec<u8>>>,
}

// Lock poisoning is unrecoverable in test support code.
#[allow(clippy::missing_panics_doc)]
impl MemorySecureStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().unwrap().is_empty()
    }

    /// Clears all stored values (useful for test isolation).
    pub fn clear(&self) {
        self.values.write().unwrap().clear();
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> PorchkitResult<Option<Vec<u8>>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> PorchkitResult<()> {
        self.values.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> PorchkitResult<()> {
        self.values.write().unwrap().remove(key);
        Ok(())
    }
}
