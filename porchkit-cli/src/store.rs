//! File-backed secure store for the developer CLI.
//!
//! Real apps back [`SecureStore`] with the platform keychain/keystore;
//! for a developer tool a JSON file under the user config directory is
//! enough. Do not use this for anything beyond local development.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use porchkit_core::store::SecureStore;
use porchkit_core::{PorchkitError, PorchkitResult};

/// Secure-store implementation persisting to a single JSON file.
pub struct FileSecureStore {
    path: PathBuf,
}

impl FileSecureStore {
    /// Creates a store at an explicit file path.
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates the store at `<config dir>/porchkit/credentials.json`.
    pub fn default_path() -> eyre::Result<Self> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| eyre::eyre!("no user config directory available"))?;
        path.push("porchkit");
        std::fs::create_dir_all(&path)?;
        path.push("credentials.json");
        Ok(Self::new(path))
    }

    fn read_map(&self) -> PorchkitResult<HashMap<String, Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(store_error),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(store_error(err)),
        }
    }

    fn write_map(&self, map: &HashMap<String, Vec<u8>>) -> PorchkitResult<()> {
        let bytes = serde_json::to_vec_pretty(map).map_err(store_error)?;
        std::fs::write(&self.path, bytes).map_err(store_error)
    }
}

fn store_error(err: impl std::fmt::Display) -> PorchkitError {
    PorchkitError::SecureStore {
        error: err.to_string(),
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> PorchkitResult<Option<Vec<u8>>> {
        let mut map = self.read_map()?;
        Ok(map.remove(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> PorchkitResult<()> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);
        self.write_map(&map)
    }

    async fn delete(&self, key: &str) -> PorchkitResult<()> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
