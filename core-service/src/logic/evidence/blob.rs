//! Material storage for sealed evidence.
//!
//! Keys are evidence ids. The vault never trusts what comes back: every
//! read is re-hashed by `verify_integrity`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::VaultError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError>;
    async fn delete(&self, key: &str) -> Result<(), VaultError>;
}

// ============================================================================
// MEMORY
// ============================================================================

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored bytes behind the vault's back
    pub fn tamper(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.blobs.write().get_mut(key) {
            Some(bytes) => {
                f(bytes);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.blobs.write().remove(key);
        Ok(())
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// One file per blob under a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| VaultError::Blob(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, VaultError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(VaultError::Blob(format!("invalid blob key {:?}", key)));
        }
        Ok(self.root.join(format!("{}.bin", key)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), VaultError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| VaultError::Blob(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| VaultError::Blob(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Blob(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Blob(e.to_string())),
        }
    }
}
