//! Token persistence port and the in-memory adapter
//!
//! The platform supplies the actual key/value byte store; the bootstrapper
//! only ever touches one key through a [`CredentialSlot`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_model::Credential;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Key/value byte store provided by the host platform.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the bytes stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, handy for headless clients and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a single entry.
    pub fn with_entry(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value.into());
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// The single stored-credential key, bound to a store.
///
/// Store failures never abort a transition: reads degrade to "absent",
/// writes and removals are logged and otherwise ignored.
#[derive(Clone)]
pub struct CredentialSlot {
    store: Arc<dyn TokenStore>,
    key: String,
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("store", &"TokenStore(..)")
            .field("key", &self.key)
            .finish()
    }
}

impl CredentialSlot {
    pub fn new(store: Arc<dyn TokenStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored credential. Undecodable values are purged.
    pub async fn load(&self) -> Option<Credential> {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No stored credential under '{}'", self.key);
                return None;
            }
            Err(e) => {
                warn!("Treating unreadable credential store as empty: {}", e);
                return None;
            }
        };

        match Credential::from_bytes(&bytes) {
            Ok(credential) => {
                debug!("Loaded stored credential {}", credential);
                Some(credential)
            }
            Err(e) => {
                warn!("Discarding stored credential under '{}': {}", self.key, e);
                self.purge().await;
                None
            }
        }
    }

    pub async fn persist(&self, credential: &Credential) {
        match self.store.set(&self.key, credential.as_bytes()).await {
            Ok(()) => debug!("Persisted credential {}", credential),
            Err(e) => warn!("Failed to persist credential: {}", e),
        }
    }

    pub async fn purge(&self) {
        match self.store.remove(&self.key).await {
            Ok(()) => debug!("Purged stored credential under '{}'", self.key),
            Err(e) => warn!("Failed to purge stored credential: {}", e),
        }
    }
}
