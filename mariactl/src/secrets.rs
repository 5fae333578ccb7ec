//! Secret lookup.
//!
//! Credentials never live in the declared state itself; clusters and users point at a key
//! inside a named secret. [`DirectorySecretStore`] follows the mounted-volume layout, one
//! directory per secret and one file per key: `<root>/<namespace>/<secret>/<key>`.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{Error, Result};
use crate::resources::store::StoreError;
use crate::types::{ObjectKey, SecretKeySelector};

/// Key/value contents of one secret.
pub type SecretData = BTreeMap<String, String>;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a whole secret, `None` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> std::result::Result<Option<SecretData>, StoreError>;
}

/// Resolve `selector` in `namespace` to its value.
///
/// A missing secret is [`Error::NotFound`]; a missing key is a validation error since the
/// reference itself is wrong.
pub async fn read_key(store: &dyn SecretStore, namespace: &str, selector: &SecretKeySelector) -> Result<String> {
    let key = ObjectKey::new(namespace, &selector.name);
    let data = store.get(&key).await?.ok_or_else(|| Error::NotFound {
        resource: "secret",
        key: key.to_string(),
    })?;

    data.get(&selector.key)
        .cloned()
        .ok_or_else(|| Error::validation(format!("missing key {} in secret {key}", selector.key)))
}

#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<ObjectKey, SecretData>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: ObjectKey, data: SecretData) {
        self.secrets.write().await.insert(key, data);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &ObjectKey) -> std::result::Result<Option<SecretData>, StoreError> {
        Ok(self.secrets.read().await.get(key).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct DirectorySecretStore {
    root: PathBuf,
}

impl DirectorySecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretStore for DirectorySecretStore {
    async fn get(&self, key: &ObjectKey) -> std::result::Result<Option<SecretData>, StoreError> {
        let dir = self.root.join(&key.namespace).join(&key.name);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut data = SecretData::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io { path: dir.clone(), source })?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            // dotfiles are the atomic-writer's bookkeeping, not keys
            if name.starts_with('.') {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| StoreError::Io { path: path.clone(), source })?;
            let value = raw.strip_suffix('\n').unwrap_or(&raw).to_string();
            data.insert(name, value);
        }

        Ok(Some(data))
    }
}
