//! Persistence for managed sub-resources.
//!
//! [`ResourceStore`] is the only way the convergence engine touches live state. Two
//! implementations are provided: [`DirectoryStore`] keeps one JSON document per manifest
//! under `<root>/<namespace>/<kind>/<name>.json`, and [`MemoryStore`] keeps everything in
//! a map and counts writes so tests can assert that converged resources are left alone.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{Manifest, ResourceKind};
use crate::types::ObjectKey;

#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` found an object under the same kind and key
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    /// `replace` found nothing to replace
    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a manifest, `None` if absent.
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Option<Manifest>, StoreError>;

    /// Store a new manifest. Fails with [`StoreError::AlreadyExists`] if one is present.
    async fn create(&self, manifest: &Manifest) -> Result<(), StoreError>;

    /// Overwrite an existing manifest. Fails with [`StoreError::NotFound`] if absent.
    async fn replace(&self, manifest: &Manifest) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<(ResourceKind, ObjectKey), Manifest>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `create` and `replace` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Option<Manifest>, StoreError> {
        Ok(self.objects.read().await.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let id = (manifest.kind, manifest.key());
        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists { kind: id.0, key: id.1 });
        }
        objects.insert(id, manifest.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let id = (manifest.kind, manifest.key());
        match objects.get_mut(&id) {
            Some(slot) => {
                *slot = manifest.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: id.0, key: id.1 }),
        }
    }
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, kind: ResourceKind, key: &ObjectKey) -> PathBuf {
        self.root
            .join(&key.namespace)
            .join(kind.as_str())
            .join(format!("{}.json", key.name))
    }

    fn encode(path: &Path, manifest: &Manifest) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(manifest).map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for DirectoryStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> Result<Option<Manifest>, StoreError> {
        let path = self.path_for(kind, key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Serialization { path, source })
    }

    #[instrument(skip(self, manifest), fields(kind = %manifest.kind, key = %manifest.key()), err)]
    async fn create(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let path = self.path_for(manifest.kind, &manifest.key());
        let bytes = Self::encode(&path, manifest)?;
        Self::ensure_parent(&path).await?;

        let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    kind: manifest.kind,
                    key: manifest.key(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        file.write_all(&bytes).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        file.flush().await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Wrote manifest");
        Ok(())
    }

    #[instrument(skip(self, manifest), fields(kind = %manifest.kind, key = %manifest.key()), err)]
    async fn replace(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let path = self.path_for(manifest.kind, &manifest.key());
        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    kind: manifest.kind,
                    key: manifest.key(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        }

        // write-then-rename so readers never observe a half-written document
        let bytes = Self::encode(&path, manifest)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, &bytes).await.map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;

        debug!(path = %path.display(), "Replaced manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ObjectMeta;
    use serde_json::json;

    fn manifest(name: &str, replicas: u64) -> Manifest {
        Manifest {
            kind: ResourceKind::StatefulSet,
            metadata: ObjectMeta::new("db", name),
            spec: json!({ "replicas": replicas }),
        }
    }

    #[tokio::test]
    async fn test_memory_store_create_get_replace() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("db", "main-primary");

        assert!(store.get(ResourceKind::StatefulSet, &key).await.unwrap().is_none());
        store.create(&manifest("main-primary", 1)).await.unwrap();
        store.replace(&manifest("main-primary", 3)).await.unwrap();

        let stored = store.get(ResourceKind::StatefulSet, &key).await.unwrap().unwrap();
        assert_eq!(stored.spec["replicas"], 3);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_conflicts() {
        let store = MemoryStore::new();

        let err = store.replace(&manifest("absent", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.create(&manifest("main-primary", 1)).await.unwrap();
        let err = store.create(&manifest("main-primary", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_kinds_do_not_collide() {
        let store = MemoryStore::new();
        let mut service = manifest("main", 1);
        service.kind = ResourceKind::Service;

        store.create(&manifest("main", 1)).await.unwrap();
        store.create(&service).await.unwrap();
        assert_eq!(store.writes(), 2);
        assert_eq!(store.get(ResourceKind::Service, &service.key()).await.unwrap(), Some(service));
    }

    #[tokio::test]
    async fn test_directory_store_layout_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        let key = ObjectKey::new("db", "main-primary");

        assert!(store.get(ResourceKind::StatefulSet, &key).await.unwrap().is_none());
        store.create(&manifest("main-primary", 1)).await.unwrap();
        assert!(dir.path().join("db/statefulset/main-primary.json").exists());

        let err = store.create(&manifest("main-primary", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        store.replace(&manifest("main-primary", 5)).await.unwrap();
        let stored = store.get(ResourceKind::StatefulSet, &key).await.unwrap().unwrap();
        assert_eq!(stored, manifest("main-primary", 5));
        assert!(!dir.path().join("db/statefulset/main-primary.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_directory_store_replace_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        let err = store.replace(&manifest("main-primary", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_directory_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/statefulset");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("broken.json"), b"{not json").unwrap();

        let store = DirectoryStore::new(dir.path());
        let err = store
            .get(ResourceKind::StatefulSet, &ObjectKey::new("db", "broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }
}
