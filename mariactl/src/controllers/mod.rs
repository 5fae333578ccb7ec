//! Reconcile entry points, one controller per declared object type.
//!
//! Controllers own the I/O around the provisioning and convergence cores: they look up
//! the referenced cluster, read credentials, acquire and release a SQL runner, and turn
//! the outcome into status. Every entry point takes a cancellation token and never holds
//! anything across calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::instrument;

use crate::api::MariaDbCluster;
use crate::errors::{Error, Result};
use crate::mysql::ConnectionConfig;
use crate::secrets::{SecretStore, read_key};
use crate::types::ObjectKey;

pub mod backup;
pub mod cluster;
pub mod database;
pub mod user;

pub use backup::BackupController;
pub use cluster::ClusterController;
pub use database::DatabaseController;
pub use user::UserController;

/// Declared clusters by key.
pub type ClusterIndex = BTreeMap<ObjectKey, MariaDbCluster>;

/// Turns a cluster key into connection settings for that cluster's primary.
#[derive(Clone)]
pub struct ConnectionResolver {
    clusters: Arc<ClusterIndex>,
    secrets: Arc<dyn SecretStore>,
    admin_user: String,
    port: u16,
}

impl ConnectionResolver {
    pub fn new(clusters: Arc<ClusterIndex>, secrets: Arc<dyn SecretStore>, admin_user: impl Into<String>, port: u16) -> Self {
        Self {
            clusters,
            secrets,
            admin_user: admin_user.into(),
            port,
        }
    }

    pub fn cluster(&self, key: &ObjectKey) -> Result<&MariaDbCluster> {
        self.clusters.get(key).ok_or_else(|| Error::NotFound {
            resource: "cluster",
            key: key.to_string(),
        })
    }

    /// Credentials come from the cluster's root-password secret; the host is the headless
    /// service in front of the primary.
    #[instrument(skip(self), err)]
    pub async fn resolve(&self, key: &ObjectKey) -> Result<ConnectionConfig> {
        let cluster = self.cluster(key)?;
        let password = read_key(self.secrets.as_ref(), cluster.namespace(), &cluster.spec.root_password).await?;
        if password.is_empty() {
            return Err(Error::validation(format!("root password for cluster {key} is empty")));
        }

        Ok(ConnectionConfig {
            user: self.admin_user.clone(),
            password,
            host: cluster.headless_service_name(),
            port: self.port,
        })
    }
}

/// `err` followed by each of its sources, separated by `: `.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mysql::SqlError;
    use crate::secrets::{MemorySecretStore, SecretData};
    use crate::test_utils::{clusters, test_cluster, test_secrets};

    async fn resolver(secrets: MemorySecretStore) -> ConnectionResolver {
        ConnectionResolver::new(Arc::new(clusters(&[test_cluster("db", "main")])), Arc::new(secrets), "root", 3306)
    }

    #[tokio::test]
    async fn test_resolve_builds_connection_config() {
        let resolver = resolver(test_secrets().await).await;

        let config = resolver.resolve(&ObjectKey::new("db", "main")).await.unwrap();

        assert_eq!(config.user, "root");
        assert_eq!(config.password, "r00t");
        assert_eq!(config.host, "mariadb-headless-main-primary");
        assert_eq!(config.port, 3306);
    }

    #[tokio::test]
    async fn test_resolve_unknown_cluster() {
        let resolver = resolver(test_secrets().await).await;
        let err = resolver.resolve(&ObjectKey::new("db", "other")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_missing_secret() {
        let resolver = resolver(MemorySecretStore::new()).await;
        let err = resolver.resolve(&ObjectKey::new("db", "main")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_missing_or_empty_key() {
        let secrets = MemorySecretStore::new();
        secrets.insert(ObjectKey::new("db", "root"), SecretData::new()).await;
        let err = resolver(secrets).await.resolve(&ObjectKey::new("db", "main")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let secrets = MemorySecretStore::new();
        secrets
            .insert(ObjectKey::new("db", "root"), SecretData::from([("password".to_string(), String::new())]))
            .await;
        let err = resolver(secrets).await.resolve(&ObjectKey::new("db", "main")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_describe_includes_sources() {
        let err = Error::execution(
            "create database app",
            SqlError::Database {
                code: "1044".to_string(),
                message: "access denied".to_string(),
            },
        );
        assert_eq!(describe(&err), "failed to create database app: server error 1044: access denied");
    }
}
