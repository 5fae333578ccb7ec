//! Declared desired state and observed status for the four managed object types.
//!
//! - **[`cluster`]**: a MariaDB cluster and the names of everything derived from it
//! - **[`database`]**: a schema inside a cluster
//! - **[`user`]**: an account with its hosts, grants and resource limits
//! - **[`backup`]**: a scheduled or one-shot backup job for a cluster
//!
//! Field names serialize in camelCase so existing manifests load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod backup;
pub mod cluster;
pub mod database;
pub mod user;

pub use backup::{MariaDbBackup, MariaDbBackupSpec};
pub use cluster::{ConfValue, MariaDbCluster, MariaDbClusterSpec, ServiceConf, ServiceType};
pub use database::{MariaDbDatabase, MariaDbDatabaseSpec};
pub use user::{MariaDbUser, MariaDbUserSpec, MariaDbUserStatus, Permission, UserLimits};

/// Name and namespace of a declared object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Metadata {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> crate::types::ObjectKey {
        crate::types::ObjectKey::new(&self.namespace, &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Outcome of the most recent reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(status: ConditionStatus, reason: &str, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            message: message.into(),
            last_update_time: Some(now),
        }
    }
}
