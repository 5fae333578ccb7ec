use serde::{Deserialize, Serialize};

use super::{Condition, Metadata};
use crate::types::{ClusterReference, ObjectKey, SecretKeySelector};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MariaDbUser {
    pub metadata: Metadata,
    pub spec: MariaDbUserSpec,
    #[serde(default)]
    pub status: MariaDbUserStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbUserSpec {
    pub cluster_ref: ClusterReference,
    pub user: String,
    pub password: SecretKeySelector,
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub limits: UserLimits,
}

/// Privileges on a set of tables in one schema. Use `"*"` as a table name for all tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub schema: String,
    pub tables: Vec<String>,
    pub permissions: Vec<String>,
}

/// Per-account resource limits. Zero means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UserLimits {
    #[serde(default)]
    pub max_queries_per_hour: u64,
    #[serde(default)]
    pub max_updates_per_hour: u64,
    #[serde(default)]
    pub max_connections_per_hour: u64,
    #[serde(default)]
    pub max_user_connections: u64,
    /// Accepted but not applied: `ALTER USER ... WITH` has no statement-time option.
    #[serde(default)]
    pub max_statement_time: u64,
}

impl UserLimits {
    /// Non-zero limits in the order they are written to `ALTER USER ... WITH`.
    pub fn emitted(&self) -> Vec<(&'static str, u64)> {
        [
            ("MAX_QUERIES_PER_HOUR", self.max_queries_per_hour),
            ("MAX_UPDATES_PER_HOUR", self.max_updates_per_hour),
            ("MAX_CONNECTIONS_PER_HOUR", self.max_connections_per_hour),
            ("MAX_USER_CONNECTIONS", self.max_user_connections),
        ]
        .into_iter()
        .filter(|(_, value)| *value != 0)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbUserStatus {
    #[serde(default)]
    pub condition: Condition,
    /// Hosts applied by the last successful reconcile.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl MariaDbUser {
    pub fn cluster_key(&self) -> ObjectKey {
        self.spec.cluster_ref.resolve(&self.metadata.namespace)
    }
}
