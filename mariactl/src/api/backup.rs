use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::types::{ClusterReference, ObjectKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MariaDbBackup {
    pub metadata: Metadata,
    pub spec: MariaDbBackupSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbBackupSpec {
    pub cluster_ref: ClusterReference,
    #[serde(rename = "backupURL")]
    pub backup_url: String,
    pub backup_secret_name: String,
    #[serde(default, rename = "backupDBName")]
    pub backup_db_name: String,
    /// Empty means run once.
    #[serde(default, rename = "cron")]
    pub cron: String,
}

impl MariaDbBackup {
    pub fn cluster_key(&self) -> ObjectKey {
        self.spec.cluster_ref.resolve(&self.metadata.namespace)
    }

    pub fn is_scheduled(&self) -> bool {
        !self.spec.cron.is_empty()
    }
}
