use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::types::{ClusterReference, ObjectKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MariaDbDatabase {
    pub metadata: Metadata,
    pub spec: MariaDbDatabaseSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbDatabaseSpec {
    pub cluster_ref: ClusterReference,
    pub database: String,
    #[serde(default)]
    pub character_set: String,
    #[serde(default)]
    pub collation: String,
}

impl MariaDbDatabase {
    pub fn cluster_key(&self) -> ObjectKey {
        self.spec.cluster_ref.resolve(&self.metadata.namespace)
    }
}
