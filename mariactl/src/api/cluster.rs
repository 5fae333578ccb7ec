//! Cluster model and the names derived from it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::errors::{Error, Result};
use crate::types::{ObjectKey, SecretKeySelector};

pub const DEFAULT_IMAGE: &str = "ghcr.io/aldor007/mariadb-galera:1.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MariaDbCluster {
    pub metadata: Metadata,
    pub spec: MariaDbClusterSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbClusterSpec {
    #[serde(default = "default_primary_count")]
    pub primary_count: i32,
    #[serde(default)]
    pub replica_count: i32,
    pub root_password: SecretKeySelector,
    #[serde(default = "default_image")]
    pub image: String,
    pub storage_class: String,
    pub data_storage_size: String,
    #[serde(default, rename = "initBucketURL")]
    pub init_bucket_url: String,
    #[serde(default, rename = "MariaDBConf")]
    pub mariadb_conf: BTreeMap<String, ConfValue>,
    #[serde(default)]
    pub service: ServiceConf,
}

fn default_primary_count() -> i32 {
    1
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

/// A server setting, written either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ConfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfValue::Int(v) => write!(f, "{v}"),
            ConfValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConf {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "annotation")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, rename = "loadbalancerIP")]
    pub load_balancer_ip: String,
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

impl MariaDbCluster {
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn primary_service_name(&self) -> String {
        format!("mariadb-{}-primary", self.name())
    }

    /// Also the host the operator connects to.
    pub fn headless_service_name(&self) -> String {
        format!("mariadb-headless-{}-primary", self.name())
    }

    pub fn operator_secret_name(&self) -> String {
        format!("mariadb-{}-operated", self.name())
    }

    pub fn statefulset_name(&self) -> String {
        format!("{}-primary", self.name())
    }

    pub fn service_account_name(&self) -> String {
        format!("{}-mariadb", self.name())
    }

    pub fn role_name(&self) -> String {
        format!("{}-mariadb-list-pods", self.name())
    }

    pub fn role_binding_name(&self) -> String {
        format!("{}-list-pods", self.name())
    }

    pub fn backup_job_name(&self) -> String {
        format!("backup-{}", self.name())
    }

    /// Labels shared by every sub-resource of this cluster.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "MariaDB".to_string()),
            ("mariadb/cluster".to_string(), self.name().to_string()),
            ("MariaDB_cr".to_string(), self.name().to_string()),
        ])
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(Error::validation("cluster name must not be empty"));
        }
        if self.spec.primary_count < 0 {
            return Err(Error::validation(format!(
                "cluster {}: primaryCount must not be negative",
                self.key()
            )));
        }
        if !is_quantity(&self.spec.data_storage_size) {
            return Err(Error::validation(format!(
                "cluster {}: invalid dataStorageSize {:?}",
                self.key(),
                self.spec.data_storage_size
            )));
        }
        Ok(())
    }
}

/// Accepts storage quantities such as `10Gi`, `500M` or `1.5Ti`.
fn is_quantity(raw: &str) -> bool {
    const SUFFIXES: [&str; 13] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E", ""];

    let number_end = raw.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(number_end);

    !number.is_empty()
        && !number.starts_with('.')
        && !number.ends_with('.')
        && number.matches('.').count() <= 1
        && SUFFIXES.contains(&suffix)
}
