//! Credentials the operator generates for in-cluster tooling (the backup account).

use rand::prelude::RngExt;
use rand::rng;
use serde_json::json;

use super::{Component, Fingerprint, Manifest, ObjectMeta, ResourceKind};
use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::types::ObjectKey;

pub const BACKUP_USER_KEY: &str = "BACKUP_USER";
pub const BACKUP_PASSWORD_KEY: &str = "BACKUP_PASSWORD";
const BACKUP_USER: &str = "backup";
const PASSWORD_LEN: usize = 10;
const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_password() -> String {
    let mut rng = rng();
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// `mariadb-<cluster>-operated`, holding the backup account's credentials.
///
/// The generated password is not part of the fingerprint and is carried over whenever the
/// secret is rewritten, so it stays stable for the lifetime of the cluster.
pub struct OperatorSecret {
    namespace: String,
    name: String,
    meta: ObjectMeta,
}

impl OperatorSecret {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        let name = cluster.operator_secret_name();
        Self {
            namespace: cluster.namespace().to_string(),
            meta: ObjectMeta::owned_by(cluster, &name),
            name,
        }
    }
}

impl Component for OperatorSecret {
    const NAME: &'static str = "operator-secret";

    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    fn fingerprint(&self) -> String {
        Fingerprint::new().field(&self.name).field(BACKUP_USER).finish()
    }

    fn render(&self, existing: Option<&Manifest>) -> Result<Manifest> {
        let password = existing
            .and_then(|m| m.spec["stringData"][BACKUP_PASSWORD_KEY].as_str())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_password);

        Ok(Manifest {
            kind: ResourceKind::Secret,
            metadata: self.meta.clone(),
            spec: json!({
                "stringData": {
                    BACKUP_USER_KEY: BACKUP_USER,
                    BACKUP_PASSWORD_KEY: password,
                }
            }),
        })
    }
}
