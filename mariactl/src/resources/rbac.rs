//! Identity the cluster pods run as, and the permission to discover their peers.

use serde_json::{Value, json};

use super::{Component, Fingerprint, Manifest, ObjectMeta, ResourceKind};
use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::types::ObjectKey;

/// Everything an RBAC object needs: where it lives, its metadata and its body.
struct RbacObject {
    meta: ObjectMeta,
    body: Value,
}

impl RbacObject {
    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.meta.namespace, &self.meta.name)
    }

    fn fingerprint(&self) -> String {
        Fingerprint::new().field(&self.meta.name).field(self.body.to_string()).finish()
    }

    fn manifest(&self, kind: ResourceKind) -> Manifest {
        Manifest {
            kind,
            metadata: self.meta.clone(),
            spec: self.body.clone(),
        }
    }
}

pub struct ServiceAccount(RbacObject);

impl ServiceAccount {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self(RbacObject {
            meta: ObjectMeta::owned_by(cluster, cluster.service_account_name()),
            body: json!({}),
        })
    }
}

impl Component for ServiceAccount {
    const NAME: &'static str = "service-account";

    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceAccount
    }

    fn key(&self) -> ObjectKey {
        self.0.key()
    }

    fn fingerprint(&self) -> String {
        self.0.fingerprint()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        Ok(self.0.manifest(ResourceKind::ServiceAccount))
    }
}

/// Read access to pods in the cluster's namespace.
pub struct Role(RbacObject);

impl Role {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self(RbacObject {
            meta: ObjectMeta::owned_by(cluster, cluster.role_name()),
            body: json!({
                "rules": [{
                    "apiGroups": [""],
                    "resources": ["pods/status", "pods"],
                    "verbs": ["get", "list"],
                }]
            }),
        })
    }
}

impl Component for Role {
    const NAME: &'static str = "role";

    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    fn key(&self) -> ObjectKey {
        self.0.key()
    }

    fn fingerprint(&self) -> String {
        self.0.fingerprint()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        Ok(self.0.manifest(ResourceKind::Role))
    }
}

pub struct RoleBinding(RbacObject);

impl RoleBinding {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self(RbacObject {
            meta: ObjectMeta::owned_by(cluster, cluster.role_binding_name()),
            body: json!({
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "Role",
                    "name": cluster.role_name(),
                },
                "subjects": [{
                    "kind": "ServiceAccount",
                    "name": cluster.service_account_name(),
                    "namespace": cluster.namespace(),
                }]
            }),
        })
    }
}

impl Component for RoleBinding {
    const NAME: &'static str = "role-binding";

    fn kind(&self) -> ResourceKind {
        ResourceKind::RoleBinding
    }

    fn key(&self) -> ObjectKey {
        self.0.key()
    }

    fn fingerprint(&self) -> String {
        self.0.fingerprint()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        Ok(self.0.manifest(ResourceKind::RoleBinding))
    }
}
