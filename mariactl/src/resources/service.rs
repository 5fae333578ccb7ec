//! Network endpoints for the primary: a headless service the operator connects through,
//! and an optional client-facing service.

use serde_json::json;

use super::{Component, Fingerprint, Manifest, ObjectMeta, ResourceKind};
use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::mysql::DEFAULT_PORT;
use crate::types::ObjectKey;

fn selector(cluster: &MariaDbCluster) -> serde_json::Value {
    let mut labels = cluster.labels();
    labels.insert("mariadb/type".to_string(), "primary".to_string());
    json!(labels)
}

fn ports() -> serde_json::Value {
    json!([{ "protocol": "TCP", "port": DEFAULT_PORT, "targetPort": DEFAULT_PORT }])
}

pub struct HeadlessService {
    meta: ObjectMeta,
    selector: serde_json::Value,
}

impl HeadlessService {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self {
            meta: ObjectMeta::owned_by(cluster, cluster.headless_service_name()),
            selector: selector(cluster),
        }
    }
}

impl Component for HeadlessService {
    const NAME: &'static str = "headless-service";

    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.meta.namespace, &self.meta.name)
    }

    fn fingerprint(&self) -> String {
        Fingerprint::new()
            .field(&self.meta.name)
            .field(DEFAULT_PORT.to_string())
            .finish()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        Ok(Manifest {
            kind: ResourceKind::Service,
            metadata: self.meta.clone(),
            spec: json!({
                "selector": self.selector,
                "ports": ports(),
                "type": "ClusterIP",
                "clusterIP": "None",
            }),
        })
    }
}

/// Client-facing service, only part of the pipeline when `service.enabled` is set.
pub struct PrimaryService {
    cluster: MariaDbCluster,
}

impl PrimaryService {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self {
            cluster: cluster.clone(),
        }
    }
}

impl Component for PrimaryService {
    const NAME: &'static str = "service";

    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.cluster.namespace(), self.cluster.primary_service_name())
    }

    fn fingerprint(&self) -> String {
        let conf = &self.cluster.spec.service;
        Fingerprint::new()
            .field(self.cluster.primary_service_name())
            .field(DEFAULT_PORT.to_string())
            .field(conf.service_type.as_str())
            .field(&conf.load_balancer_ip)
            .map(conf.annotations.iter())
            .finish()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        let c = &self.cluster;
        let conf = &c.spec.service;
        let mut meta = ObjectMeta::owned_by(c, c.primary_service_name());
        meta.annotations = conf.annotations.clone();

        let mut spec = json!({
            "selector": json!(c.labels()),
            "ports": ports(),
            "type": conf.service_type.as_str(),
        });
        if !conf.load_balancer_ip.is_empty() {
            spec["loadBalancerIP"] = json!(conf.load_balancer_ip);
        }

        Ok(Manifest {
            kind: ResourceKind::Service,
            metadata: meta,
            spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ServiceType;
    use crate::api::cluster::tests::cluster;
    use crate::resources::{FINGERPRINT_ANNOTATION, MemoryStore, Outcome, ResourceStore, converge};

    #[test]
    fn test_headless_service_has_no_cluster_ip() {
        let manifest = HeadlessService::new(&cluster("main")).render(None).unwrap();
        assert_eq!(manifest.metadata.name, "mariadb-headless-main-primary");
        assert_eq!(manifest.spec["clusterIP"], "None");
        assert_eq!(manifest.spec["ports"][0]["port"], 3306);
    }

    #[test]
    fn test_service_carries_annotations_and_type() {
        let mut c = cluster("main");
        c.spec.service.enabled = true;
        c.spec.service.service_type = ServiceType::LoadBalancer;
        c.spec.service.load_balancer_ip = "10.1.2.3".to_string();
        c.spec.service.annotations.insert("lb/internal".to_string(), "true".to_string());

        let manifest = PrimaryService::new(&c).render(None).unwrap();
        assert_eq!(manifest.metadata.name, "mariadb-main-primary");
        assert_eq!(manifest.metadata.annotations["lb/internal"], "true");
        assert_eq!(manifest.spec["type"], "LoadBalancer");
        assert_eq!(manifest.spec["loadBalancerIP"], "10.1.2.3");
    }

    #[tokio::test]
    async fn test_annotation_change_rewrites_service() {
        let store = MemoryStore::new();
        let mut c = cluster("main");
        c.spec.service.enabled = true;

        assert_eq!(converge(&PrimaryService::new(&c), &store).await.unwrap(), Outcome::Created);

        c.spec.service.annotations.insert("a".to_string(), "b".to_string());
        assert_eq!(converge(&PrimaryService::new(&c), &store).await.unwrap(), Outcome::Updated);

        let stored = store
            .get(ResourceKind::Service, &ObjectKey::new("db", "mariadb-main-primary"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.annotations["a"], "b");
        assert!(stored.metadata.annotations.contains_key(FINGERPRINT_ANNOTATION));
    }
}
