//! The primary stateful workload running the Galera nodes.

use serde_json::{Value, json};

use super::{Component, Fingerprint, Manifest, ObjectMeta, ResourceKind};
use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::mysql::DEFAULT_PORT;
use crate::types::ObjectKey;

const DB_TYPE: &str = "primary";
const DATA_VOLUME: &str = "data-primary";

pub struct Primary {
    cluster: MariaDbCluster,
}

impl Primary {
    pub fn new(cluster: &MariaDbCluster) -> Self {
        Self {
            cluster: cluster.clone(),
        }
    }

    fn pod_labels(&self) -> Value {
        let mut labels = self.cluster.labels();
        labels.insert("mariadb/type".to_string(), DB_TYPE.to_string());
        labels.insert("mariadb/pods".to_string(), self.cluster.statefulset_name());
        json!(labels)
    }

    fn env(&self) -> Value {
        let c = &self.cluster;
        let mut env = vec![
            json!({ "name": "MYSQL_ROOT_PASSWORD", "valueFrom": { "secretKeyRef": {
                "name": c.spec.root_password.name, "key": c.spec.root_password.key } } }),
            json!({ "name": "LABEL_SELECTOR", "value": format!("mariadb/pods={}", c.statefulset_name()) }),
            json!({ "name": "GALLERA_MODE", "value": "yes" }),
            json!({ "name": "CLUSTER_NAME", "value": c.name() }),
            json!({ "name": "MY_POD_IP", "valueFrom": { "fieldRef": { "fieldPath": "status.podIP" } } }),
            json!({ "name": "MY_POD_NAMESPACE", "valueFrom": { "fieldRef": { "fieldPath": "metadata.namespace" } } }),
        ];
        if !c.spec.init_bucket_url.is_empty() {
            env.push(json!({ "name": "INIT_BUCKET_URL", "value": c.spec.init_bucket_url }));
        }
        Value::Array(env)
    }
}

impl Component for Primary {
    const NAME: &'static str = "primary";

    fn kind(&self) -> ResourceKind {
        ResourceKind::StatefulSet
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.cluster.namespace(), self.cluster.statefulset_name())
    }

    fn fingerprint(&self) -> String {
        let spec = &self.cluster.spec;
        Fingerprint::new()
            .field(&spec.image)
            .field(spec.primary_count.to_string())
            .field(&spec.storage_class)
            .field(&spec.data_storage_size)
            .field(&spec.init_bucket_url)
            .map(spec.mariadb_conf.iter().map(|(k, v)| (k.clone(), v.to_string())))
            .finish()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        self.cluster.validate()?;

        let c = &self.cluster;
        let labels = self.pod_labels();
        let config: serde_json::Map<String, Value> = c
            .spec
            .mariadb_conf
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.to_string())))
            .collect();

        Ok(Manifest {
            kind: ResourceKind::StatefulSet,
            metadata: ObjectMeta::owned_by(c, c.statefulset_name()),
            spec: json!({
                "replicas": c.spec.primary_count,
                "serviceName": c.statefulset_name(),
                "selector": { "matchLabels": labels },
                "volumeClaimTemplates": [{
                    "name": DATA_VOLUME,
                    "accessModes": ["ReadWriteOnce"],
                    "storageClassName": c.spec.storage_class,
                    "storage": c.spec.data_storage_size,
                }],
                "template": {
                    "labels": labels,
                    "serviceAccountName": c.service_account_name(),
                    "containers": [{
                        "name": "mariadb-service",
                        "image": c.spec.image,
                        "imagePullPolicy": "IfNotPresent",
                        "ports": [{ "name": "mariadb", "containerPort": DEFAULT_PORT }],
                        "readinessProbe": {
                            "exec": ["/bin/bash", "-c", "/usr/bin/readiness-probe.sh"],
                            "initialDelaySeconds": 120,
                            "timeoutSeconds": 20,
                            "periodSeconds": 10,
                            "successThreshold": 5,
                            "failureThreshold": 2,
                        },
                        "volumeMounts": [{ "name": DATA_VOLUME, "mountPath": "/var/lib/mysql" }],
                        "envFrom": [{ "secretRef": c.operator_secret_name() }],
                        "env": self.env(),
                        "config": config,
                    }],
                },
            }),
        })
    }
}
