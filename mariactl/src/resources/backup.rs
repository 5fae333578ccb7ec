//! Backup jobs: a scheduled job when a cron expression is set, a one-shot job otherwise.

use serde_json::json;

use super::{Component, Fingerprint, Manifest, ObjectMeta, ResourceKind};
use crate::api::{MariaDbBackup, MariaDbCluster};
use crate::errors::Result;
use crate::mysql::DEFAULT_PORT;
use crate::types::ObjectKey;

pub struct BackupJob {
    cluster: MariaDbCluster,
    backup: MariaDbBackup,
}

impl BackupJob {
    pub fn new(cluster: &MariaDbCluster, backup: &MariaDbBackup) -> Self {
        Self {
            cluster: cluster.clone(),
            backup: backup.clone(),
        }
    }

    fn pod_template(&self) -> serde_json::Value {
        let c = &self.cluster;
        let spec = &self.backup.spec;
        json!({
            "restartPolicy": "OnFailure",
            "containers": [{
                "name": "backup",
                "image": c.spec.image,
                "command": ["/bin/sh", "-c"],
                "args": ["/usr/bin/create-backup.sh"],
                "envFrom": [
                    { "secretRef": spec.backup_secret_name },
                    { "secretRef": c.operator_secret_name() },
                ],
                "env": [
                    { "name": "CLUSTER_NAME", "value": c.name() },
                    { "name": "BACKUP_URL", "value": spec.backup_url },
                    { "name": "BACKUP_DB_NAME", "value": spec.backup_db_name },
                    { "name": "HOST", "value": c.headless_service_name() },
                    { "name": "PORT", "value": DEFAULT_PORT.to_string() },
                ],
            }],
        })
    }
}

impl Component for BackupJob {
    const NAME: &'static str = "backup";

    fn kind(&self) -> ResourceKind {
        if self.backup.is_scheduled() {
            ResourceKind::CronJob
        } else {
            ResourceKind::Job
        }
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.cluster.namespace(), self.cluster.backup_job_name())
    }

    /// Covers the schedule, destination and database only; secret or image changes do not
    /// rewrite an existing job.
    fn fingerprint(&self) -> String {
        let spec = &self.backup.spec;
        Fingerprint::new()
            .field(&spec.cron)
            .field(&spec.backup_url)
            .field(&spec.backup_db_name)
            .finish()
    }

    fn render(&self, _existing: Option<&Manifest>) -> Result<Manifest> {
        let metadata = ObjectMeta::owned_by(&self.cluster, self.cluster.backup_job_name());
        let spec = if self.backup.is_scheduled() {
            json!({
                "schedule": self.backup.spec.cron,
                "jobTemplate": { "template": self.pod_template() },
            })
        } else {
            json!({ "template": self.pod_template() })
        };

        Ok(Manifest {
            kind: self.kind(),
            metadata,
            spec,
        })
    }
}
