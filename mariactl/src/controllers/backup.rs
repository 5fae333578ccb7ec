//! Backup reconciliation: one job per backup, living next to the cluster it dumps.

use std::sync::Arc;

use tracing::{info, instrument};

use super::ClusterIndex;
use crate::api::MariaDbBackup;
use crate::errors::{Error, Result};
use crate::resources::backup::BackupJob;
use crate::resources::{Outcome, ResourceStore, converge};

#[derive(Clone)]
pub struct BackupController {
    clusters: Arc<ClusterIndex>,
    store: Arc<dyn ResourceStore>,
}

impl BackupController {
    pub fn new(clusters: Arc<ClusterIndex>, store: Arc<dyn ResourceStore>) -> Self {
        Self { clusters, store }
    }

    #[instrument(skip(self, backup), fields(backup = %backup.metadata.key(), cluster = %backup.cluster_key()), err)]
    pub async fn reconcile(&self, backup: &MariaDbBackup) -> Result<Outcome> {
        let key = backup.cluster_key();
        let cluster = self.clusters.get(&key).ok_or_else(|| Error::NotFound {
            resource: "cluster",
            key: key.to_string(),
        })?;

        let outcome = converge(&BackupJob::new(cluster, backup), self.store.as_ref()).await?;
        info!(outcome = ?outcome, scheduled = backup.is_scheduled(), "Backup job converged");
        Ok(outcome)
    }
}
