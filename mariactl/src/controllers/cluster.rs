//! Cluster reconciliation: converge every sub-resource of a declared cluster.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::resources::{ClusterEngine, Outcome, ResourceStore};

#[derive(Clone)]
pub struct ClusterController {
    store: Arc<dyn ResourceStore>,
}

impl ClusterController {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Run the cluster's pipeline once. Returns what each step did.
    #[instrument(skip(self, cluster), fields(cluster = %cluster.key()), err)]
    pub async fn reconcile(&self, cluster: &MariaDbCluster) -> Result<Vec<(&'static str, Outcome)>> {
        cluster.validate()?;
        let outcomes = ClusterEngine::for_cluster(cluster).run(self.store.as_ref()).await?;

        let changed = outcomes.iter().filter(|(_, o)| *o != Outcome::Unchanged).count();
        info!(steps = outcomes.len(), changed, "Cluster converged");
        Ok(outcomes)
    }
}
