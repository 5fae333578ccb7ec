//! Convergence of cluster sub-resources.
//!
//! Every sub-resource a cluster needs (credentials secret, RBAC objects, the primary
//! stateful workload, its services, backup jobs) is a [`Component`]: it knows its stable
//! key, how to render its manifest, and which fields of the cluster specification it
//! depends on. [`converge`] turns any component into the same get / create / compare /
//! replace routine, and [`ClusterEngine`] runs an ordered list of them.
//!
//! ## Convergence rules
//!
//! - absent: render and create
//! - present with a different fingerprint annotation: render and replace
//! - present with the same fingerprint: leave alone
//!
//! At most one write happens per component per pass, and nothing is ever deleted.
//! Cleaning up sub-resources of a removed cluster is the owner's job, which is why every
//! manifest carries an [`OwnerReference`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::MariaDbCluster;
use crate::errors::Result;
use crate::types::ObjectKey;

pub mod backup;
pub mod fingerprint;
pub mod primary;
pub mod rbac;
pub mod secret;
pub mod service;
pub mod store;

pub use fingerprint::{FINGERPRINT_ANNOTATION, Fingerprint};
pub use store::{DirectoryStore, MemoryStore, ResourceStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Secret,
    ServiceAccount,
    Role,
    RoleBinding,
    StatefulSet,
    Service,
    CronJob,
    Job,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "secret",
            ResourceKind::ServiceAccount => "serviceaccount",
            ResourceKind::Role => "role",
            ResourceKind::RoleBinding => "rolebinding",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::Service => "service",
            ResourceKind::CronJob => "cronjob",
            ResourceKind::Job => "job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cluster a sub-resource belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

impl OwnerReference {
    pub fn cluster(cluster: &MariaDbCluster) -> Self {
        Self {
            kind: "MariaDBCluster".to_string(),
            name: cluster.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Metadata for a sub-resource of `cluster`, labelled and owned by it.
    pub fn owned_by(cluster: &MariaDbCluster, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: cluster.namespace().to_string(),
            labels: cluster.labels(),
            annotations: BTreeMap::new(),
            owner: Some(OwnerReference::cluster(cluster)),
        }
    }
}

/// A rendered sub-resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
}

impl Manifest {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Fingerprint annotation this manifest was rendered with, if any.
    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata.annotations.get(FINGERPRINT_ANNOTATION).map(String::as_str)
    }
}

/// What a convergence pass did to one sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// A sub-resource rendered from a desired specification.
pub trait Component: Send + Sync {
    /// Name used in logs.
    const NAME: &'static str;

    fn kind(&self) -> ResourceKind;

    fn key(&self) -> ObjectKey;

    /// Digest over the covered fields of the desired specification.
    fn fingerprint(&self) -> String;

    /// Render the manifest. On replace `existing` is the stored manifest, so values that
    /// must survive a rewrite (generated credentials) can be carried over.
    fn render(&self, existing: Option<&Manifest>) -> Result<Manifest>;
}

/// A single converge step, as run by [`ClusterEngine`].
#[async_trait]
pub trait ComponentReconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn converge(&self, store: &dyn ResourceStore) -> Result<Outcome>;
}

#[async_trait]
impl<C: Component> ComponentReconciler for C {
    fn name(&self) -> &'static str {
        C::NAME
    }

    async fn converge(&self, store: &dyn ResourceStore) -> Result<Outcome> {
        converge(self, store).await
    }
}

fn stamped<C: Component>(component: &C, existing: Option<&Manifest>, fingerprint: &str) -> Result<Manifest> {
    let mut manifest = component.render(existing)?;
    manifest
        .metadata
        .annotations
        .insert(FINGERPRINT_ANNOTATION.to_string(), fingerprint.to_string());
    Ok(manifest)
}

async fn replace_if_changed<C: Component>(
    component: &C,
    store: &dyn ResourceStore,
    existing: &Manifest,
    fingerprint: &str,
) -> Result<Outcome> {
    if existing.fingerprint() == Some(fingerprint) {
        debug!(component = C::NAME, key = %existing.key(), "Already converged");
        return Ok(Outcome::Unchanged);
    }

    let manifest = stamped(component, Some(existing), fingerprint)?;
    store.replace(&manifest).await?;
    info!(component = C::NAME, kind = %manifest.kind, key = %manifest.key(), "Updated sub-resource");
    Ok(Outcome::Updated)
}

/// Drive one component toward its desired state with at most one write.
#[instrument(skip_all, fields(component = C::NAME, key = %component.key()), err)]
pub async fn converge<C: Component>(component: &C, store: &dyn ResourceStore) -> Result<Outcome> {
    let kind = component.kind();
    let key = component.key();
    let fingerprint = component.fingerprint();

    if let Some(existing) = store.get(kind, &key).await? {
        return replace_if_changed(component, store, &existing, &fingerprint).await;
    }

    let manifest = stamped(component, None, &fingerprint)?;
    match store.create(&manifest).await {
        Ok(()) => {
            info!(component = C::NAME, kind = %kind, key = %key, "Created sub-resource");
            Ok(Outcome::Created)
        }
        Err(StoreError::AlreadyExists { .. }) => {
            // Someone created it between our read and write; compare against theirs instead.
            warn!(component = C::NAME, key = %key, "Sub-resource appeared concurrently");
            let existing = store
                .get(kind, &key)
                .await?
                .ok_or_else(|| StoreError::NotFound { kind, key: key.clone() })?;
            replace_if_changed(component, store, &existing, &fingerprint).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Ordered converge steps for one cluster.
///
/// Steps run one after another and the first failure stops the pass. Earlier steps are
/// not rolled back: the next pass runs the whole list again and converged steps are no-ops.
pub struct ClusterEngine {
    steps: Vec<Box<dyn ComponentReconciler>>,
}

impl ClusterEngine {
    pub fn new(steps: Vec<Box<dyn ComponentReconciler>>) -> Self {
        Self { steps }
    }

    /// The standard pipeline: operator secret, service account, role, role binding, primary
    /// workload, headless service, and the client service when enabled.
    pub fn for_cluster(cluster: &MariaDbCluster) -> Self {
        let mut steps: Vec<Box<dyn ComponentReconciler>> = vec![
            Box::new(secret::OperatorSecret::new(cluster)),
            Box::new(rbac::ServiceAccount::new(cluster)),
            Box::new(rbac::Role::new(cluster)),
            Box::new(rbac::RoleBinding::new(cluster)),
            Box::new(primary::Primary::new(cluster)),
            Box::new(service::HeadlessService::new(cluster)),
        ];
        if cluster.spec.service.enabled {
            steps.push(Box::new(service::PrimaryService::new(cluster)));
        }
        Self::new(steps)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    #[instrument(skip_all, err)]
    pub async fn run(&self, store: &dyn ResourceStore) -> Result<Vec<(&'static str, Outcome)>> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let outcome = step.converge(store).await?;
            outcomes.push((step.name(), outcome));
        }
        Ok(outcomes)
    }
}
