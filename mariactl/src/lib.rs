//! # mariactl: a control layer for MariaDB clusters
//!
//! `mariactl` keeps MariaDB clusters, their schemas and their accounts converged to a
//! declared state. The declared objects (clusters, databases, users and backups) are read
//! from configuration, and a resync loop drives the world toward them on a fixed interval.
//!
//! ## Overview
//!
//! Two engines do the work:
//!
//! - The **SQL provisioning engine** ([`mysql`]) turns declared schemas and users into
//!   escaped, parameterised statements. A user's credentials, resource limits and grants
//!   are applied as one atomic batch, and hosts that were removed from the declaration are
//!   pruned afterwards with idempotent `DROP USER IF EXISTS` statements.
//! - The **convergence engine** ([`resources`]) renders the sub-resources a cluster needs
//!   (operator secret, RBAC objects, the primary stateful workload, services, backup jobs)
//!   and writes each one only when the fingerprint of the fields it depends on changed.
//!
//! Controllers ([`controllers`]) sit in front of both. They resolve which cluster an object
//! refers to, read credentials through a [`secrets::SecretStore`], open one connection per
//! reconcile, and translate outcomes into status.
//!
//! ## Reconcile order
//!
//! Every pass first removes users and databases that were reconciled earlier but are no
//! longer declared, then handles clusters, backups, databases and users in that order. A
//! failure is logged and the pass moves on to the next object; the next pass retries it.
//! User status (the hosts last applied) is kept in memory between passes so that hosts
//! dropped from a declaration can be pruned.
//!
//! ## Configuration
//!
//! See [`config`] for the file format and environment overrides. Logging is controlled by
//! `RUST_LOG` (see [`telemetry`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

pub mod api;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod errors;
pub mod mysql;
pub mod resources;
pub mod secrets;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::api::{MariaDbDatabase, MariaDbUser, MariaDbUserStatus};
use crate::clock::{Clock, SystemClock};
use crate::controllers::{
    BackupController, ClusterController, ClusterIndex, ConnectionResolver, DatabaseController, UserController, describe,
};
use crate::mysql::{MySqlRunnerFactory, SqlRunnerFactory};
use crate::resources::{DirectoryStore, ResourceStore};
use crate::secrets::{DirectorySecretStore, SecretStore};
use crate::types::ObjectKey;

/// Tally of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record<T>(&mut self, result: &errors::Result<T>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// The resync loop over every declared object.
pub struct Application {
    config: Config,
    clusters: ClusterController,
    backups: BackupController,
    databases: DatabaseController,
    users: UserController,
    // last reconciled declaration of each user, carrying the status that was recorded
    known_users: BTreeMap<ObjectKey, MariaDbUser>,
    known_databases: BTreeMap<ObjectKey, MariaDbDatabase>,
}

impl Application {
    /// Wire up the production capabilities: directory-backed manifest and secret stores,
    /// MySQL connections and the system clock.
    pub fn new(config: Config) -> Self {
        let store = Arc::new(DirectoryStore::new(&config.manifests_dir));
        let secrets = Arc::new(DirectorySecretStore::new(&config.secrets_dir));
        let runners = Arc::new(MySqlRunnerFactory {
            connect_timeout: config.mysql.connect_timeout,
            statement_timeout: config.mysql.statement_timeout,
        });
        Self::with_components(config, store, secrets, runners, Arc::new(SystemClock))
    }

    pub fn with_components(
        config: Config,
        store: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretStore>,
        runners: Arc<dyn SqlRunnerFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!("Starting control layer with configuration: {:#?}", config);

        let index: Arc<ClusterIndex> = Arc::new(config.clusters.iter().map(|c| (c.key(), c.clone())).collect());
        let resolver = ConnectionResolver::new(
            index.clone(),
            secrets.clone(),
            config.mysql.admin_user.clone(),
            config.mysql.port,
        );

        Self {
            clusters: ClusterController::new(store.clone()),
            backups: BackupController::new(index, store),
            databases: DatabaseController::new(resolver.clone(), runners.clone()),
            users: UserController::new(resolver, secrets, runners, clock),
            known_users: BTreeMap::new(),
            known_databases: BTreeMap::new(),
            config,
        }
    }

    /// Last recorded status of a declared user.
    pub fn user_status(&self, key: &ObjectKey) -> Option<&MariaDbUserStatus> {
        self.known_users.get(key).map(|user| &user.status)
    }

    /// Remove users and databases reconciled in an earlier pass that are no longer
    /// declared. An object is forgotten once its removal succeeds.
    async fn remove_undeclared(&mut self, ctx: &CancellationToken, report: &mut SyncReport) {
        let declared: HashSet<ObjectKey> = self.config.users.iter().map(|u| u.metadata.key()).collect();
        let stale: Vec<MariaDbUser> = self
            .known_users
            .iter()
            .filter(|(key, _)| !declared.contains(*key))
            .map(|(_, user)| user.clone())
            .collect();

        for user in stale {
            let key = user.metadata.key();
            let result = self.users.remove(ctx, &user).await;
            match &result {
                Ok(()) => {
                    info!(user = %key, "Removed user that is no longer declared");
                    self.known_users.remove(&key);
                }
                Err(e) => error!(user = %key, error = %describe(e), "Failed to remove user"),
            }
            report.record(&result);
        }

        let declared: HashSet<ObjectKey> = self.config.databases.iter().map(|d| d.metadata.key()).collect();
        let stale: Vec<MariaDbDatabase> = self
            .known_databases
            .iter()
            .filter(|(key, _)| !declared.contains(*key))
            .map(|(_, database)| database.clone())
            .collect();

        for database in stale {
            let key = database.metadata.key();
            let result = self.databases.remove(ctx, &database).await;
            match &result {
                Ok(()) => {
                    info!(database = %key, "Removed database that is no longer declared");
                    self.known_databases.remove(&key);
                }
                Err(e) => error!(database = %key, error = %describe(e), "Failed to remove database"),
            }
            report.record(&result);
        }
    }

    /// Reconcile every declared object once. Failures are logged and counted, never fatal.
    #[instrument(skip_all)]
    pub async fn sync_once(&mut self, ctx: &CancellationToken) -> SyncReport {
        let mut report = SyncReport::default();

        self.remove_undeclared(ctx, &mut report).await;

        for cluster in &self.config.clusters {
            let result = self.clusters.reconcile(cluster).await;
            if let Err(e) = &result {
                error!(cluster = %cluster.key(), error = %describe(e), "Failed to reconcile cluster");
            }
            report.record(&result);
        }

        for backup in &self.config.backups {
            let result = self.backups.reconcile(backup).await;
            if let Err(e) = &result {
                error!(backup = %backup.metadata.key(), error = %describe(e), "Failed to reconcile backup");
            }
            report.record(&result);
        }

        for database in &self.config.databases {
            let result = self.databases.reconcile(ctx, database).await;
            if let Err(e) = &result {
                error!(database = %database.metadata.key(), error = %describe(e), "Failed to reconcile database");
            }
            self.known_databases.insert(database.metadata.key(), database.clone());
            report.record(&result);
        }

        for declared in &self.config.users {
            let key = declared.metadata.key();
            // hosts applied by this process win over any status seeded from configuration
            let previous = self
                .known_users
                .get(&key)
                .map(|known| known.status.clone())
                .unwrap_or_else(|| declared.status.clone());

            let mut user = declared.clone();
            user.status = previous.clone();

            let result = self.users.reconcile(ctx, &user).await;
            let status = match &result {
                Ok(status) => status.clone(),
                Err(e) => {
                    error!(user = %key, error = %describe(e), "Failed to reconcile user");
                    self.users.failed_status(&previous, e)
                }
            };
            report.record(&result);
            user.status = status;
            self.known_users.insert(key, user);
        }

        report
    }

    /// Run passes every `resync_interval` until `shutdown` fires. In-flight SQL observes the
    /// same token and is abandoned on shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(
            resync_interval = %humantime::format_duration(self.config.resync_interval),
            clusters = self.config.clusters.len(),
            databases = self.config.databases.len(),
            users = self.config.users.len(),
            backups = self.config.backups.len(),
            "Starting reconcile loop"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report = self.sync_once(&shutdown).await;
            info!(succeeded = report.succeeded, failed = report.failed, "Reconcile pass finished");

            tokio::select! {
                _ = tokio::time::sleep(self.config.resync_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Reconcile loop shutting down");
        Ok(())
    }
}
