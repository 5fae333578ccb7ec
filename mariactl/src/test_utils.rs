//! Test doubles and fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::api::{
    MariaDbBackup, MariaDbBackupSpec, MariaDbCluster, MariaDbDatabase, MariaDbDatabaseSpec, MariaDbUser, MariaDbUserSpec,
    Metadata, UserLimits,
};
use crate::clock::FixedClock;
use crate::mysql::{ConnectionConfig, Query, Row, Rows, SqlError, SqlRunner, SqlRunnerFactory};
use crate::secrets::{MemorySecretStore, SecretData};
use crate::types::{ClusterReference, ObjectKey, SecretKeySelector};

#[derive(Debug, Default)]
struct Recorded {
    executed: Vec<Query>,
    closed: usize,
}

/// A [`SqlRunner`] that records every statement instead of sending it anywhere.
///
/// Clones share their recording, so a factory can hand out boxed clones while the test
/// keeps a handle to inspect afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    recorded: Arc<Mutex<Recorded>>,
    fail_on: Option<String>,
    fail_on_nth: Option<usize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement whose text contains `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Fail the `n`th statement (1-based).
    pub fn fail_on_nth(mut self, n: usize) -> Self {
        self.fail_on_nth = Some(n);
        self
    }

    /// Every statement attempted so far, including failed ones.
    pub fn executed(&self) -> Vec<Query> {
        self.recorded.lock().unwrap().executed.clone()
    }

    pub fn calls(&self) -> usize {
        self.recorded.lock().unwrap().executed.len()
    }

    /// How many times `close` was called across all clones.
    pub fn closed(&self) -> usize {
        self.recorded.lock().unwrap().closed
    }

    fn record(&self, query: &Query) -> Result<(), SqlError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.executed.push(query.clone());
        let n = recorded.executed.len();

        let by_pattern = self.fail_on.as_deref().is_some_and(|p| query.as_str().contains(p));
        if by_pattern || self.fail_on_nth == Some(n) {
            return Err(SqlError::Database {
                code: "1064".to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SqlRunner for RecordingRunner {
    async fn execute(&mut self, ctx: &CancellationToken, query: &Query) -> Result<(), SqlError> {
        if ctx.is_cancelled() {
            return Err(SqlError::Cancelled);
        }
        self.record(query)
    }

    async fn query_scalar(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Option<Row>, SqlError> {
        self.execute(ctx, query).await?;
        Ok(None)
    }

    async fn query_rows(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Rows, SqlError> {
        self.execute(ctx, query).await?;
        Ok(Rows::default())
    }

    async fn close(&mut self) -> Result<(), SqlError> {
        self.recorded.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Hands out clones of one [`RecordingRunner`] and remembers where it was asked to connect.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunnerFactory {
    pub runner: RecordingRunner,
    connections: Arc<Mutex<Vec<ConnectionConfig>>>,
    refuse: bool,
}

impl RecordingRunnerFactory {
    pub fn new(runner: RecordingRunner) -> Self {
        Self {
            runner,
            ..Default::default()
        }
    }

    /// A factory whose every connection attempt fails.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn connections(&self) -> Vec<ConnectionConfig> {
        self.connections.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlRunnerFactory for RecordingRunnerFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlRunner>, SqlError> {
        self.connections.lock().unwrap().push(config.clone());
        if self.refuse {
            return Err(SqlError::Timeout(std::time::Duration::from_secs(5)));
        }
        Ok(Box::new(self.runner.clone()))
    }
}

pub fn fixed_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

pub fn test_cluster(namespace: &str, name: &str) -> MariaDbCluster {
    let mut cluster = crate::api::cluster::tests::cluster(name);
    cluster.metadata = Metadata::new(namespace, name);
    cluster
}

/// Secrets holding the root password of `db/main` and the password of `apps/svc-credentials`.
pub async fn test_secrets() -> MemorySecretStore {
    let secrets = MemorySecretStore::new();
    secrets
        .insert(
            ObjectKey::new("db", "root"),
            SecretData::from([("password".to_string(), "r00t".to_string())]),
        )
        .await;
    secrets
        .insert(
            ObjectKey::new("apps", "svc-credentials"),
            SecretData::from([("password".to_string(), "p@ss".to_string())]),
        )
        .await;
    secrets
}

fn main_cluster_ref() -> ClusterReference {
    ClusterReference {
        name: "main".to_string(),
        namespace: "db".to_string(),
    }
}

pub fn test_user(hosts: &[&str]) -> MariaDbUser {
    MariaDbUser {
        metadata: Metadata::new("apps", "svc"),
        spec: MariaDbUserSpec {
            cluster_ref: main_cluster_ref(),
            user: "svc".to_string(),
            password: SecretKeySelector {
                name: "svc-credentials".to_string(),
                key: "password".to_string(),
            },
            allowed_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            permissions: Vec::new(),
            limits: UserLimits::default(),
        },
        status: Default::default(),
    }
}

pub fn test_database(name: &str) -> MariaDbDatabase {
    MariaDbDatabase {
        metadata: Metadata::new("apps", name),
        spec: MariaDbDatabaseSpec {
            cluster_ref: main_cluster_ref(),
            database: name.to_string(),
            character_set: "utf8mb4".to_string(),
            collation: String::new(),
        },
    }
}

pub fn test_backup(cron: &str) -> MariaDbBackup {
    MariaDbBackup {
        metadata: Metadata::new("db", "nightly"),
        spec: MariaDbBackupSpec {
            cluster_ref: ClusterReference {
                name: "main".to_string(),
                namespace: String::new(),
            },
            backup_url: "s3://backups/main".to_string(),
            backup_secret_name: "s3-credentials".to_string(),
            backup_db_name: String::new(),
            cron: cron.to_string(),
        },
    }
}

/// The clusters known to a test, keyed as the controllers look them up.
pub fn clusters(list: &[MariaDbCluster]) -> BTreeMap<ObjectKey, MariaDbCluster> {
    list.iter().map(|c| (c.key(), c.clone())).collect()
}
