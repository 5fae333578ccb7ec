//! Operator configuration.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file
//! path defaults to `config.yaml` and can be changed with `-f` or `MARIACTL_CONFIG`.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - base configuration, including the declared objects
//! 2. **Environment variables** - `MARIACTL_`-prefixed variables override YAML values
//!
//! Nested values use double underscores, e.g. `MARIACTL_MYSQL__STATEMENT_TIMEOUT=10s`.
//!
//! ## Example
//!
//! ```yaml
//! manifests_dir: /var/lib/mariactl/manifests
//! secrets_dir: /var/run/secrets/mariactl
//! resync_interval: 2m
//! mysql:
//!   connect_timeout: 5s
//! clusters:
//!   - metadata: { name: main, namespace: db }
//!     spec:
//!       rootPassword: { name: root, key: password }
//!       storageClass: standard
//!       dataStorageSize: 10Gi
//! users:
//!   - metadata: { name: svc, namespace: apps }
//!     spec:
//!       clusterRef: { name: main, namespace: db }
//!       user: svc
//!       password: { name: svc-credentials, key: password }
//!       allowedHosts: ["10.0.0.%"]
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::api::{MariaDbBackup, MariaDbCluster, MariaDbDatabase, MariaDbUser};
use crate::errors::Error;
use crate::mysql::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MARIACTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without reconciling anything.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the directory-backed sub-resource store
    pub manifests_dir: PathBuf,
    /// Root of the mounted secrets, laid out as `<namespace>/<secret>/<key>`
    pub secrets_dir: PathBuf,
    /// Delay between full reconcile passes
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
    pub mysql: MySqlSettings,
    pub clusters: Vec<MariaDbCluster>,
    pub databases: Vec<MariaDbDatabase>,
    pub users: Vec<MariaDbUser>,
    pub backups: Vec<MariaDbBackup>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifests_dir: PathBuf::from("manifests"),
            secrets_dir: PathBuf::from("secrets"),
            resync_interval: Duration::from_secs(120),
            mysql: MySqlSettings::default(),
            clusters: Vec::new(),
            databases: Vec::new(),
            users: Vec::new(),
            backups: Vec::new(),
        }
    }
}

/// How the operator connects to cluster primaries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MySqlSettings {
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound for any single statement or batch
    #[serde(with = "humantime_serde")]
    pub statement_timeout: Duration,
    pub admin_user: String,
}

impl Default for MySqlSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
            admin_user: "root".to_string(),
        }
    }
}

impl Config {
    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("MARIACTL_").ignore(&["config"]).split("__"))
    }

    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Reject settings that cannot work. Per-object problems that only show up when
    /// provisioning (such as a user without hosts) are left to the reconcile that hits them.
    pub fn validate(&self) -> Result<(), Error> {
        if self.resync_interval.is_zero() {
            return Err(Error::validation("Config validation: resync_interval must be greater than zero"));
        }
        if self.mysql.connect_timeout.is_zero() || self.mysql.statement_timeout.is_zero() {
            return Err(Error::validation("Config validation: mysql timeouts must be greater than zero"));
        }
        if self.mysql.admin_user.is_empty() {
            return Err(Error::validation("Config validation: mysql.admin_user must not be empty"));
        }

        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            cluster.validate()?;
            if !seen.insert(cluster.key()) {
                return Err(Error::validation(format!("Config validation: duplicate cluster {}", cluster.key())));
            }
        }

        let refs = self
            .databases
            .iter()
            .map(|d| (d.metadata.key(), &d.spec.cluster_ref.name))
            .chain(self.users.iter().map(|u| (u.metadata.key(), &u.spec.cluster_ref.name)))
            .chain(self.backups.iter().map(|b| (b.metadata.key(), &b.spec.cluster_ref.name)));
        for (key, cluster) in refs {
            if cluster.is_empty() {
                return Err(Error::validation(format!("Config validation: {key} has an empty clusterRef")));
            }
        }

        Ok(())
    }
}
