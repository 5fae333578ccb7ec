//! User reconciliation: credentials, limits, grants, host pruning and removal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::{ConnectionResolver, describe};
use crate::api::{Condition, ConditionStatus, MariaDbUser, MariaDbUserStatus};
use crate::clock::Clock;
use crate::errors::{Error, Result};
use crate::mysql::user::{DesiredUser, ObservedUser, drop_user, provision_user};
use crate::mysql::{SqlRunnerFactory, release};
use crate::secrets::{SecretStore, read_key};

pub const PROVISION_SUCCEEDED: &str = "ProvisionSucceeded";
pub const PROVISION_FAILED: &str = "ProvisionFailed";

#[derive(Clone)]
pub struct UserController {
    resolver: ConnectionResolver,
    secrets: Arc<dyn SecretStore>,
    runners: Arc<dyn SqlRunnerFactory>,
    clock: Arc<dyn Clock>,
}

impl UserController {
    pub fn new(
        resolver: ConnectionResolver,
        secrets: Arc<dyn SecretStore>,
        runners: Arc<dyn SqlRunnerFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            secrets,
            runners,
            clock,
        }
    }

    async fn desired(&self, user: &MariaDbUser) -> Result<DesiredUser> {
        // the password secret lives next to the user, not next to the cluster
        let password = read_key(self.secrets.as_ref(), &user.metadata.namespace, &user.spec.password).await?;
        if password.is_empty() {
            return Err(Error::validation(format!(
                "password for user {} must not be empty",
                user.metadata.key()
            )));
        }

        Ok(DesiredUser {
            name: user.spec.user.clone(),
            password,
            allowed_hosts: user.spec.allowed_hosts.clone(),
            permissions: user.spec.permissions.clone(),
            limits: user.spec.limits,
        })
    }

    /// Bring the user in line with its spec and return the status to record.
    ///
    /// Stale hosts are computed against `user.status.allowed_hosts`, so the caller must
    /// persist the returned status for pruning to work on the next pass.
    #[instrument(skip(self, ctx, user), fields(user = %user.metadata.key(), cluster = %user.cluster_key()), err)]
    pub async fn reconcile(&self, ctx: &CancellationToken, user: &MariaDbUser) -> Result<MariaDbUserStatus> {
        let config = self.resolver.resolve(&user.cluster_key()).await?;
        let desired = self.desired(user).await?;
        let observed = ObservedUser {
            allowed_hosts: user.status.allowed_hosts.clone(),
        };

        let mut runner = self
            .runners
            .connect(&config)
            .await
            .map_err(|e| Error::execution(format!("connect to {}", config.host), e))?;

        info!(username = %desired.name, "Provisioning user");
        let result = provision_user(runner.as_mut(), ctx, &desired, &observed).await;
        let applied = release(runner, result).await?;

        Ok(MariaDbUserStatus {
            condition: Condition::new(
                ConditionStatus::True,
                PROVISION_SUCCEEDED,
                "The user provisioning has succeeded.",
                self.clock.now(),
            ),
            allowed_hosts: applied.allowed_hosts,
        })
    }

    /// Status after a failed reconcile. The previously applied hosts are kept so the next
    /// successful pass still prunes against what is really in the server.
    pub fn failed_status(&self, previous: &MariaDbUserStatus, err: &Error) -> MariaDbUserStatus {
        MariaDbUserStatus {
            condition: Condition::new(ConditionStatus::False, PROVISION_FAILED, describe(err), self.clock.now()),
            allowed_hosts: previous.allowed_hosts.clone(),
        }
    }

    /// Drop every identity recorded in the user's status.
    ///
    /// A cluster that no longer exists took its users with it, so that case succeeds.
    #[instrument(skip(self, ctx, user), fields(user = %user.metadata.key(), cluster = %user.cluster_key()), err)]
    pub async fn remove(&self, ctx: &CancellationToken, user: &MariaDbUser) -> Result<()> {
        let config = match self.resolver.resolve(&user.cluster_key()).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "Cluster is gone, nothing to remove");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut runner = self
            .runners
            .connect(&config)
            .await
            .map_err(|e| Error::execution(format!("connect to {}", config.host), e))?;

        let result = async {
            for host in &user.status.allowed_hosts {
                info!(username = %user.spec.user, host = %host, "Removing user from cluster");
                drop_user(runner.as_mut(), ctx, &user.spec.user, host).await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        release(runner, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mysql::SqlArg;
    use crate::secrets::MemorySecretStore;
    use crate::test_utils::{
        RecordingRunner, RecordingRunnerFactory, clusters, fixed_clock, test_cluster, test_secrets, test_user,
    };

    async fn controller(factory: &RecordingRunnerFactory) -> UserController {
        let secrets: Arc<dyn SecretStore> = Arc::new(test_secrets().await);
        let resolver = ConnectionResolver::new(
            Arc::new(clusters(&[test_cluster("db", "main")])),
            secrets.clone(),
            "root",
            3306,
        );
        UserController::new(resolver, secrets, Arc::new(factory.clone()), Arc::new(fixed_clock()))
    }

    #[test_log::test(tokio::test)]
    async fn test_reconcile_reports_applied_hosts() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let status = controller.reconcile(&ctx, &test_user(&["10.0.0.%", "10.0.1.%"])).await.unwrap();

        assert_eq!(status.allowed_hosts, vec!["10.0.0.%".to_string(), "10.0.1.%".to_string()]);
        assert_eq!(status.condition.status, ConditionStatus::True);
        assert_eq!(status.condition.reason, PROVISION_SUCCEEDED);
        assert_eq!(status.condition.last_update_time, Some(fixed_clock().now()));

        assert_eq!(factory.connections()[0].host, "mariadb-headless-main-primary");
        assert_eq!(factory.connections()[0].password, "r00t");
        let executed = factory.runner.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].args()[2], SqlArg::from("p@ss"));
        assert_eq!(factory.runner.closed(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_prunes_against_status() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let mut user = test_user(&["b", "c"]);
        user.status.allowed_hosts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let status = controller.reconcile(&ctx, &user).await.unwrap();

        assert_eq!(status.allowed_hosts, vec!["b".to_string(), "c".to_string()]);
        let executed = factory.runner.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[1].as_str(), "DROP USER IF EXISTS ?@?;");
        assert_eq!(executed[1].args(), &[SqlArg::from("svc"), SqlArg::from("a")]);
    }

    #[tokio::test]
    async fn test_empty_hosts_releases_runner_without_sql() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let err = controller.reconcile(&ctx, &test_user(&[])).await.unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(factory.runner.calls(), 0);
        assert_eq!(factory.runner.closed(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_releases_runner() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new().fail_on("CREATE USER"));
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let err = controller.reconcile(&ctx, &test_user(&["%"])).await.unwrap_err();

        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(factory.runner.closed(), 1);
    }

    #[tokio::test]
    async fn test_missing_password_secret_is_not_found() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let mut user = test_user(&["%"]);
        user.spec.password.name = "absent".to_string();

        let err = controller.reconcile(&ctx, &user).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(factory.connections().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_execution_error() {
        let factory = RecordingRunnerFactory::refusing();
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let err = controller.reconcile(&ctx, &test_user(&["%"])).await.unwrap_err();
        match err {
            Error::Execution { source, .. } => assert!(source.is_transient()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_reconcile_never_succeeds() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = controller.reconcile(&ctx, &test_user(&["%"])).await.unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(factory.runner.closed(), 1);
    }

    #[tokio::test]
    async fn test_failed_status_keeps_previous_hosts() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let previous = MariaDbUserStatus {
            allowed_hosts: vec!["old".to_string()],
            ..Default::default()
        };

        let status = controller.failed_status(&previous, &Error::validation("no allowed hosts"));

        assert_eq!(status.allowed_hosts, vec!["old".to_string()]);
        assert_eq!(status.condition.status, ConditionStatus::False);
        assert_eq!(status.condition.reason, PROVISION_FAILED);
        assert_eq!(status.condition.message, "invalid specification: no allowed hosts");
    }

    #[tokio::test]
    async fn test_remove_drops_recorded_hosts() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let controller = controller(&factory).await;
        let ctx = CancellationToken::new();

        let mut user = test_user(&["ignored"]);
        user.status.allowed_hosts = vec!["a".to_string(), "b".to_string()];

        controller.remove(&ctx, &user).await.unwrap();

        let executed = factory.runner.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].args(), &[SqlArg::from("svc"), SqlArg::from("a")]);
        assert_eq!(executed[1].args(), &[SqlArg::from("svc"), SqlArg::from("b")]);
        assert_eq!(factory.runner.closed(), 1);
    }

    #[tokio::test]
    async fn test_remove_with_missing_cluster_succeeds() {
        let factory = RecordingRunnerFactory::new(RecordingRunner::new());
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let resolver = ConnectionResolver::new(Arc::new(Default::default()), secrets.clone(), "root", 3306);
        let controller = UserController::new(resolver, secrets, Arc::new(factory.clone()), Arc::new(fixed_clock()));

        controller.remove(&CancellationToken::new(), &test_user(&["%"])).await.unwrap();
        assert!(factory.connections().is_empty());
    }
}
