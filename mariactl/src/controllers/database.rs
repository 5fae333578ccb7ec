//! Database reconciliation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::ConnectionResolver;
use crate::api::MariaDbDatabase;
use crate::errors::{Error, Result};
use crate::mysql::database::{create_database_if_not_exists, drop_database};
use crate::mysql::{SqlRunner, SqlRunnerFactory, release};

#[derive(Clone)]
pub struct DatabaseController {
    resolver: ConnectionResolver,
    runners: Arc<dyn SqlRunnerFactory>,
}

impl DatabaseController {
    pub fn new(resolver: ConnectionResolver, runners: Arc<dyn SqlRunnerFactory>) -> Self {
        Self { resolver, runners }
    }

    async fn connect(&self, database: &MariaDbDatabase) -> Result<Box<dyn SqlRunner>> {
        let config = self.resolver.resolve(&database.cluster_key()).await?;
        self.runners
            .connect(&config)
            .await
            .map_err(|e| Error::execution(format!("connect to {}", config.host), e))
    }

    #[instrument(skip(self, ctx, database), fields(database = %database.metadata.key(), cluster = %database.cluster_key()), err)]
    pub async fn reconcile(&self, ctx: &CancellationToken, database: &MariaDbDatabase) -> Result<()> {
        let spec = &database.spec;
        let mut runner = self.connect(database).await?;

        info!(name = %spec.database, "Creating database");
        let result =
            create_database_if_not_exists(runner.as_mut(), ctx, &spec.database, &spec.character_set, &spec.collation)
                .await;
        release(runner, result).await
    }

    /// Drop the schema. A missing cluster means there is nothing left to drop.
    #[instrument(skip(self, ctx, database), fields(database = %database.metadata.key(), cluster = %database.cluster_key()), err)]
    pub async fn remove(&self, ctx: &CancellationToken, database: &MariaDbDatabase) -> Result<()> {
        let mut runner = match self.connect(database).await {
            Ok(runner) => runner,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "Cluster is gone, nothing to remove");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        info!(name = %database.spec.database, "Removing database");
        let result = drop_database(runner.as_mut(), ctx, &database.spec.database).await;
        release(runner, result).await
    }
}
