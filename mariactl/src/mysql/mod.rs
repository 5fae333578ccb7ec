//! MySQL/MariaDB administration: escaping, statement building and execution.
//!
//! Provisioning code never talks to a driver directly. It builds [`Query`] values and hands
//! them to a [`SqlRunner`], which the caller acquires from a [`SqlRunnerFactory`] at the
//! start of a reconcile and releases with [`SqlRunner::close`] before returning.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod database;
pub mod errors;
pub mod escape;
pub mod query;
pub mod runner;
pub mod user;

pub use errors::SqlError;
pub use escape::{escape, escape_identifier};
pub use query::{Query, QueryError, SqlArg};
pub use runner::{MySqlRunner, MySqlRunnerFactory};

/// Port every cluster's primary listens on.
pub const DEFAULT_PORT: u16 = 3306;

/// Where and as whom to connect to a cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionConfig {
    /// Driver locator string. Multi-statement execution and client-side parameter
    /// interpolation are both required by atomic batches.
    pub fn dsn(&self) -> String {
        format!(
            "{}:{}@tcp({}:{})/?timeout=5s&multiStatements=true&interpolateParams=true",
            self.user, self.password, self.host, self.port
        )
    }

    /// Same as [`dsn`](Self::dsn) with the password masked, for logs.
    pub fn redacted_dsn(&self) -> String {
        ConnectionConfig {
            password: "***".to_string(),
            ..self.clone()
        }
        .dsn()
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted_dsn())
    }
}

/// A single result row; `None` marks SQL `NULL`.
pub type Row = Vec<Option<String>>;

/// Rows returned by [`SqlRunner::query_rows`], consumed in order.
#[derive(Debug, Default)]
pub struct Rows {
    rows: std::vec::IntoIter<Row>,
}

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into_iter() }
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

/// Capability boundary for executing administrative SQL.
///
/// Every call is bound to the caller's cancellation token; a cancelled call fails with
/// [`SqlError::Cancelled`] and never reports success.
#[async_trait]
pub trait SqlRunner: Send {
    /// Execute a statement (or `;`-separated batch) that produces no rows.
    async fn execute(&mut self, ctx: &CancellationToken, query: &Query) -> Result<(), SqlError>;

    /// Execute a query and return its first row, if any.
    async fn query_scalar(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Option<Row>, SqlError>;

    /// Execute a query and return every row.
    async fn query_rows(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Rows, SqlError>;

    /// Release the underlying connection. Later calls fail with [`SqlError::Closed`].
    async fn close(&mut self) -> Result<(), SqlError>;
}

/// Opens one runner per reconcile cycle.
#[async_trait]
pub trait SqlRunnerFactory: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlRunner>, SqlError>;
}

/// Close `runner`, logging rather than masking a failure of `result`.
///
/// Used on every exit path of a provisioning call so the connection is released even
/// when the call failed validation before issuing any SQL.
pub async fn release<T, E>(mut runner: Box<dyn SqlRunner>, result: Result<T, E>) -> Result<T, E> {
    if let Err(e) = runner.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }
    result
}
