use thiserror::Error;

/// Failures reported by a [`SqlRunner`](super::SqlRunner).
#[derive(Error, Debug)]
pub enum SqlError {
    /// The caller's cancellation token fired while the statement was in flight
    #[error("statement cancelled")]
    Cancelled,

    /// The statement or connection attempt exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Placeholder count in the template differs from the bound argument count
    #[error("query has {placeholders} placeholders but {args} arguments were bound")]
    ArgumentMismatch { placeholders: usize, args: usize },

    /// The runner was used after its connection had been released
    #[error("connection already closed")]
    Closed,

    /// The server rejected the statement
    #[error("server error {code}: {message}")]
    Database { code: String, message: String },

    /// I/O, protocol or TLS failure talking to the server
    #[error(transparent)]
    Connection(sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SqlError {
    /// Connectivity problems and deadlines, as opposed to statements the server refused.
    ///
    /// Informational only: provisioning reports both kinds the same way and leaves
    /// retry policy to whoever schedules the next reconcile.
    pub fn is_transient(&self) -> bool {
        matches!(self, SqlError::Timeout(_) | SqlError::Connection(_))
    }
}

impl From<sqlx::Error> for SqlError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => SqlError::Database {
                code: db_err.code().map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                message: db_err.message().to_string(),
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) | sqlx::Error::PoolTimedOut => SqlError::Connection(err),
            _ => SqlError::Other(anyhow::Error::from(err)),
        }
    }
}
