use crate::mysql::{QueryError, SqlError};
use crate::resources::store::StoreError;
use thiserror::Error as ThisError;

/// Errors surfaced by reconcile and provisioning entry points.
///
/// Timeouts and lost connections are reported as [`Error::Execution`] just like statements
/// the server refused; [`SqlError::is_transient`] is there for a scheduler that wants to
/// tell them apart.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The desired specification is unusable as written. Retrying will not help.
    #[error("invalid specification: {message}")]
    Validation { message: String },

    /// A referenced cluster, secret or credential does not exist
    #[error("{resource} {key} not found")]
    NotFound { resource: &'static str, key: String },

    /// The SQL runner failed while performing `operation`
    #[error("failed to {operation}")]
    Execution {
        operation: String,
        #[source]
        source: SqlError,
    },

    /// Reading or writing a managed sub-resource failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation { message: message.into() }
    }

    pub fn execution(operation: impl Into<String>, source: SqlError) -> Self {
        Error::Execution {
            operation: operation.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::validation(err.to_string())
    }
}

/// Type alias for reconcile and provisioning results
pub type Result<T> = std::result::Result<T, Error>;
