use thiserror::Error;

/// Failures surfaced by a backend implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backing table/collection is absent. A configuration issue:
    /// not retryable without operator action.
    #[error("backing table `{0}` is not provisioned")]
    NotConfigured(&'static str),

    /// A rich update was rejected by schema validation. Callers may retry
    /// with a reduced field set.
    #[error("write rejected by schema validation: {0}")]
    SchemaRejected(String),

    /// Transient network/write failure. Retryable by re-invoking the
    /// same operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failures surfaced by the chat and lifecycle operations. Caught at the
/// operation boundary and turned into a user-facing message; never allowed
/// to crash the session.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("backing table `{0}` is not provisioned")]
    NotConfigured(&'static str),

    /// Authorization failure, terminal for the request.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Valid but wrong-state request, terminal.
    #[error("{0}")]
    NotAvailable(String),

    /// Transient backend failure; the operation may be re-invoked.
    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for ChatError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotConfigured(table) => Self::NotConfigured(table),
            other => Self::Backend(other),
        }
    }
}
