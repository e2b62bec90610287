use thiserror::Error;

/// Error returned by counter store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing database could not serve the request (connection, lock or io failure).
    /// Nothing was written; callers should report this as a temporary server-side failure.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("build number must not be negative, got: {value}")]
    NegativeBuildNumber { value: i64 },

    #[error("build number for project {project:?} is already at its maximum value")]
    CounterOverflow { project: String },
}

impl StoreError {
    pub(crate) fn unavailable(context: &str, err: impl std::fmt::Debug) -> Self {
        Self::StorageUnavailable { reason: format!("{context}: {err:?}") }
    }
}

#[derive(Error, Debug)]
pub enum StoreOpenError {
    #[error("failed to open database connection: {reason}")]
    ConnectionOpen { reason: String },

    #[error("failed to init database: {reason}")]
    DatabaseInit { reason: String },
}
