use thiserror::Error;

/// Failures reported by the external collaborators (job store, execution
/// history, lock service).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist in the store.
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking call was abandoned because its cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other backend-specific failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors raised by job validation, dependency resolution and lock handling.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job name must not be empty")]
    EmptyName,

    #[error("Unspecified command for job")]
    NoCommand,

    #[error("Wrong concurrency policy value {value:?}, use: allow/forbid")]
    WrongConcurrency { value: String },

    #[error("The job can not have itself as parent")]
    SameParent,

    #[error("The job doesn't have a parent job set")]
    NoParent,

    #[error("Specified parent job not found: {name}")]
    ParentJobNotFound { name: String },

    /// The operation needs a live cluster session and was called standalone.
    #[error("No agent defined")]
    NoAgent,

    /// `unlock` was called without a matching successful `lock`.
    #[error("Job lock is not held")]
    NotLocked,

    #[error("Job lock is already held by this instance")]
    AlreadyLocked,

    #[error("Timed out acquiring job lock after {ms}ms")]
    LockTimeout { ms: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    /// True for the errors produced by [`Job::validate`](crate::types::Job::validate).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            JobError::EmptyName
                | JobError::NoCommand
                | JobError::WrongConcurrency { .. }
                | JobError::SameParent
        )
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
