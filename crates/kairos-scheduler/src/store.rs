use async_trait::async_trait;

use crate::{
    error::StoreError,
    types::{Execution, Job},
};

/// Lookup of job definitions by name.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by name.
    ///
    /// A missing job must be reported as [`StoreError::NotFound`] so callers
    /// can tell it apart from backend failures.
    async fn get_job(&self, name: &str) -> Result<Job, StoreError>;
}

/// Read access to the shared execution history.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Every member's record for the most recent run group of `job_name`.
    ///
    /// An unknown job or a job that never ran yields an empty vector.
    async fn last_execution_group(&self, job_name: &str) -> Result<Vec<Execution>, StoreError>;
}
