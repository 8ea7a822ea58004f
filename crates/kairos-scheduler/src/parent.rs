use tracing::debug;

use crate::{
    agent::Session,
    error::{JobError, Result, StoreError},
    types::Job,
};

impl Job {
    /// Resolve `parent_job` to the parent's definition.
    ///
    /// Checks run in a fixed order: standalone session, self reference, no
    /// parent configured, then the store lookup. A self reference is caught
    /// before the store is touched.
    pub async fn get_parent(&self, session: &Session) -> Result<Job> {
        let agent = session.agent().ok_or(JobError::NoAgent)?;

        if self.name == self.parent_job {
            return Err(JobError::SameParent);
        }
        if self.parent_job.is_empty() {
            return Err(JobError::NoParent);
        }

        match agent.jobs().get_job(&self.parent_job).await {
            Ok(parent) => {
                debug!(job = %self.name, parent = %parent.name, "parent job resolved");
                Ok(parent)
            }
            Err(StoreError::NotFound { .. }) => Err(JobError::ParentJobNotFound {
                name: self.parent_job.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
