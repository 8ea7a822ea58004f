use tracing::warn;

use crate::{
    agent::Session,
    error::Result,
    types::{Execution, Job, JobStatus},
};

/// Reduce one execution group to a single status.
///
/// An unfinished record anywhere in the group wins over every tally. With
/// all records finished, zero failures is `Success`; that includes the
/// empty group of a job that never ran.
pub fn aggregate(group: &[Execution]) -> JobStatus {
    if group.iter().any(|ex| !ex.is_finished()) {
        return JobStatus::Running;
    }

    let (success, failed) = group.iter().fold((0usize, 0usize), |(ok, ko), ex| {
        if ex.success {
            (ok + 1, ko)
        } else {
            (ok, ko + 1)
        }
    });

    match (success, failed) {
        (_, 0) => JobStatus::Success,
        (0, _) => JobStatus::Failed,
        _ => JobStatus::PartiallyFailed,
    }
}

impl Job {
    /// Status of the most recent run group, surfacing history failures.
    pub async fn try_status(&self, session: &Session) -> Result<JobStatus> {
        let Some(agent) = session.agent() else {
            return Ok(JobStatus::Unknown);
        };
        let group = agent.history().last_execution_group(&self.name).await?;
        Ok(aggregate(&group))
    }

    /// Status of the most recent run group.
    ///
    /// A failed history fetch is classified like a job with no history.
    /// Use [`Job::try_status`] to observe the failure instead.
    pub async fn status(&self, session: &Session) -> JobStatus {
        match self.try_status(session).await {
            Ok(status) => status,
            Err(e) => {
                warn!(job = %self.name, error = %e, "execution history unavailable, assuming no executions");
                aggregate(&[])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn finished(success: bool) -> Execution {
        let mut ex = Execution::new("etl");
        ex.started_at = Some(Utc::now());
        ex.finished_at = Some(Utc::now());
        ex.success = success;
        ex
    }

    fn pending() -> Execution {
        Execution::new("etl")
    }

    #[test]
    fn empty_group_is_success() {
        assert_eq!(aggregate(&[]), JobStatus::Success);
    }

    #[test]
    fn all_succeeded() {
        assert_eq!(aggregate(&[finished(true), finished(true)]), JobStatus::Success);
    }

    #[test]
    fn all_failed() {
        assert_eq!(aggregate(&[finished(false), finished(false)]), JobStatus::Failed);
    }

    #[test]
    fn mixed_is_partially_failed() {
        assert_eq!(
            aggregate(&[finished(true), finished(false)]),
            JobStatus::PartiallyFailed
        );
    }

    #[test]
    fn unfinished_record_short_circuits_tally() {
        assert_eq!(aggregate(&[finished(false), pending()]), JobStatus::Running);
        assert_eq!(aggregate(&[pending(), finished(true)]), JobStatus::Running);
        assert_eq!(aggregate(&[pending()]), JobStatus::Running);
    }

    #[test]
    fn order_does_not_matter() {
        let a = vec![finished(true), finished(false), finished(true)];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(aggregate(&a), aggregate(&b));
    }

    #[tokio::test]
    async fn standalone_session_is_unknown() {
        let job = Job::new("etl", "@hourly", "run");
        assert_eq!(job.status(&Session::Standalone).await, JobStatus::Unknown);
        assert_eq!(
            job.try_status(&Session::Standalone).await.unwrap(),
            JobStatus::Unknown
        );
    }
}
