use std::fmt;

use tracing::warn;

use crate::{
    error::{JobError, Result},
    gate::DispatchGuard,
    lock::LockSlot,
    types::{ConcurrencyPolicy, Job},
};

impl Job {
    /// A job with the given identity and command, every other field defaulted.
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            shell: false,
            command: command.into(),
            environment_variables: Vec::new(),
            owner: String::new(),
            owner_email: String::new(),
            success_count: 0,
            error_count: 0,
            last_success: None,
            last_error: None,
            disabled: false,
            tags: Default::default(),
            retries: 0,
            dependent_jobs: Vec::new(),
            parent_job: String::new(),
            processors: Default::default(),
            concurrency: ConcurrencyPolicy::Allow.to_string(),
            dispatch: DispatchGuard::default(),
            lock: LockSlot::default(),
        }
    }

    pub fn with_concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy.to_string();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_job = parent.into();
        self
    }

    /// Check the structural invariants that must hold before a job is persisted.
    ///
    /// Not run on reads: records already in storage are evaluated as they are.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(JobError::EmptyName);
        }
        if self.command.is_empty() {
            return Err(JobError::NoCommand);
        }
        self.concurrency.parse::<ConcurrencyPolicy>()?;
        if !self.parent_job.is_empty() && self.parent_job == self.name {
            return Err(JobError::SameParent);
        }
        Ok(())
    }

    /// Concurrency policy as used by the run gate.
    ///
    /// A stored value that never passed validation resolves to `Allow`,
    /// with a warning so the bad record is visible.
    pub fn policy(&self) -> ConcurrencyPolicy {
        match self.concurrency.parse() {
            Ok(policy) => policy,
            Err(_) => {
                warn!(
                    job = %self.name,
                    concurrency = %self.concurrency,
                    "unrecognized concurrency policy in stored job, treating as allow"
                );
                ConcurrencyPolicy::Allow
            }
        }
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_job.is_empty()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // BTreeMap gives a stable tag order in logs.
        let tags: std::collections::BTreeMap<_, _> = self.tags.iter().collect();
        write!(
            f,
            "\"Job: {}, scheduled at: {}, tags:{:?}\"",
            self.name, self.schedule, tags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("backup", "@every 1m", "tar czf /tmp/b.tgz /data")
    }

    #[test]
    fn valid_job_passes() {
        assert!(job().validate().is_ok());
        assert!(job().with_concurrency(ConcurrencyPolicy::Forbid).validate().is_ok());
        assert!(job().with_parent("other").validate().is_ok());
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut j = job();
        j.command.clear();
        assert!(matches!(j.validate(), Err(JobError::NoCommand)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut j = job();
        j.name.clear();
        assert!(matches!(j.validate(), Err(JobError::EmptyName)));
    }

    #[test]
    fn unknown_or_empty_concurrency_is_rejected() {
        for value in ["", "sometimes", "Forbid"] {
            let mut j = job();
            j.concurrency = value.to_string();
            match j.validate() {
                Err(JobError::WrongConcurrency { value: v }) => assert_eq!(v, value),
                other => panic!("expected WrongConcurrency for {value:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn self_parent_is_rejected() {
        let j = job().with_parent("backup");
        let err = j.validate().unwrap_err();
        assert!(matches!(err, JobError::SameParent));
        assert!(err.is_validation());
    }

    #[test]
    fn command_checked_before_concurrency() {
        let mut j = job();
        j.command.clear();
        j.concurrency = "bogus".into();
        assert!(matches!(j.validate(), Err(JobError::NoCommand)));
    }

    #[test]
    fn policy_tolerates_bad_stored_value() {
        let mut j = job();
        j.concurrency = "bogus".into();
        assert_eq!(j.policy(), ConcurrencyPolicy::Allow);
        j.concurrency = "forbid".into();
        assert_eq!(j.policy(), ConcurrencyPolicy::Forbid);
    }

    #[test]
    fn display_format() {
        let mut j = job();
        j.tags.insert("role".into(), "db".into());
        assert_eq!(
            j.to_string(),
            r#""Job: backup, scheduled at: @every 1m, tags:{"role": "db"}""#
        );
    }

    #[test]
    fn persisted_field_names_are_stable() {
        let j = job().with_parent("root");
        let json = serde_json::to_value(&j).unwrap();
        for key in [
            "name",
            "schedule",
            "command",
            "tags",
            "parent_job",
            "dependent_jobs",
            "concurrency",
            "environment_variables",
            "owner_email",
            "success_count",
            "processors",
        ] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
        assert!(json.get("dispatch").is_none());
        assert!(json.get("lock").is_none());
    }

    #[test]
    fn sparse_record_deserializes() {
        let j: Job = serde_json::from_str(r#"{"name":"etl","command":"run"}"#).unwrap();
        assert_eq!(j.name, "etl");
        assert!(j.concurrency.is_empty());
        assert!(!j.disabled);
        assert!(j.dependent_jobs.is_empty());
    }
}
