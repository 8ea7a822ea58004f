use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{gate::DispatchGuard, lock::LockSlot};

/// Opaque per-processor settings, forwarded untouched to the executor.
pub type ProcessorConfig = BTreeMap<String, serde_json::Value>;

/// Aggregated outcome of a job's most recent execution group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Evaluated without a live cluster session; not a real outcome.
    Unknown,
    /// At least one member has not finished the latest run.
    Running,
    /// No member reported a failure (this includes an empty group).
    Success,
    /// Every member failed.
    Failed,
    /// Some members succeeded, some failed.
    PartiallyFailed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::PartiallyFailed => "partially_failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(JobStatus::Unknown),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "partially_failed" => Ok(JobStatus::PartiallyFailed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Whether a new run may start while a previous one is still outstanding
/// anywhere in the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    #[default]
    Allow,
    Forbid,
}

impl ConcurrencyPolicy {
    pub const ALLOW: &'static str = "allow";
    pub const FORBID: &'static str = "forbid";

    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyPolicy::Allow => Self::ALLOW,
            ConcurrencyPolicy::Forbid => Self::FORBID,
        }
    }
}

impl std::fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConcurrencyPolicy {
    type Err = crate::error::JobError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            Self::ALLOW => Ok(ConcurrencyPolicy::Allow),
            Self::FORBID => Ok(ConcurrencyPolicy::Forbid),
            other => Err(crate::error::JobError::WrongConcurrency {
                value: other.to_string(),
            }),
        }
    }
}

/// A scheduled job definition. `name` is the cluster-wide primary key.
///
/// Counters and `last_*` timestamps are owned by execution-completion
/// handling; this crate only reads them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Job {
    /// Unique job name, acts as the id.
    pub name: String,
    /// Trigger expression, interpreted by the external trigger mechanism.
    #[serde(default)]
    pub schedule: String,
    /// Run the command through a shell.
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub command: String,
    /// `KEY=value` pairs handed to the executor in order.
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub owner_email: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<DateTime<Utc>>,
    /// A disabled job is never dispatched.
    #[serde(default)]
    pub disabled: bool,
    /// Member tags selecting where the job runs.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Retry budget consumed by the executor.
    #[serde(default)]
    pub retries: u32,
    /// Jobs chained after a successful run of this one.
    #[serde(default)]
    pub dependent_jobs: Vec<String>,
    /// Name of the job this one depends on; empty when none.
    #[serde(default)]
    pub parent_job: String,
    #[serde(default)]
    pub processors: HashMap<String, ProcessorConfig>,
    /// Stored as text for wire stability; see [`ConcurrencyPolicy`].
    #[serde(default)]
    pub concurrency: String,

    #[serde(skip)]
    pub(crate) dispatch: DispatchGuard,
    #[serde(skip)]
    pub(crate) lock: LockSlot,
}

impl Clone for Job {
    /// Clones the definition only. The copy starts idle and holds no lock.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            schedule: self.schedule.clone(),
            shell: self.shell,
            command: self.command.clone(),
            environment_variables: self.environment_variables.clone(),
            owner: self.owner.clone(),
            owner_email: self.owner_email.clone(),
            success_count: self.success_count,
            error_count: self.error_count,
            last_success: self.last_success,
            last_error: self.last_error,
            disabled: self.disabled,
            tags: self.tags.clone(),
            retries: self.retries,
            dependent_jobs: self.dependent_jobs.clone(),
            parent_job: self.parent_job.clone(),
            processors: self.processors.clone(),
            concurrency: self.concurrency.clone(),
            dispatch: DispatchGuard::default(),
            lock: LockSlot::default(),
        }
    }
}

/// One run attempt of a job on one cluster member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub job_name: String,
    /// Shared by every member's record for the same trigger event.
    pub group: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// `None` while the run is still in flight.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub node_name: String,
    pub attempt: u32,
}

impl Execution {
    /// Start a new execution group for `job_name`.
    pub fn new(job_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_name: job_name.to_string(),
            group: now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros()),
            started_at: None,
            finished_at: None,
            success: false,
            output: String::new(),
            node_name: String::new(),
            attempt: 1,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
