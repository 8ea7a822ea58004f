use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kairos_core::KairosConfig;

use crate::{
    dispatch::Dispatcher,
    lock::{LockOptions, LockService},
    store::{ExecutionStore, JobStore},
};

/// The external services a live cluster member talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub history: Arc<dyn ExecutionStore>,
    pub locks: Arc<dyn LockService>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// A live cluster session: this member's identity, its collaborators and
/// the lock settings shared by every job evaluated through it.
pub struct Agent {
    node_name: String,
    keyspace: String,
    lock_timeout: Option<Duration>,
    lock_options: LockOptions,
    services: Collaborators,
    /// Last dispatch instant per job name, for debugging endpoints.
    inspect: DashMap<String, DateTime<Utc>>,
}

impl Agent {
    pub fn new(config: &KairosConfig, services: Collaborators) -> Self {
        Self {
            node_name: config.cluster.node_name.clone(),
            keyspace: config.cluster.keyspace.clone(),
            lock_timeout: config.lock.timeout_ms.map(Duration::from_millis),
            lock_options: LockOptions {
                ttl: Duration::from_secs(config.lock.ttl_secs),
                renew: config.lock.renew,
            },
            services,
            inspect: DashMap::new(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    pub fn lock_options(&self) -> LockOptions {
        self.lock_options.clone()
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.services.jobs.as_ref()
    }

    pub fn history(&self) -> &dyn ExecutionStore {
        self.services.history.as_ref()
    }

    pub fn locks(&self) -> &dyn LockService {
        self.services.locks.as_ref()
    }

    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.services.dispatcher.as_ref()
    }

    pub(crate) fn record_dispatch(&self, job_name: &str) {
        self.inspect.insert(job_name.to_string(), Utc::now());
    }

    /// When this member last handed `job_name` to the dispatcher, if ever.
    pub fn last_dispatched(&self, job_name: &str) -> Option<DateTime<Utc>> {
        self.inspect.get(job_name).map(|at| *at)
    }

    /// Drop the inspection entry of a job that no longer exists. Returns
    /// whether one was recorded.
    pub fn forget(&self, job_name: &str) -> bool {
        self.inspect.remove(job_name).is_some()
    }
}

/// The environment every job operation is evaluated in.
///
/// `Standalone` covers evaluation outside any cluster (tooling, tests):
/// status reads report [`JobStatus::Unknown`](crate::types::JobStatus::Unknown),
/// `run` is a no-op and the remaining operations fail with
/// [`JobError::NoAgent`](crate::error::JobError::NoAgent).
#[derive(Clone, Default)]
pub enum Session {
    #[default]
    Standalone,
    Live(Arc<Agent>),
}

impl Session {
    pub fn live(agent: Agent) -> Self {
        Session::Live(Arc::new(agent))
    }

    pub fn agent(&self) -> Option<&Agent> {
        match self {
            Session::Standalone => None,
            Session::Live(agent) => Some(agent.as_ref()),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Session::Live(_))
    }
}
