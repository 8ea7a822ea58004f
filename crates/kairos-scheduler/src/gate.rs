use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::{
    agent::Session,
    types::{ConcurrencyPolicy, Execution, Job, JobStatus},
};

const IDLE: u8 = 0;
const DISPATCHING: u8 = 1;

/// Whether this in-process job instance is currently inside [`Job::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
}

/// Per-instance reentrancy flag for [`Job::run`].
///
/// Only guards one `Job` value against overlapping triggers in the same
/// process. Cross-member overlap is governed by the concurrency policy.
#[derive(Default)]
pub struct DispatchGuard(AtomicU8);

impl DispatchGuard {
    pub fn state(&self) -> DispatchState {
        match self.0.load(Ordering::Acquire) {
            IDLE => DispatchState::Idle,
            _ => DispatchState::Dispatching,
        }
    }

    /// Flip Idle -> Dispatching. `None` when another call already holds it.
    fn try_enter(&self) -> Option<DispatchTicket<'_>> {
        self.0
            .compare_exchange(IDLE, DISPATCHING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DispatchTicket(&self.0))
    }
}

impl std::fmt::Debug for DispatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DispatchGuard").field(&self.state()).finish()
    }
}

/// Resets the guard to Idle when dropped, including on early return.
struct DispatchTicket<'a>(&'a AtomicU8);

impl Drop for DispatchTicket<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// The gating rule: only a running job with a `forbid` policy is held back.
pub fn permits(status: JobStatus, policy: ConcurrencyPolicy) -> bool {
    !(status == JobStatus::Running && policy == ConcurrencyPolicy::Forbid)
}

impl Job {
    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatch.state()
    }

    /// May a new run of this job be dispatched right now?
    pub async fn is_runnable(&self, session: &Session) -> bool {
        let status = self.status(session).await;
        let policy = self.policy();

        if permits(status, policy) {
            return true;
        }

        debug!(
            job = %self.name,
            concurrency = %policy,
            job_status = %status,
            "scheduler: Skipping execution"
        );
        false
    }

    /// Trigger entry point, called on schedule.
    ///
    /// Never fails: a standalone session, a disabled job, a denied gate or an
    /// overlapping call on the same instance all end as a silent no-op.
    /// Results are observed later through [`Job::status`].
    pub async fn run(&self, session: &Session) {
        let Some(_ticket) = self.dispatch.try_enter() else {
            debug!(job = %self.name, "scheduler: dispatch already in progress for this instance");
            return;
        };

        let Some(agent) = session.agent() else {
            return;
        };
        if self.disabled {
            debug!(job = %self.name, "scheduler: job disabled");
            return;
        }
        if !self.is_runnable(session).await {
            return;
        }

        debug!(job = %self.name, schedule = %self.schedule, "scheduler: Run job");

        agent.record_dispatch(&self.name);
        let mut execution = Execution::new(&self.name);
        execution.node_name = agent.node_name().to_string();
        agent.dispatcher().dispatch(self, execution).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_forbid_is_denied() {
        use ConcurrencyPolicy::*;
        use JobStatus::*;

        for status in [Unknown, Running, Success, Failed, PartiallyFailed] {
            for policy in [Allow, Forbid] {
                let expected = !(status == Running && policy == Forbid);
                assert_eq!(permits(status, policy), expected, "{status} / {policy}");
            }
        }
    }

    #[test]
    fn guard_is_exclusive_and_resets() {
        let guard = DispatchGuard::default();
        assert_eq!(guard.state(), DispatchState::Idle);
        {
            let ticket = guard.try_enter();
            assert!(ticket.is_some());
            assert_eq!(guard.state(), DispatchState::Dispatching);
            assert!(guard.try_enter().is_none());
        }
        assert_eq!(guard.state(), DispatchState::Idle);
        assert!(guard.try_enter().is_some());
    }

    #[tokio::test]
    async fn standalone_run_is_noop() {
        let job = Job::new("report", "@daily", "make report");
        job.run(&Session::Standalone).await;
        assert_eq!(job.dispatch_state(), DispatchState::Idle);
        assert!(job.is_runnable(&Session::Standalone).await);
    }
}
