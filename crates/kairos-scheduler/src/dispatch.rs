use async_trait::async_trait;
use kairos_core::KairosConfig;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{Execution, Job};

/// Hands a freshly created execution to whatever actually runs the command.
///
/// Dispatch is fire-and-forget: the outcome shows up later in the execution
/// history, never as a return value.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, job: &Job, execution: Execution);
}

/// A job snapshot paired with the execution it should produce.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job: Job,
    pub execution: Execution,
}

/// Forwards dispatch requests over a bounded mpsc channel.
///
/// Uses `try_send` so a slow consumer never stalls the trigger path; a full
/// or closed channel drops the request with a warning.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<DispatchRequest>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }

    /// Build a dispatcher and the receiving end the executor drains.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<DispatchRequest>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self::new(tx), rx)
    }

    /// Channel sized by `dispatch.queue_depth`.
    pub fn from_config(config: &KairosConfig) -> (Self, mpsc::Receiver<DispatchRequest>) {
        Self::channel(config.dispatch.queue_depth)
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn dispatch(&self, job: &Job, execution: Execution) {
        let group = execution.group;
        let request = DispatchRequest {
            job: job.clone(),
            execution,
        };
        match self.tx.try_send(request) {
            Ok(()) => debug!(job = %job.name, group, "execution queued for dispatch"),
            Err(e) => warn!(job = %job.name, group, error = %e, "dispatch channel full or closed, execution dropped"),
        }
    }
}
