//! Cluster-scoped job locks.
//!
//! A job lock lives under `<keyspace>/job_locks/<job name>` in the lock
//! service. Higher-level orchestration takes it around the short window in
//! which a member decides whether to dispatch a trigger, and releases it as
//! soon as that decision is recorded.

use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    agent::Session,
    error::{JobError, Result, StoreError},
    types::Job,
};

/// Segment between the keyspace and the job name in lock keys.
pub const JOB_LOCKS_PREFIX: &str = "job_locks";

/// Backend hints for a new lock handle.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Session TTL; the backend may release the lock once it lapses.
    pub ttl: Duration,
    /// Keep the session alive for as long as the lock is held.
    pub renew: bool,
}

/// Factory for mutual-exclusion handles on arbitrary keys.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn new_lock(&self, key: &str, options: LockOptions) -> std::result::Result<Box<dyn Locker>, StoreError>;
}

/// A single lock handle.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Block until the lock is acquired or `cancel` fires
    /// (then [`StoreError::Cancelled`]).
    async fn lock(&mut self, cancel: CancellationToken) -> std::result::Result<(), StoreError>;

    async fn unlock(&mut self) -> std::result::Result<(), StoreError>;
}

/// Holds the lock handle a job acquired, until the matching unlock.
///
/// The inner mutex is only taken for state transitions, never across the
/// backend's blocking acquire or release.
#[derive(Default)]
pub struct LockSlot(StdMutex<SlotState>);

#[derive(Default)]
enum SlotState {
    #[default]
    Empty,
    /// A `lock` call reserved the slot and is waiting on the backend.
    Acquiring,
    Held(Box<dyn Locker>),
    /// An `unlock` call is releasing the handle.
    Releasing,
}

impl SlotState {
    fn name(&self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Acquiring => "acquiring",
            SlotState::Held(_) => "held",
            SlotState::Releasing => "releasing",
        }
    }
}

impl LockSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.0.lock().expect("lock slot poisoned")
    }

    fn reserve(&self) -> Result<Reservation<'_>> {
        let mut state = self.state();
        if !matches!(*state, SlotState::Empty) {
            return Err(JobError::AlreadyLocked);
        }
        *state = SlotState::Acquiring;
        Ok(Reservation {
            slot: self,
            committed: false,
        })
    }

    fn is_held(&self) -> bool {
        matches!(*self.state(), SlotState::Held(_) | SlotState::Releasing)
    }
}

impl std::fmt::Debug for LockSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.try_lock().map(|s| s.name()).unwrap_or("busy");
        f.debug_struct("LockSlot").field("state", &state).finish()
    }
}

/// An `Acquiring` slot. Dropped without `commit` (error, timeout, or the
/// `lock` future itself being dropped) it returns the slot to `Empty`.
struct Reservation<'a> {
    slot: &'a LockSlot,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, locker: Box<dyn Locker>) {
        *self.slot.state() = SlotState::Held(locker);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *self.slot.state() = SlotState::Empty;
        }
    }
}

pub fn lock_key(keyspace: &str, job_name: &str) -> String {
    format!("{keyspace}/{JOB_LOCKS_PREFIX}/{job_name}")
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Job {
    /// Acquire this job's cluster lock.
    ///
    /// Blocks until the lock is free, `cancel` fires, or the session's
    /// configured lock timeout elapses. The handle is kept on this instance
    /// until [`Job::unlock`]. Locking again while a lock is held or being
    /// acquired fails with [`JobError::AlreadyLocked`].
    pub async fn lock(&self, session: &Session, cancel: CancellationToken) -> Result<()> {
        let agent = session.agent().ok_or(JobError::NoAgent)?;
        let reservation = self.lock.reserve()?;

        let key = lock_key(agent.keyspace(), &self.name);
        let mut locker = agent.locks().new_lock(&key, agent.lock_options()).await?;

        match agent.lock_timeout() {
            Some(timeout) => {
                let attempt = cancel.child_token();
                match tokio::time::timeout(timeout, locker.lock(attempt.clone())).await {
                    Ok(acquired) => acquired?,
                    Err(_) => {
                        attempt.cancel();
                        return Err(JobError::LockTimeout {
                            ms: millis(timeout),
                        });
                    }
                }
            }
            None => locker.lock(cancel).await?,
        }

        info!(job = %self.name, %key, "job lock acquired");
        reservation.commit(locker);
        Ok(())
    }

    /// Release the lock taken by [`Job::lock`].
    ///
    /// Calling this without a held lock is a caller bug and is reported as
    /// [`JobError::NotLocked`].
    pub async fn unlock(&self, session: &Session) -> Result<()> {
        session.agent().ok_or(JobError::NoAgent)?;

        let mut locker = {
            let mut state = self.lock.state();
            match std::mem::replace(&mut *state, SlotState::Releasing) {
                SlotState::Held(locker) => locker,
                other => {
                    *state = other;
                    return Err(JobError::NotLocked);
                }
            }
        };

        let released = locker.unlock().await;
        let mut state = self.lock.state();
        match released {
            Ok(()) => {
                *state = SlotState::Empty;
                drop(state);
                info!(job = %self.name, "job lock released");
                Ok(())
            }
            Err(e) => {
                // Keep the handle so the caller can retry the release.
                *state = SlotState::Held(locker);
                Err(e.into())
            }
        }
    }

    /// Whether this instance currently holds its cluster lock. Never blocks.
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }
}

type KeyTable = DashMap<String, Arc<Mutex<()>>>;

/// Lock service for a single process: one async mutex per key.
///
/// Locks never expire, so `ttl` and `renew` are accepted and ignored. A key's
/// entry is dropped once its last handle goes away.
#[derive(Default)]
pub struct LocalLockService {
    keys: Arc<KeyTable>,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one live handle.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn new_lock(&self, key: &str, _options: LockOptions) -> std::result::Result<Box<dyn Locker>, StoreError> {
        let mutex = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Ok(Box::new(LocalLocker {
            key: key.to_string(),
            keys: Arc::clone(&self.keys),
            mutex,
            guard: None,
        }))
    }
}

struct LocalLocker {
    key: String,
    keys: Arc<KeyTable>,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LocalLocker {
    fn drop(&mut self) {
        self.guard.take();
        // Two references left means only the table and this handle know the key.
        self.keys.remove_if(&self.key, |_, m| Arc::strong_count(m) == 2);
    }
}

#[async_trait]
impl Locker for LocalLocker {
    async fn lock(&mut self, cancel: CancellationToken) -> std::result::Result<(), StoreError> {
        if self.guard.is_some() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(key = %self.key, "lock acquisition cancelled");
                Err(StoreError::Cancelled)
            }
            guard = self.mutex.clone().lock_owned() => {
                self.guard = Some(guard);
                Ok(())
            }
        }
    }

    async fn unlock(&mut self) -> std::result::Result<(), StoreError> {
        self.guard
            .take()
            .map(drop)
            .ok_or_else(|| StoreError::Backend(format!("lock {} is not held", self.key)))
    }
}
