//! `kairos-scheduler` — coordination core of the distributed job scheduler.
//!
//! # Overview
//!
//! Given a [`Job`] and a [`Session`], this crate decides whether a trigger
//! should dispatch work and serializes that decision across the cluster.
//!
//! | Operation            | Module   | Behaviour                                        |
//! |----------------------|----------|--------------------------------------------------|
//! | [`Job::validate`]    | `job`    | Structural checks before a job is persisted      |
//! | [`Job::status`]      | `status` | Reduce the latest execution group to a status    |
//! | [`Job::is_runnable`] | `gate`   | Status + concurrency policy -> may dispatch      |
//! | [`Job::run`]         | `gate`   | Trigger entry point, fire-and-forget dispatch    |
//! | [`Job::lock`]        | `lock`   | Take the job's cluster-wide lock                 |
//! | [`Job::get_parent`]  | `parent` | Resolve the declared parent job                  |
//!
//! Execution history, job lookup, locking and dispatch are external
//! collaborators reached through the traits in [`store`], [`lock`] and
//! [`dispatch`]. [`sqlite::SqliteStore`], [`lock::LocalLockService`] and
//! [`dispatch::ChannelDispatcher`] are the in-process implementations.

pub mod agent;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod job;
pub mod lock;
pub mod parent;
pub mod sqlite;
pub mod status;
pub mod store;
pub mod types;

pub use agent::{Agent, Collaborators, Session};
pub use error::{JobError, Result, StoreError};
pub use types::{ConcurrencyPolicy, Execution, Job, JobStatus};
