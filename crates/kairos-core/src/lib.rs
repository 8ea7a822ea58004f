//! `kairos-core` — configuration and error types shared by every kairos crate.

pub mod config;
pub mod error;

pub use config::KairosConfig;
pub use error::{KairosError, Result};
