//! # ClawJobs Core
//!
//! Shared vocabulary for the ClawJobs workspace: the error type, the
//! configuration file, the task / run / transcript types, and the traits
//! every collaborator (stores, credentials, notifications, completion API)
//! is reached through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::JobsConfig;
pub use error::{ClawJobsError, Result};
