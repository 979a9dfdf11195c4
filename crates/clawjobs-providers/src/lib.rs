//! # ClawJobs Providers
//!
//! HTTP binding to the Anthropic Messages API plus the registry of
//! server-side tools a task can switch on.

pub mod anthropic;
pub mod tools;

pub use anthropic::AnthropicClient;
pub use tools::{ToolManifest, build_manifest};
