//! Collaborator traits. Everything outside the scheduling and execution
//! core is reached through one of these.

pub mod completion;
pub mod credentials;
pub mod notify;
pub mod store;

pub use completion::CompletionClient;
pub use credentials::CredentialStore;
pub use notify::NotificationSink;
pub use store::{RunStore, TaskStore};
