//! Credential store trait.

/// Model used when none has been chosen.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Source of the API key and model selection.
pub trait CredentialStore: Send + Sync {
    /// API key, or an empty string when unset.
    fn api_key(&self) -> String;

    /// Selected model id; [`DEFAULT_MODEL`] when unset.
    fn model(&self) -> String;
}
