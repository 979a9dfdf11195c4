//! ClawJobs configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ClawJobsError, Result};
use crate::traits::credentials::{CredentialStore, DEFAULT_MODEL};

/// Root configuration (`~/.clawjobs/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// SQLite file; empty means `~/.clawjobs/clawjobs.db`.
    #[serde(default)]
    pub database_path: String,
}

impl JobsConfig {
    /// Load config from the default path (~/.clawjobs/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClawJobsError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ClawJobsError::Config(format!("Failed to parse config: {e}")))?;
        tracing::debug!("⚙️ Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClawJobsError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ClawJobs home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clawjobs")
    }

    /// Resolved database file.
    pub fn database_file(&self) -> PathBuf {
        if self.database_path.is_empty() {
            Self::home_dir().join("clawjobs.db")
        } else {
            PathBuf::from(&self.database_path)
        }
    }
}

/// Completion API settings and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Empty means "fall back to `ANTHROPIC_API_KEY`".
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Server-side tools can keep a request open for a long time.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String { DEFAULT_MODEL.into() }
fn default_base_url() -> String { "https://api.anthropic.com".into() }
fn default_api_version() -> String { "2023-06-01".into() }
fn default_connect_timeout() -> u64 { 30 }
fn default_request_timeout() -> u64 { 120 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            api_version: default_api_version(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Resolution order: config file value > `ANTHROPIC_API_KEY` > empty.
impl CredentialStore for ApiConfig {
    fn api_key(&self) -> String {
        if !self.api_key.trim().is_empty() {
            self.api_key.trim().to_string()
        } else {
            std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
        }
    }

    fn model(&self) -> String {
        if self.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            self.model.clone()
        }
    }
}

/// Job execution and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Total attempts per invocation, first run included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff; doubles on each further attempt.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,
    /// `pause_turn` continuation cap per invocation.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// How often `serve` re-reads the task store for edits made by other
    /// commands.
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 30 }
fn default_max_rounds() -> usize { 5 }
fn default_reconcile_secs() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff(),
            max_rounds: default_max_rounds(),
            reconcile_secs: default_reconcile_secs(),
        }
    }
}

/// Where notifications go besides the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// POST target for every notification.
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    /// Extra headers sent with every webhook POST (e.g. an auth token).
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobsConfig::default();
        assert_eq!(config.api.model, DEFAULT_MODEL);
        assert_eq!(config.api.base_url, "https://api.anthropic.com");
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.initial_backoff_secs, 30);
        assert_eq!(config.scheduler.max_rounds, 5);
        assert_eq!(config.scheduler.reconcile_secs, 30);
        assert!(config.notify.webhook_headers.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: JobsConfig = toml::from_str(
            r#"
            [api]
            api_key = "sk-test"

            [notify]
            webhook_url = "http://localhost:9000/hook"

            [notify.webhook_headers]
            Authorization = "Bearer t0k"
            "#,
        )
        .unwrap();
        assert_eq!(CredentialStore::api_key(&config.api), "sk-test");
        assert_eq!(CredentialStore::model(&config.api), DEFAULT_MODEL);
        assert_eq!(config.api.request_timeout_secs, 120);
        assert_eq!(config.notify.webhook_url, "http://localhost:9000/hook");
        assert_eq!(config.notify.webhook_headers["Authorization"], "Bearer t0k");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = JobsConfig::default();
        config.api.model = "claude-sonnet-4-6".into();
        config.database_path = "/tmp/jobs.db".into();
        config.save_to(&path).unwrap();

        let loaded = JobsConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api.model, "claude-sonnet-4-6");
        assert_eq!(loaded.database_file(), PathBuf::from("/tmp/jobs.db"));
    }
}
