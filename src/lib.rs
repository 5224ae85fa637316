pub mod api;
pub mod error;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod utils;
pub mod webhook;

use chrono::{DateTime, Utc};
use error::{PipelineError, Result};
use publisher::TopicPublisher;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub use api::build_router;

const DEFAULT_EVENT: &str = "deployment";
const DEFAULT_BRANCH: &str = "master";
const DEFAULT_LOG_PREFIX: &str = "build_pipeline";

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub repository: RepositoryConfig,
    /// Shared secret entered as the webhook secret in the GitHub repo settings.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Event assumed for requests that arrive without an `X-GitHub-Event` header.
    #[serde(default = "default_event")]
    pub default_event: String,
    #[serde(default)]
    pub sns: SnsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(rename = "trigger", default)]
    pub triggers: Vec<TriggerConfig>,
}

/// The single repository whose events are handled.
#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub org: String,
    pub name: String,
}

impl RepositoryConfig {
    /// `org/name`, as GitHub reports it in `repository.full_name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.org, self.name)
    }
}

/// Maps an event (and branch/state) to a topic and the Jenkins job it should start.
#[derive(Debug, Deserialize, Clone)]
pub struct TriggerConfig {
    pub event: String,
    pub topic_arn: String,
    /// Jenkins job to name in the message. Without one, every job
    /// watching the repository is triggered.
    pub job: Option<String>,
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
    /// Deployment states that qualify, e.g. `["success"]`. Empty means any.
    #[serde(default)]
    pub states: Vec<String>,
}

impl TriggerConfig {
    /// Returns true if the branch passes this trigger's filter.
    /// An empty branch list accepts every branch.
    pub fn matches_branch(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }

    /// Returns true if the deployment state passes this trigger's filter.
    pub fn matches_state(&self, state: Option<&str>) -> bool {
        if self.states.is_empty() {
            return true;
        }
        state.is_some_and(|s| self.states.iter().any(|allowed| allowed == s))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SnsConfig {
    pub region: Option<String>,
    /// Alternative endpoint, e.g. a local SNS emulator.
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            rotation: default_rotation(),
            file_prefix: default_log_prefix(),
        }
    }
}

fn default_event() -> String {
    DEFAULT_EVENT.to_string()
}

fn default_branches() -> Vec<String> {
    vec![DEFAULT_BRANCH.to_string()]
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_log_prefix() -> String {
    DEFAULT_LOG_PREFIX.to_string()
}

impl PipelineConfig {
    /// Returns true if webhook signature validation should be enforced.
    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// Replaces the configured secret, typically with `WEBHOOK_SECRET_TOKEN`.
    pub fn apply_secret_override(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.webhook_secret = Some(secret);
        }
    }

    /// Returns true if at least one trigger listens for `event`.
    pub fn handles_event(&self, event: &str) -> bool {
        self.triggers.iter().any(|t| t.event == event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.org.is_empty() || self.repository.name.is_empty() {
            return Err(PipelineError::ConfigError(
                "repository.org and repository.name must not be empty".to_string(),
            ));
        }
        if self.triggers.is_empty() {
            return Err(PipelineError::ConfigError(
                "at least one [[trigger]] must be configured".to_string(),
            ));
        }
        for (idx, trigger) in self.triggers.iter().enumerate() {
            if trigger.event.is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "trigger #{} has an empty event",
                    idx + 1
                )));
            }
            if trigger.topic_arn.is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "trigger #{} ({}) has an empty topic_arn",
                    idx + 1,
                    trigger.event
                )));
            }
        }
        Ok(())
    }
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

pub struct AppState {
    pub config: PipelineConfig,
    pub publisher: Arc<dyn TopicPublisher>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: PipelineConfig, publisher: Arc<dyn TopicPublisher>) -> Self {
        Self {
            config,
            publisher,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
