//! Webhook related structures

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::PipelineConfig;
use crate::error::{PipelineError, Result};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// The deployment-shaped event that drives a publish.
///
/// This is GitHub's deployment object: either the whole request body, or the
/// `deployment` field of a `deployment`/`deployment_status` webhook.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebhookEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Either a JSON object or a string holding serialized JSON.
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

impl WebhookEvent {
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(PipelineError::MalformedPayload(
                "deployment must be a JSON object".to_string(),
            ));
        }
        Self::deserialize(value).map_err(|e| PipelineError::MalformedPayload(e.to_string()))
    }

    /// Branch name with any `refs/heads/` prefix removed.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    /// Flattens `payload` into `(name, value)` pairs.
    ///
    /// A string payload is decoded first; when it does not hold a JSON object
    /// it is returned verbatim under the name `payload`.
    pub fn payload_fields(&self) -> Vec<(String, String)> {
        match &self.payload {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(raw)) if raw.trim().is_empty() => Vec::new(),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => object_fields(&map),
                _ => vec![("payload".to_string(), raw.clone())],
            },
            Some(Value::Object(map)) => object_fields(map),
            Some(other) => vec![("payload".to_string(), other.to_string())],
        }
    }
}

fn object_fields(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    map.iter()
        .map(|(key, value)| (key.clone(), render_value(value)))
        .collect()
}

/// Renders a JSON value as a job parameter: strings unquoted, null empty.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// An event that passed the repository filter and may trigger a publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub event: String,
    pub deployment: WebhookEvent,
    /// `deployment_status.state` for status events.
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inspection {
    Skip(String),
    Candidate(Candidate),
}

/// Decides whether a parsed webhook body is worth matching against triggers.
///
/// `event` is the `X-GitHub-Event` header. Without it, the body is taken to be
/// a bare deployment object for the configured default event.
pub fn inspect(event: Option<&str>, body: &Value, config: &PipelineConfig) -> Result<Inspection> {
    let Some(event) = event else {
        let deployment = WebhookEvent::from_value(body)?;
        return Ok(Inspection::Candidate(Candidate {
            event: config.default_event.clone(),
            deployment,
            state: None,
        }));
    };

    if event == "ping" {
        return Ok(Inspection::Skip("ping received".to_string()));
    }

    let repo_name = body
        .get("repository")
        .and_then(|r| r.get("full_name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| {
            PipelineError::MalformedPayload("missing repository.full_name".to_string())
        })?;

    let handled_repo = config.repository.full_name();
    if repo_name != handled_repo {
        debug!("Unhandled repo: {}", repo_name);
        return Ok(Inspection::Skip(format!("unhandled repository '{}'", repo_name)));
    }

    if !config.handles_event(event) {
        debug!("{} events do not need to be handled", event);
        return Ok(Inspection::Skip(format!("'{}' events are not handled", event)));
    }

    let deployment = body
        .get("deployment")
        .ok_or_else(|| PipelineError::MalformedPayload("missing deployment".to_string()))
        .and_then(WebhookEvent::from_value)?;

    let state = body
        .get("deployment_status")
        .and_then(|s| s.get("state"))
        .and_then(|s| s.as_str())
        .map(String::from);

    Ok(Inspection::Candidate(Candidate {
        event: event.to_string(),
        deployment,
        state,
    }))
}
