//! Webhook handler for GitHub deployment events

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::error::{PipelineError, Result};
use crate::message::compose_message;
use crate::utils::{find_matching_trigger, verify_github_signature};
use crate::webhook::{DELIVERY_HEADER, EVENT_HEADER, Inspection, SIGNATURE_HEADER, inspect};

/// Terminal state of a request that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Published {
        message_id: String,
        topic_arn: String,
        job: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Handles the GitHub webhook POST/PUT request.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = header_str(&headers, DELIVERY_HEADER)
        .map(String::from)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let event = header_str(&headers, EVENT_HEADER);
    let span = info_span!("webhook", %delivery, event = event.unwrap_or("-"));

    match process_webhook(&state, event, &headers, &body)
        .instrument(span)
        .await
    {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
            match e.status_code() {
                status if status.is_client_error() => warn!("Rejected webhook {}: {}", delivery, e),
                _ => error!("Webhook {} failed: {}", delivery, e),
            }
            e.into_response()
        }
    }
}

/// Authenticate, parse, filter, compose and publish. At most one publish.
async fn process_webhook(
    state: &SharedState,
    event: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Outcome> {
    let config = &state.config;

    if let Some(secret) = config.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or_else(|| {
            PipelineError::Unauthorized(format!("no {} header supplied", SIGNATURE_HEADER))
        })?;
        if !verify_github_signature(secret, body, signature) {
            return Err(PipelineError::Unauthorized(
                "payload was not signed with the webhook secret".to_string(),
            ));
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        PipelineError::MalformedPayload(format!("could not parse JSON body: {}", e))
    })?;
    debug!("{:#?}", &payload);

    let candidate = match inspect(event, &payload, config)? {
        Inspection::Skip(reason) => {
            info!("Skipping: {}", reason);
            return Ok(Outcome::Skipped { reason });
        }
        Inspection::Candidate(candidate) => candidate,
    };

    let Some(trigger) = find_matching_trigger(config, &candidate) else {
        let reason = match &candidate.state {
            Some(state) => format!(
                "no trigger matches event '{}' on branch '{}' with state '{}'",
                candidate.event,
                candidate.deployment.branch(),
                state
            ),
            None => format!(
                "no trigger matches event '{}' on branch '{}'",
                candidate.event,
                candidate.deployment.branch()
            ),
        };
        info!("Skipping: {}", reason);
        return Ok(Outcome::Skipped { reason });
    };

    info!(
        "Received {} event for branch '{}', triggering {}",
        candidate.event,
        candidate.deployment.branch(),
        trigger.job.as_deref().unwrap_or("repository jobs")
    );

    let message = compose_message(trigger, &candidate, &config.repository)?;
    let message_id = state.publisher.publish(&message).await?;

    Ok(Outcome::Published {
        message_id,
        topic_arn: message.topic_arn,
        job: trigger.job.clone(),
    })
}
