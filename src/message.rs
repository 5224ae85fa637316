//! Messages published to the topic.
//!
//! An SQS queue subscribed to the topic feeds the Jenkins GitHub SQS plugin,
//! which understands two message shapes:
//!
//! * the repository format triggers every job whose SCM matches the repository;
//! * the custom format (flagged by `custom_format`) names the job to trigger
//!   and the parameters to pass it.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::webhook::{Candidate, render_value};
use crate::{RepositoryConfig, TriggerConfig};

/// A message ready to be handed to a [`crate::publisher::TopicPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishMessage {
    pub topic_arn: String,
    pub body: String,
    /// String attributes for subscription filter policies.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct JobParameter {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

impl JobParameter {
    fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "string",
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RepositoryOwner {
    name: String,
}

#[derive(Debug, Serialize)]
struct RepositoryRef {
    name: String,
    owner: RepositoryOwner,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageBody {
    Repository {
        repository: RepositoryRef,
    },
    Custom {
        job: String,
        custom_format: bool,
        parameters: Vec<JobParameter>,
    },
}

fn job_parameters(candidate: &Candidate) -> Vec<JobParameter> {
    let deployment = &candidate.deployment;
    let mut parameters = vec![
        JobParameter::string(
            "deployment_id",
            deployment.id.as_ref().map(render_value).unwrap_or_default(),
        ),
        JobParameter::string("sha", deployment.sha.clone().unwrap_or_default()),
        JobParameter::string("task", deployment.task.clone().unwrap_or_default()),
        JobParameter::string(
            "environment",
            deployment.environment.clone().unwrap_or_default(),
        ),
        JobParameter::string("ref", deployment.git_ref.clone()),
        JobParameter::string(
            "description",
            deployment.description.clone().unwrap_or_default(),
        ),
    ];
    parameters.extend(
        deployment
            .payload_fields()
            .into_iter()
            .map(|(name, value)| JobParameter::string(name, value)),
    );
    parameters
}

/// Builds the message for a candidate that matched `trigger`.
pub fn compose_message(
    trigger: &TriggerConfig,
    candidate: &Candidate,
    repository: &RepositoryConfig,
) -> Result<PublishMessage> {
    let body = match &trigger.job {
        Some(job) => MessageBody::Custom {
            job: job.clone(),
            custom_format: true,
            parameters: job_parameters(candidate),
        },
        None => MessageBody::Repository {
            repository: RepositoryRef {
                name: repository.name.clone(),
                owner: RepositoryOwner {
                    name: repository.org.clone(),
                },
                url: repository.url(),
            },
        },
    };

    let mut attributes = BTreeMap::new();
    attributes.insert("event".to_string(), candidate.event.clone());
    attributes.insert("ref".to_string(), candidate.deployment.branch().to_string());
    if let Some(job) = &trigger.job {
        attributes.insert("job".to_string(), job.clone());
    }
    // SNS rejects empty attribute values
    attributes.retain(|_, v| !v.is_empty());

    Ok(PublishMessage {
        topic_arn: trigger.topic_arn.clone(),
        body: serde_json::to_string(&body)?,
        attributes,
    })
}
