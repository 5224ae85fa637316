//! Publishing to the SNS topic

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sns::Client;
use aws_sdk_sns::config::Region;
use aws_sdk_sns::config::retry::RetryConfig;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::types::MessageAttributeValue;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::SnsConfig;
use crate::error::{PipelineError, Result};
use crate::message::PublishMessage;

/// Something that can deliver a [`PublishMessage`] to its topic.
///
/// Implementations make a single attempt and return the provider's message id.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, message: &PublishMessage) -> Result<String>;
}

pub struct SnsPublisher {
    client: Client,
}

impl SnsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS provider chain.
    /// SDK retries are disabled so each request publishes at most once.
    pub async fn from_config(config: &SnsConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            info!("Using SNS endpoint {}", endpoint_url);
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }
}

/// Converts plain string attributes to SNS `String` message attributes.
pub fn message_attributes(
    attributes: &BTreeMap<String, String>,
) -> Result<HashMap<String, MessageAttributeValue>> {
    attributes
        .iter()
        .map(|(name, value)| {
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map(|attr| (name.clone(), attr))
                .map_err(|e| {
                    PipelineError::PublishError(format!("invalid attribute '{}': {}", name, e))
                })
        })
        .collect()
}

#[async_trait]
impl TopicPublisher for SnsPublisher {
    async fn publish(&self, message: &PublishMessage) -> Result<String> {
        debug!(
            "Publishing to {}. Message is {}",
            message.topic_arn, message.body
        );

        let response = self
            .client
            .publish()
            .topic_arn(&message.topic_arn)
            .message(&message.body)
            .set_message_attributes(Some(message_attributes(&message.attributes)?))
            .send()
            .await
            .map_err(|e| PipelineError::PublishError(DisplayErrorContext(&e).to_string()))?;

        let message_id = response
            .message_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PipelineError::PublishError(format!(
                    "Could not publish message. Response was: {:?}",
                    response
                ))
            })?;

        info!("Successfully published MessageId {}", message_id);
        Ok(message_id.to_string())
    }
}
