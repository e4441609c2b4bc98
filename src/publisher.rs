// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Publishes messages through the client's current channel. Messages go out
//! with persistent delivery mode and a JSON content type, carrying the
//! OpenTelemetry trace context in their headers.
//!
//! Publishing performs no connection check and no retry: between a
//! disconnect and the background recovery the channel is stale and the call
//! fails with a broker error. Retrying is the caller's decision.

use crate::{client::RabbitMQClient, errors::AmqpError, otel::AmqpTracePropagator};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::{global, Context};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;
use uuid::Uuid;

/// Content type stamped on every published message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Persistent delivery mode: the broker writes the message to disk
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Target and flags for one publish call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishDefinition {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) mandatory: bool,
    pub(crate) immediate: bool,
}

impl PublishDefinition {
    pub fn new(exchange: &str, routing_key: &str) -> PublishDefinition {
        PublishDefinition {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            mandatory: false,
            immediate: false,
        }
    }

    /// Require the broker to route the message to at least one queue.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Require immediate delivery to a ready consumer.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Interface for message publishing.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a raw payload according to the given definition.
    async fn publish(&self, payload: &[u8], def: &PublishDefinition) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the [`Publisher`] trait.
///
/// Resolves the client's current channel on every call, so a publisher
/// created before a reconnect keeps working after one.
pub struct RabbitMQPublisher {
    client: Arc<RabbitMQClient>,
}

impl RabbitMQPublisher {
    pub fn new(client: Arc<RabbitMQClient>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { client })
    }

    /// Serializes `payload` as JSON and publishes it.
    pub async fn publish_json<T: Serialize + Sync>(
        &self,
        payload: &T,
        def: &PublishDefinition,
    ) -> Result<(), AmqpError> {
        let data = match serde_json::to_vec(payload) {
            Ok(data) => data,
            Err(err) => {
                error!(error = err.to_string(), "error serializing payload");
                return Err(AmqpError::SerializePayloadError);
            }
        };

        self.publish(&data, def).await
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    async fn publish(&self, payload: &[u8], def: &PublishDefinition) -> Result<(), AmqpError> {
        let channel = self.client.current_channel().await?;

        let mut headers = BTreeMap::<ShortString, AMQPValue>::default();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(
                &Context::current(),
                &mut AmqpTracePropagator::new(&mut headers),
            )
        });

        match channel
            .basic_publish(
                &def.exchange,
                &def.routing_key,
                BasicPublishOptions {
                    mandatory: def.mandatory,
                    immediate: def.immediate,
                },
                payload,
                publish_properties(headers),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

/// Properties stamped on every outgoing message: persistent delivery, JSON
/// content type, a fresh message id and the propagation headers.
fn publish_properties(headers: BTreeMap<ShortString, AMQPValue>) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_defaults_to_non_mandatory_non_immediate() {
        let def = PublishDefinition::new("orders", "new");

        assert_eq!(def.exchange, "orders");
        assert_eq!(def.routing_key, "new");
        assert!(!def.mandatory);
        assert!(!def.immediate);

        let def = def.mandatory().immediate();
        assert!(def.mandatory);
        assert!(def.immediate);
    }

    #[test]
    fn properties_are_persistent_json_with_message_id() {
        let props = publish_properties(BTreeMap::default());

        assert_eq!(props.delivery_mode(), &Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            props.content_type().as_ref().map(|ct| ct.as_str()),
            Some(JSON_CONTENT_TYPE)
        );
        assert!(props.message_id().is_some());
    }
}
