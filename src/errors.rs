// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Resilient RabbitMQ Client
//!
//! This module provides the error type shared by every fallible operation in
//! the crate. The `AmqpError` enum covers connection establishment, channel
//! creation, topology declaration, publishing and consuming scenarios. Each
//! variant carries the context needed by callers to decide whether the
//! failure is fatal (construction-time), per-call (publish), or advisory
//! (declaration steps that were attempted independently).

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// None of the configured dial targets could be reached at construction
    /// time. Carries the comma-joined list of every attempted target.
    #[error("failure to connect to any dial target `{0}`")]
    UnreachableTargets(String),

    /// The configuration lookup does not contain the requested key
    #[error("rabbitmq config key `{0}` not found")]
    ConfigKeyNotFound(String),

    /// The configuration entry is missing a required field
    #[error("rabbitmq config key `{0}` is missing required field `{1}`")]
    MissingConfigField(String, String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// No channel has ever been opened for this client
    #[error("channel is not available")]
    MissingChannel,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{0}` to exchange `{1}`")]
    BindQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos on queue `{0}`")]
    QosDeclarationError(String),

    /// Error registering a consumer against a queue
    #[error("failure to create consumer `{0}`")]
    CreateConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing a payload before publishing
    #[error("failure to serialize payload")]
    SerializePayloadError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_targets_lists_every_attempted_target() {
        let err = AmqpError::UnreachableTargets("amqp://a/,amqp://b/".to_owned());
        assert_eq!(
            err.to_string(),
            "failure to connect to any dial target `amqp://a/,amqp://b/`"
        );
    }

    #[test]
    fn declaration_errors_carry_entity_names() {
        assert_eq!(
            AmqpError::DeclareExchangeError("orders".to_owned()).to_string(),
            "failure to declare an exchange `orders`"
        );
        assert_eq!(
            AmqpError::BindQueueError("orders-q".to_owned(), "orders".to_owned()).to_string(),
            "failure to bind queue `orders-q` to exchange `orders`"
        );
    }

    #[test]
    fn consume_setup_errors_carry_queue_and_tag() {
        assert_eq!(
            AmqpError::QosDeclarationError("orders-q".to_owned()).to_string(),
            "failure to configure qos on queue `orders-q`"
        );
        assert_eq!(
            AmqpError::CreateConsumerError("orders-q-worker-0".to_owned()).to_string(),
            "failure to create consumer `orders-q-worker-0`"
        );
    }

    #[test]
    fn config_errors_name_the_key() {
        assert_eq!(
            AmqpError::ConfigKeyNotFound("broker".to_owned()).to_string(),
            "rabbitmq config key `broker` not found"
        );
        assert_eq!(
            AmqpError::MissingConfigField("broker".to_owned(), "host".to_owned()).to_string(),
            "rabbitmq config key `broker` is missing required field `host`"
        );
    }
}
